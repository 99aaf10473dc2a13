use crate::dense::DEFAULT_COMPACT_RATIO;
use crate::embedding::DEFAULT_DIMENSION;
use crate::error::{IndexError, Result};
use crate::search::DEFAULT_RELEVANCE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// TF-IDF term table ranked by cosine similarity.
    #[default]
    Sparse,
    /// Embedding vectors ranked by inner product.
    Dense,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sparse => f.write_str("sparse"),
            Self::Dense => f.write_str("dense"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sparse" | "tfidf" => Ok(Self::Sparse),
            "dense" | "vector" => Ok(Self::Dense),
            other => Err(IndexError::Config(format!("unknown backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub roots: Vec<PathBuf>,
    pub index_dir: PathBuf,
    pub backend: BackendKind,
    /// Sparse results must score strictly above this.
    pub relevance_threshold: f32,
    /// Neighbours requested from the dense backend when the caller gives none.
    pub dense_top_k: usize,
    pub embedding_dimension: usize,
    /// Tombstone share that triggers dense compaction; 0 disables it.
    pub compact_ratio: f32,
    pub event_batch_size: usize,
    /// File extensions to index, without the dot. Empty admits all files.
    pub extensions: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            index_dir: PathBuf::from("./index"),
            backend: BackendKind::Sparse,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            dense_top_k: 5,
            embedding_dimension: DEFAULT_DIMENSION,
            compact_ratio: DEFAULT_COMPACT_RATIO,
            event_batch_size: 64,
            extensions: Vec::new(),
        }
    }
}

impl SearchConfig {
    /// Load a TOML config file; absent keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.relevance_threshold.is_finite() || self.relevance_threshold < 0.0 {
            return Err(IndexError::Config(format!("invalid relevance_threshold: {}", self.relevance_threshold)));
        }
        if self.embedding_dimension == 0 {
            return Err(IndexError::Config("embedding_dimension must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.compact_ratio) {
            return Err(IndexError::Config(format!("compact_ratio must be within [0, 1], got {}", self.compact_ratio)));
        }
        if self.event_batch_size == 0 {
            return Err(IndexError::Config("event_batch_size must be > 0".into()));
        }
        Ok(())
    }

    /// Neighbour count for a dense query.
    pub fn dense_k(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(k) if k > 0 => k,
            _ => self.dense_top_k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("livesearch.toml");
        fs::write(&path, "backend = \"dense\"\nroots = [\"/srv/docs\"]\n").unwrap();
        let cfg = SearchConfig::load(&path).unwrap();
        assert_eq!(cfg.backend, BackendKind::Dense);
        assert_eq!(cfg.roots, vec![PathBuf::from("/srv/docs")]);
        assert_eq!(cfg.relevance_threshold, DEFAULT_RELEVANCE_THRESHOLD);
        assert_eq!(cfg.dense_k(None), 5);
        assert_eq!(cfg.dense_k(Some(0)), 5);
        assert_eq!(cfg.dense_k(Some(3)), 3);
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = SearchConfig { relevance_threshold: -1.0, ..SearchConfig::default() };
        assert!(matches!(cfg.validate(), Err(IndexError::Config(_))));
        let cfg = SearchConfig { compact_ratio: 1.5, ..SearchConfig::default() };
        assert!(cfg.validate().is_err());
        assert!("bogus".parse::<BackendKind>().is_err());
        assert_eq!("Dense".parse::<BackendKind>().unwrap(), BackendKind::Dense);
    }
}
