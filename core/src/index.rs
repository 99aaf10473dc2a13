use crate::tokenizer::Normalizer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub type TermId = u32;
pub type DocId = u64;

/// Raw term counts for one indexed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermRow {
    pub title: String,
    pub path: PathBuf,
    pub counts: HashMap<TermId, u32>,
}

/// Per-document term-count table with corpus-wide TF-IDF weights.
///
/// Rows keep insertion order; a replaced document moves to the end.
/// The vocabulary only grows: terms of removed documents stay known with a
/// zero document frequency.
#[derive(Debug, Default)]
pub struct SparseIndex {
    pub(crate) dictionary: HashMap<String, TermId>,
    pub(crate) terms: Vec<String>,
    pub(crate) rows: Vec<TermRow>,
    pub(crate) df: Vec<u32>,
    pub(crate) idf: Vec<f32>,
    /// Weighted counts, parallel to `rows`.
    pub(crate) weighted: Vec<HashMap<TermId, f32>>,
    /// L2 norm of each weighted row, parallel to `rows`.
    pub(crate) norms: Vec<f32>,
    normalizer: Normalizer,
}

/// Title shown for a document: its file name without extension.
pub fn title_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

impl SparseIndex {
    pub fn new() -> Self { Self::default() }

    pub fn with_normalizer(normalizer: Normalizer) -> Self {
        Self { normalizer, ..Self::default() }
    }

    pub fn normalizer(&self) -> &Normalizer { &self.normalizer }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn vocabulary_len(&self) -> usize { self.terms.len() }

    pub fn contains(&self, path: &Path) -> bool {
        self.position(path).is_some()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.rows.iter().map(|r| r.path.as_path())
    }

    pub fn rows(&self) -> &[TermRow] { &self.rows }

    pub fn terms(&self) -> &[String] { &self.terms }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.dictionary.get(term).copied()
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        let tid = self.term_id(term)?;
        self.idf.get(tid as usize).copied()
    }

    /// Weighted count of `term` in the document at `path`; zero if the
    /// document lacks the term.
    pub fn weight(&self, path: &Path, term: &str) -> Option<f32> {
        let pos = self.position(path)?;
        let tid = self.term_id(term)?;
        Some(self.weighted[pos].get(&tid).copied().unwrap_or(0.0))
    }

    /// Index `text` under `path`, replacing any existing row, then recompute weights.
    pub fn add_or_replace(&mut self, path: &Path, text: &str) {
        self.insert_row(path, text);
        self.recompute_weights();
        tracing::debug!(path = %path.display(), num_docs = self.rows.len(), "sparse row indexed");
    }

    /// Index a batch of documents with a single weight recompute.
    pub fn add_many<I>(&mut self, docs: I)
    where
        I: IntoIterator<Item = (PathBuf, String)>,
    {
        for (path, text) in docs {
            self.insert_row(&path, &text);
        }
        self.recompute_weights();
    }

    /// Drop the row for `path`. Returns whether a row was removed; weights
    /// are recomputed only in that case.
    pub fn remove(&mut self, path: &Path) -> bool {
        if self.remove_row(path) {
            self.recompute_weights();
            tracing::debug!(path = %path.display(), num_docs = self.rows.len(), "sparse row removed");
            true
        } else {
            false
        }
    }

    /// Drop several rows with a single weight recompute. Returns how many
    /// rows were removed.
    pub fn remove_many<'a, I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let removed = paths.into_iter().filter(|p| self.remove_row(p)).count();
        if removed > 0 {
            self.recompute_weights();
        }
        removed
    }

    /// Remove every row whose path is under `prefix`. Returns the removed paths.
    pub fn remove_prefix(&mut self, prefix: &Path) -> Vec<PathBuf> {
        let (gone, kept): (Vec<TermRow>, Vec<TermRow>) =
            std::mem::take(&mut self.rows).into_iter().partition(|r| r.path.starts_with(prefix));
        self.rows = kept;
        if !gone.is_empty() {
            self.recompute_weights();
        }
        gone.into_iter().map(|r| r.path).collect()
    }

    /// Rebuild from persisted raw counts keyed by term text.
    pub fn from_term_rows<I>(normalizer: Normalizer, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, PathBuf, HashMap<String, u32>)>,
    {
        let mut index = Self::with_normalizer(normalizer);
        for (title, path, named) in rows {
            let mut counts = HashMap::with_capacity(named.len());
            for (term, count) in named {
                if count == 0 { continue; }
                let tid = index.intern(term);
                counts.insert(tid, count);
            }
            index.rows.retain(|r| r.path != path);
            index.rows.push(TermRow { title, path, counts });
        }
        index.recompute_weights();
        index
    }

    /// Full TF-IDF recompute with smoothed IDF:
    /// `idf(t) = ln((1 + N) / (1 + df(t))) + 1`.
    pub fn recompute_weights(&mut self) {
        let n = self.rows.len() as f32;
        self.df = vec![0; self.terms.len()];
        for row in &self.rows {
            for (&tid, &count) in &row.counts {
                if count > 0 {
                    self.df[tid as usize] += 1;
                }
            }
        }
        self.idf = self
            .df
            .iter()
            .map(|&df_t| ((1.0 + n) / (1.0 + df_t as f32)).ln() + 1.0)
            .collect();

        self.weighted = Vec::with_capacity(self.rows.len());
        self.norms = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut w = HashMap::with_capacity(row.counts.len());
            let mut sq = 0.0f32;
            for (&tid, &count) in &row.counts {
                let v = count as f32 * self.idf[tid as usize];
                sq += v * v;
                w.insert(tid, v);
            }
            self.weighted.push(w);
            self.norms.push(sq.sqrt());
        }
        tracing::debug!(num_docs = self.rows.len(), num_terms = self.terms.len(), "weights recomputed");
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.rows.iter().position(|r| r.path == path)
    }

    fn intern(&mut self, term: String) -> TermId {
        if let Some(&tid) = self.dictionary.get(&term) {
            return tid;
        }
        let tid = self.terms.len() as TermId;
        self.terms.push(term.clone());
        self.dictionary.insert(term, tid);
        tid
    }

    fn remove_row(&mut self, path: &Path) -> bool {
        match self.position(path) {
            Some(pos) => {
                self.rows.remove(pos);
                true
            }
            None => false,
        }
    }

    fn insert_row(&mut self, path: &Path, text: &str) {
        self.remove_row(path);
        let mut counts: HashMap<TermId, u32> = HashMap::new();
        let terms = self.normalizer.normalize(text);
        for term in terms {
            let tid = self.intern(term);
            *counts.entry(tid).or_insert(0) += 1;
        }
        self.rows.push(TermRow { title: title_for(path), path: path.to_path_buf(), counts });
    }
}
