use crate::embedding::{l2_normalize, Embedder};
use crate::error::{IndexError, Result};
use crate::index::{title_for, DocId};
use crate::search::SearchHit;
use crate::tokenizer::Normalizer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Fraction of stored vectors that may be tombstones before compaction.
pub const DEFAULT_COMPACT_RATIO: f32 = 0.5;

/// Exhaustive inner-product similarity structure. Vectors are stored with
/// their identifiers so compaction never renumbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatIpIndex {
    dimension: usize,
    ids: Vec<DocId>,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, ids: Vec::new(), data: Vec::new() }
    }

    pub fn dimension(&self) -> usize { self.dimension }

    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    pub fn contains(&self, id: DocId) -> bool { self.ids.contains(&id) }

    /// Largest stored identifier, tombstones included.
    pub fn max_id(&self) -> Option<DocId> { self.ids.iter().copied().max() }

    pub fn add(&mut self, id: DocId, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch { index: self.dimension, embedder: vector.len() });
        }
        self.ids.push(id);
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Top-`k` stored vectors by inner product with `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(DocId, f32)> {
        if k == 0 || query.len() != self.dimension {
            return Vec::new();
        }
        let mut scored: Vec<(DocId, f32)> = self
            .ids
            .iter()
            .zip(self.data.chunks_exact(self.dimension))
            .map(|(&id, v)| (id, v.iter().zip(query).map(|(a, b)| a * b).sum()))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Keep only vectors whose id satisfies `keep`. Returns how many were dropped.
    pub fn retain<F: Fn(DocId) -> bool>(&mut self, keep: F) -> usize {
        let before = self.ids.len();
        let mut ids = Vec::with_capacity(before);
        let mut data = Vec::with_capacity(self.data.len());
        for (&id, v) in self.ids.iter().zip(self.data.chunks_exact(self.dimension)) {
            if keep(id) {
                ids.push(id);
                data.extend_from_slice(v);
            }
        }
        self.ids = ids;
        self.data = data;
        before - self.ids.len()
    }
}

/// Identifier bookkeeping persisted next to the vector blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdMap {
    pub next_id: DocId,
    pub embedder_id: String,
    pub id_to_path: HashMap<DocId, PathBuf>,
}

/// Embedding vectors plus a bidirectional id/path map.
///
/// Removal is logical: the id leaves both maps and its vector becomes a
/// tombstone that ranking skips. Tombstones are physically dropped once
/// they exceed `compact_ratio` of the stored vectors.
pub struct DenseIndex {
    vectors: FlatIpIndex,
    id_to_path: HashMap<DocId, PathBuf>,
    path_to_id: HashMap<PathBuf, DocId>,
    next_id: DocId,
    embedder: Arc<dyn Embedder>,
    normalizer: Normalizer,
    compact_ratio: f32,
}

impl fmt::Debug for DenseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseIndex")
            .field("embedder", &self.embedder.id())
            .field("documents", &self.id_to_path.len())
            .field("stored_vectors", &self.vectors.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl DenseIndex {
    pub fn new(embedder: Arc<dyn Embedder>, normalizer: Normalizer, compact_ratio: f32) -> Self {
        Self {
            vectors: FlatIpIndex::new(embedder.dimension()),
            id_to_path: HashMap::new(),
            path_to_id: HashMap::new(),
            next_id: 0,
            embedder,
            normalizer,
            compact_ratio,
        }
    }

    /// Reassemble an index from snapshot parts.
    pub fn from_parts(
        embedder: Arc<dyn Embedder>,
        normalizer: Normalizer,
        compact_ratio: f32,
        vectors: FlatIpIndex,
        map: IdMap,
    ) -> Result<Self> {
        if vectors.dimension() != embedder.dimension() {
            return Err(IndexError::DimensionMismatch { index: vectors.dimension(), embedder: embedder.dimension() });
        }
        if map.embedder_id != embedder.id() {
            tracing::warn!(snapshot = %map.embedder_id, embedder = embedder.id(), "snapshot was built with a different embedder");
        }
        let mut id_to_path = map.id_to_path;
        id_to_path.retain(|id, path| {
            let present = vectors.contains(*id);
            if !present {
                tracing::warn!(id, path = %path.display(), "dropping mapping without a stored vector");
            }
            present
        });
        let path_to_id = id_to_path.iter().map(|(id, p)| (p.clone(), *id)).collect();
        // the map may be older than the vectors; never hand out a stored id
        let next_id = map.next_id.max(vectors.max_id().map_or(0, |m| m + 1));
        Ok(Self {
            vectors,
            id_to_path,
            path_to_id,
            next_id,
            embedder,
            normalizer,
            compact_ratio,
        })
    }

    pub fn len(&self) -> usize { self.id_to_path.len() }

    pub fn is_empty(&self) -> bool { self.id_to_path.is_empty() }

    pub fn stored_vectors(&self) -> usize { self.vectors.len() }

    pub fn tombstones(&self) -> usize { self.vectors.len() - self.id_to_path.len() }

    pub fn contains(&self, path: &Path) -> bool { self.path_to_id.contains_key(path) }

    pub fn id_of(&self, path: &Path) -> Option<DocId> { self.path_to_id.get(path).copied() }

    pub fn path_of(&self, id: DocId) -> Option<&Path> { self.id_to_path.get(&id).map(PathBuf::as_path) }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.path_to_id.keys().map(PathBuf::as_path)
    }

    pub fn vectors(&self) -> &FlatIpIndex { &self.vectors }

    pub fn id_map(&self) -> IdMap {
        IdMap { next_id: self.next_id, embedder_id: self.embedder.id().to_string(), id_to_path: self.id_to_path.clone() }
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> { Arc::clone(&self.embedder) }

    /// Embed `text` and index it under `path`, replacing any existing mapping.
    /// Blank text is skipped; returns whether a vector was appended.
    pub fn add_file(&mut self, path: &Path, text: &str) -> Result<bool> {
        if text.trim().is_empty() {
            self.remove_file(path);
            tracing::warn!(path = %path.display(), "skipping empty document");
            return Ok(false);
        }
        let raw = self.embedder.embed(text)?;
        self.add_embedding(path, &raw)?;
        Ok(true)
    }

    /// Index an already computed embedding under `path`, replacing any
    /// existing mapping. The vector is L2-normalized before it is stored.
    pub fn add_embedding(&mut self, path: &Path, raw: &[f32]) -> Result<DocId> {
        if raw.len() != self.vectors.dimension() {
            return Err(IndexError::DimensionMismatch { index: self.vectors.dimension(), embedder: raw.len() });
        }
        self.remove_file(path);
        let id = self.next_id;
        self.vectors.add(id, &l2_normalize(raw))?;
        self.next_id += 1;
        self.id_to_path.insert(id, path.to_path_buf());
        self.path_to_id.insert(path.to_path_buf(), id);
        tracing::debug!(path = %path.display(), id, "vector appended");
        Ok(id)
    }

    /// Tombstone the vector for `path`. Returns whether a mapping existed.
    pub fn remove_file(&mut self, path: &Path) -> bool {
        let Some(id) = self.path_to_id.remove(path) else {
            return false;
        };
        self.id_to_path.remove(&id);
        self.maybe_compact();
        true
    }

    /// Tombstone every mapping under `prefix`. Returns the removed paths.
    pub fn remove_prefix(&mut self, prefix: &Path) -> Vec<PathBuf> {
        let gone: Vec<PathBuf> = self.path_to_id.keys().filter(|p| p.starts_with(prefix)).cloned().collect();
        for path in &gone {
            self.remove_file(path);
        }
        gone
    }

    /// Top-`k` documents by cosine similarity to `query`, in similarity order.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if self.id_to_path.is_empty() || query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let q = l2_normalize(&self.embedder.embed(query)?);
        let query_terms = dedup(self.normalizer.normalize(query));

        let mut hits = Vec::new();
        for (id, score) in self.vectors.search(&q, k + self.tombstones()) {
            let Some(path) = self.id_to_path.get(&id) else {
                continue;
            };
            hits.push(SearchHit {
                title: title_for(path),
                path: path.clone(),
                score,
                matched_terms: self.matched_terms(&query_terms, path),
            });
            if hits.len() == k {
                break;
            }
        }
        Ok(hits)
    }

    /// Query terms also present in the document on disk. An unreadable file
    /// yields no matches.
    fn matched_terms(&self, query_terms: &[String], path: &Path) -> Vec<String> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        let doc_terms: HashSet<String> = self.normalizer.term_set(&content);
        query_terms.iter().filter(|t| doc_terms.contains(*t)).cloned().collect()
    }

    fn maybe_compact(&mut self) {
        let stored = self.vectors.len();
        if self.compact_ratio <= 0.0 || stored == 0 {
            return;
        }
        let tombstones = self.tombstones();
        if tombstones as f32 > self.compact_ratio * stored as f32 {
            let live = &self.id_to_path;
            let dropped = self.vectors.retain(|id| live.contains_key(&id));
            tracing::info!(dropped, remaining = self.vectors.len(), "compacted vector store");
        }
    }
}

fn dedup(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
