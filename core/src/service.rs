//! The owned index object shared by the change adapter and query handlers.
//!
//! All index state sits behind one readers-writer lock. Queries take the
//! read side; every mutation batch takes the write side once, applies its
//! remove/add sequence, then downgrades to a read guard while the snapshot is
//! written. File reads and embedding happen before the lock is taken.

use crate::config::{BackendKind, SearchConfig};
use crate::dense::DenseIndex;
use crate::embedding::{Embedder, HashEmbedder};
use crate::error::Result;
use crate::index::SparseIndex;
use crate::persist::{self, IndexPaths};
use crate::search::{search_sparse, SearchHit};
use crate::tokenizer::Normalizer;
use crate::walk::{discover_files, is_indexable, read_document};
use crate::watcher::FileEvent;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// The active ranking backend.
#[derive(Debug)]
pub enum Backend {
    Sparse(SparseIndex),
    Dense(DenseIndex),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Sparse(_) => BackendKind::Sparse,
            Self::Dense(_) => BackendKind::Dense,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Sparse(idx) => idx.len(),
            Self::Dense(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn contains(&self, path: &Path) -> bool {
        match self {
            Self::Sparse(idx) => idx.contains(path),
            Self::Dense(idx) => idx.contains(path),
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            Self::Sparse(idx) => idx.paths().map(Path::to_path_buf).collect(),
            Self::Dense(idx) => idx.paths().map(Path::to_path_buf).collect(),
        }
    }

    fn remove(&mut self, path: &Path) -> bool {
        match self {
            Self::Sparse(idx) => idx.remove(path),
            Self::Dense(idx) => idx.remove_file(path),
        }
    }

    fn remove_prefix(&mut self, prefix: &Path) -> Vec<PathBuf> {
        match self {
            Self::Sparse(idx) => idx.remove_prefix(prefix),
            Self::Dense(idx) => idx.remove_prefix(prefix),
        }
    }

    fn save(&self, paths: &IndexPaths) -> Result<()> {
        match self {
            Self::Sparse(idx) => persist::save_sparse(paths, idx),
            Self::Dense(idx) => persist::save_dense(paths, idx),
        }
    }
}

/// A document read from disk, embedded already when the backend is dense.
#[derive(Debug)]
struct Prepared {
    path: PathBuf,
    text: String,
    embedding: Option<Vec<f32>>,
}

/// One index mutation derived from a file event.
#[derive(Debug)]
enum Mutation {
    Upsert(Prepared),
    /// Remove a file, or everything beneath it if it was a directory.
    Remove(PathBuf),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub upserted: usize,
    pub removed: usize,
    pub ignored: usize,
    /// Documents that could not be read into the index; the rest of the
    /// batch is still applied.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub backend: BackendKind,
    pub documents: usize,
    pub vocabulary: Option<usize>,
    pub stored_vectors: Option<usize>,
    pub tombstones: Option<usize>,
}

pub struct SearchService {
    config: SearchConfig,
    paths: IndexPaths,
    normalizer: Normalizer,
    embedder: Arc<dyn Embedder>,
    backend: RwLock<Backend>,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("index_dir", &self.paths.root)
            .field("backend", &self.config.backend)
            .finish_non_exhaustive()
    }
}

impl SearchService {
    /// Build a service with the built-in hash embedder.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let embedder = Arc::new(HashEmbedder::new(config.embedding_dimension));
        Self::with_embedder(config, embedder)
    }

    pub fn with_embedder(config: SearchConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let normalizer = Normalizer::default();
        let paths = IndexPaths::new(&config.index_dir);
        let backend = empty_backend(&config, &normalizer, &embedder);
        Ok(Self { config, paths, normalizer, embedder, backend: RwLock::new(backend) })
    }

    pub fn config(&self) -> &SearchConfig { &self.config }

    /// Load the snapshot if one exists, then reconcile it with the files
    /// under `roots`: new or changed files are indexed, indexed files that
    /// are gone are removed. The reconciled index is persisted and swapped in.
    /// Returns the number of files (re)indexed.
    pub fn initialize(&self, roots: &[PathBuf]) -> Result<usize> {
        let loaded = self.load_snapshot()?;
        let snapshot_time = loaded.as_ref().and_then(|_| modified_at(&self.paths.meta()));
        let mut backend = loaded.unwrap_or_else(|| empty_backend(&self.config, &self.normalizer, &self.embedder));

        let files = discover_files(roots, &self.config.extensions);
        let on_disk: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
        // only paths under a root that was walked can be judged gone
        let live_roots: Vec<&PathBuf> = roots.iter().filter(|r| r.is_dir()).collect();
        let stale: Vec<PathBuf> = backend
            .paths()
            .into_iter()
            .filter(|p| !on_disk.contains(p.as_path()))
            .filter(|p| live_roots.iter().any(|r| p.starts_with(r)) && !p.is_file())
            .collect();
        let fresh: Vec<&PathBuf> = files
            .iter()
            .filter(|p| !backend.contains(p) || is_newer(p, snapshot_time))
            .collect();
        tracing::info!(discovered = files.len(), stale = stale.len(), to_index = fresh.len(), "initial sync");

        match &mut backend {
            Backend::Sparse(idx) => {
                idx.remove_many(stale.iter().map(PathBuf::as_path));
                idx.add_many(fresh.iter().map(|p| ((*p).clone(), read_document(p))));
            }
            Backend::Dense(idx) => {
                for path in &stale {
                    idx.remove_file(path);
                }
                for path in &fresh {
                    if let Err(err) = idx.add_file(path, &read_document(path)) {
                        tracing::warn!(path = %path.display(), error = %err, "failed to embed document");
                    }
                }
            }
        }

        backend.save(&self.paths)?;
        *self.backend.write() = backend;
        Ok(fresh.len())
    }

    /// Apply one filesystem event and persist before returning.
    pub fn on_file_event(&self, event: FileEvent) -> Result<BatchOutcome> {
        self.apply_batch(vec![event])
    }

    /// Apply events in order under a single write acquisition, then persist
    /// the snapshot. A persistence failure is returned to the caller.
    pub fn apply_batch(&self, events: Vec<FileEvent>) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut mutations = Vec::new();
        for event in events {
            tracing::info!(event = %event, "file event");
            self.plan(event, &mut mutations, &mut outcome);
        }
        if mutations.is_empty() {
            return Ok(outcome);
        }

        let mut guard = self.backend.write();
        for mutation in mutations {
            match mutation {
                Mutation::Upsert(doc) => match upsert(&mut guard, &doc) {
                    Ok(()) => outcome.upserted += 1,
                    Err(err) => {
                        tracing::warn!(path = %doc.path.display(), error = %err, "failed to index document");
                        outcome.failed += 1;
                    }
                },
                Mutation::Remove(path) => {
                    if guard.remove(&path) {
                        outcome.removed += 1;
                    } else {
                        outcome.removed += guard.remove_prefix(&path).len();
                    }
                }
            }
        }
        let guard = RwLockWriteGuard::downgrade(guard);
        guard.save(&self.paths)?;
        Ok(outcome)
    }

    /// Rank documents for `query`. An empty query or index yields no hits.
    ///
    /// The sparse backend returns every document above the relevance
    /// threshold, truncated to `top_k` if given; the dense backend returns
    /// the `top_k` nearest documents.
    pub fn search(&self, query: &str, top_k: Option<usize>) -> Result<Vec<SearchHit>> {
        let backend = self.backend.read();
        match &*backend {
            Backend::Sparse(idx) => {
                Ok(search_sparse(idx, query, self.config.relevance_threshold, top_k.filter(|k| *k > 0)))
            }
            Backend::Dense(idx) => idx.search(query, self.config.dense_k(top_k)),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.backend.read().save(&self.paths)
    }

    /// Flush a final snapshot.
    pub fn shutdown(&self) -> Result<()> {
        self.save()?;
        tracing::info!(index_dir = %self.paths.root.display(), "search service shut down");
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        let backend = self.backend.read();
        match &*backend {
            Backend::Sparse(idx) => IndexStats {
                backend: BackendKind::Sparse,
                documents: idx.len(),
                vocabulary: Some(idx.vocabulary_len()),
                stored_vectors: None,
                tombstones: None,
            },
            Backend::Dense(idx) => IndexStats {
                backend: BackendKind::Dense,
                documents: idx.len(),
                vocabulary: None,
                stored_vectors: Some(idx.stored_vectors()),
                tombstones: Some(idx.tombstones()),
            },
        }
    }

    fn load_snapshot(&self) -> Result<Option<Backend>> {
        Ok(match self.config.backend {
            BackendKind::Sparse => persist::load_sparse(&self.paths, self.normalizer.clone())?.map(Backend::Sparse),
            BackendKind::Dense => persist::load_dense(
                &self.paths,
                Arc::clone(&self.embedder),
                self.normalizer.clone(),
                self.config.compact_ratio,
            )?
            .map(Backend::Dense),
        })
    }

    /// Translate an event into mutations, reading and embedding documents.
    /// A document that fails to embed is counted and left out.
    fn plan(&self, event: FileEvent, out: &mut Vec<Mutation>, outcome: &mut BatchOutcome) {
        match event {
            FileEvent::Created(path) | FileEvent::Modified(path) => {
                if path.is_dir() || !is_indexable(&path, &self.config.extensions) {
                    outcome.ignored += 1;
                } else {
                    self.plan_upsert(path, out, outcome);
                }
            }
            FileEvent::Deleted(path) => out.push(Mutation::Remove(path)),
            FileEvent::Moved { from, to } => {
                out.push(Mutation::Remove(from));
                if to.is_dir() {
                    for path in discover_files(std::slice::from_ref(&to), &self.config.extensions) {
                        self.plan_upsert(path, out, outcome);
                    }
                } else if is_indexable(&to, &self.config.extensions) {
                    self.plan_upsert(to, out, outcome);
                } else {
                    outcome.ignored += 1;
                }
            }
        }
    }

    fn plan_upsert(&self, path: PathBuf, out: &mut Vec<Mutation>, outcome: &mut BatchOutcome) {
        match self.prepare(&path) {
            Ok(doc) => out.push(Mutation::Upsert(doc)),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to embed document");
                outcome.failed += 1;
            }
        }
    }

    fn prepare(&self, path: &Path) -> Result<Prepared> {
        let text = read_document(path);
        let embedding = match self.config.backend {
            BackendKind::Dense if !text.trim().is_empty() => Some(self.embedder.embed(&text)?),
            _ => None,
        };
        Ok(Prepared { path: path.to_path_buf(), text, embedding })
    }
}

fn upsert(backend: &mut Backend, doc: &Prepared) -> Result<()> {
    match backend {
        Backend::Sparse(idx) => idx.add_or_replace(&doc.path, &doc.text),
        Backend::Dense(idx) => match &doc.embedding {
            Some(vector) => {
                idx.add_embedding(&doc.path, vector)?;
            }
            None => {
                idx.add_file(&doc.path, &doc.text)?;
            }
        },
    }
    Ok(())
}

fn empty_backend(config: &SearchConfig, normalizer: &Normalizer, embedder: &Arc<dyn Embedder>) -> Backend {
    match config.backend {
        BackendKind::Sparse => Backend::Sparse(SparseIndex::with_normalizer(normalizer.clone())),
        BackendKind::Dense => {
            Backend::Dense(DenseIndex::new(Arc::clone(embedder), normalizer.clone(), config.compact_ratio))
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether `path` changed after the snapshot was taken. Without a snapshot
/// time everything counts as newer.
fn is_newer(path: &Path, snapshot_time: Option<SystemTime>) -> bool {
    match (snapshot_time, modified_at(path)) {
        (Some(snap), Some(mtime)) => mtime > snap,
        _ => true,
    }
}
