use crate::config::BackendKind;
use crate::dense::{DenseIndex, FlatIpIndex, IdMap};
use crate::embedding::Embedder;
use crate::error::{IndexError, Result};
use crate::index::SparseIndex;
use crate::tokenizer::Normalizer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Leading columns of the sparse term table; term columns follow.
const LEADING_COLUMNS: [&str; 3] = ["title", "path", "score"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub backend: BackendKind,
    pub num_docs: u32,
    pub created_at: String,
    #[serde(default)]
    pub embedder: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn terms(&self) -> PathBuf { self.root.join("terms.csv") }
    pub fn vectors(&self) -> PathBuf { self.root.join("vectors.bin") }
    pub fn id_map(&self) -> PathBuf { self.root.join("id_map.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Write through a uniquely named sibling temp file and rename over the
/// target, so concurrent saves never share a temp file.
fn write_atomic<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        write(&mut w)?;
        w.flush()?;
    }
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Persist raw term counts: one row per document, one column per known term.
pub fn save_sparse(paths: &IndexPaths, index: &SparseIndex) -> Result<()> {
    write_atomic(&paths.terms(), |w| {
        let mut csv = csv::Writer::from_writer(w);
        let mut header: Vec<&str> = LEADING_COLUMNS.to_vec();
        header.extend(index.terms().iter().map(String::as_str));
        csv.write_record(&header)?;
        let width = index.terms().len();
        for row in index.rows() {
            let mut record: Vec<String> = Vec::with_capacity(LEADING_COLUMNS.len() + width);
            record.push(row.title.clone());
            record.push(row.path.to_string_lossy().into_owned());
            record.push("0".to_string());
            let mut counts = vec![0u32; width];
            for (&tid, &count) in &row.counts {
                counts[tid as usize] = count;
            }
            record.extend(counts.iter().map(u32::to_string));
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    })?;
    save_meta(paths, &MetaFile {
        version: SNAPSHOT_VERSION,
        backend: BackendKind::Sparse,
        num_docs: index.len() as u32,
        created_at: now_rfc3339(),
        embedder: None,
    })?;
    tracing::info!(path = %paths.terms().display(), num_docs = index.len(), num_terms = index.vocabulary_len(), "sparse snapshot saved");
    Ok(())
}

/// Load the sparse term table, or `None` if no snapshot exists.
pub fn load_sparse(paths: &IndexPaths, normalizer: Normalizer) -> Result<Option<SparseIndex>> {
    let file = paths.terms();
    if !file.exists() {
        tracing::info!(path = %file.display(), "no sparse snapshot, starting empty");
        return Ok(None);
    }
    let mut csv = csv::Reader::from_reader(BufReader::new(File::open(&file)?));
    let header = csv.headers()?.clone();
    let lead: Vec<&str> = header.iter().take(LEADING_COLUMNS.len()).collect();
    if lead != LEADING_COLUMNS {
        return Err(IndexError::Snapshot { path: file, reason: format!("unexpected leading columns {lead:?}") });
    }
    let terms: Vec<String> = header.iter().skip(LEADING_COLUMNS.len()).map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record?;
        let title = record.get(0).unwrap_or_default().to_string();
        let path = PathBuf::from(record.get(1).unwrap_or_default());
        let mut counts = HashMap::new();
        for (term, cell) in terms.iter().zip(record.iter().skip(LEADING_COLUMNS.len())) {
            let count: u32 = cell.trim().parse().map_err(|_| IndexError::Snapshot {
                path: file.clone(),
                reason: format!("bad count {cell:?} for term {term:?}"),
            })?;
            if count > 0 {
                counts.insert(term.clone(), count);
            }
        }
        rows.push((title, path, counts));
    }
    let index = SparseIndex::from_term_rows(normalizer, rows);
    tracing::info!(path = %file.display(), num_docs = index.len(), "sparse snapshot loaded");
    Ok(Some(index))
}

/// Persist the vector blob and the id map as one unit.
pub fn save_dense(paths: &IndexPaths, index: &DenseIndex) -> Result<()> {
    let map = index.id_map();
    write_atomic(&paths.vectors(), |w| Ok(bincode::serialize_into(w, index.vectors())?))?;
    write_atomic(&paths.id_map(), |w| Ok(bincode::serialize_into(w, &map)?))?;
    save_meta(paths, &MetaFile {
        version: SNAPSHOT_VERSION,
        backend: BackendKind::Dense,
        num_docs: index.len() as u32,
        created_at: now_rfc3339(),
        embedder: Some(map.embedder_id),
    })?;
    tracing::info!(path = %paths.vectors().display(), num_docs = index.len(), stored = index.stored_vectors(), "dense snapshot saved");
    Ok(())
}

/// Load the dense snapshot, or `None` unless both artifacts exist.
pub fn load_dense(
    paths: &IndexPaths,
    embedder: Arc<dyn Embedder>,
    normalizer: Normalizer,
    compact_ratio: f32,
) -> Result<Option<DenseIndex>> {
    let (vectors_file, map_file) = (paths.vectors(), paths.id_map());
    if !vectors_file.exists() || !map_file.exists() {
        tracing::info!(root = %paths.root.display(), "dense snapshot incomplete or absent, starting empty");
        return Ok(None);
    }
    let vectors: FlatIpIndex = bincode::deserialize_from(BufReader::new(File::open(&vectors_file)?))?;
    let map: IdMap = bincode::deserialize_from(BufReader::new(File::open(&map_file)?))?;
    let index = DenseIndex::from_parts(embedder, normalizer, compact_ratio, vectors, map)?;
    tracing::info!(path = %vectors_file.display(), num_docs = index.len(), "dense snapshot loaded");
    Ok(Some(index))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    write_atomic(&paths.meta(), |w| {
        serde_json::to_writer_pretty(&mut *w, meta)?;
        Ok(())
    })
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let f = File::open(paths.meta())?;
    Ok(serde_json::from_reader(BufReader::new(f))?)
}
