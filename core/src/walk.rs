use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Whether `path` passes the extension allow-list. An empty list admits
/// every file.
pub fn is_indexable(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Recursively list regular files under each root, sorted per root.
/// Missing roots are skipped with a warning.
pub fn discover_files(roots: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for root in roots {
        if !root.exists() {
            tracing::warn!(root = %root.display(), "watched root does not exist");
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_indexable(p, extensions))
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

/// Read a document as UTF-8. Unreadable files are logged and read as empty.
pub fn read_document(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "unreadable document, indexing as empty");
            String::new()
        }
    }
}
