use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("term table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("watch backend error: {0}")]
    Watch(#[from] notify::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("embedding dimension mismatch: index has {index}, embedder produces {embedder}")]
    DimensionMismatch { index: usize, embedder: usize },

    #[error("malformed snapshot {path}: {reason}")]
    Snapshot { path: PathBuf, reason: String },
}
