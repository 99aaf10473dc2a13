pub mod config;
pub mod dense;
pub mod embedding;
pub mod error;
pub mod index;
pub mod persist;
pub mod search;
pub mod service;
pub mod tokenizer;
pub mod walk;
pub mod watcher;

pub use config::{BackendKind, SearchConfig};
pub use error::{IndexError, Result};
pub use index::{DocId, SparseIndex, TermId, TermRow};
pub use search::SearchHit;
pub use service::SearchService;
pub use watcher::{ChangeWatcher, FileEvent};
