//! Indexing pipeline: sentence chunking and vector-store writes.

pub mod chunking;
mod service;
pub mod types;

pub use chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP_SENTENCES, chunk_text};
pub use service::DocumentIndexer;
pub use types::{IndexError, IndexOutcome, IndexStats, SearchHit, StoredDocument};
