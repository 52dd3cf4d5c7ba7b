//! Vector store abstraction and the Qdrant adapter.

pub mod client;
pub mod payload;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod types;

pub use client::QdrantStore;
pub use types::{RankedRecord, StoreError, StoredRecord};

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Semantic store with overwrite-by-id semantics.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite the record `id`.
    async fn upsert(
        &self,
        id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Remove every record whose `document_id` metadata equals `document_id`.
    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError>;

    /// Every stored record.
    async fn get(&self) -> Result<Vec<StoredRecord>, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Up to `limit` records most similar to `text`, best first.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RankedRecord>, StoreError>;
}

#[cfg(test)]
pub(crate) mod memory;
