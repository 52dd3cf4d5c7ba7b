//! Document indexing: chunking, metadata, and vector-store writes.

use crate::{
    document::{Document, SourceKind, chunk_id, ocr_source_name},
    metrics::{IndexingMetrics, MetricsSnapshot},
    processing::{
        chunking::chunk_text,
        types::{IndexError, IndexOutcome, IndexStats, SearchHit, StoredDocument},
    },
    store::{
        StoreError, StoredRecord, VectorStore,
        payload::{DOCUMENT_ID_FIELD, current_timestamp_rfc3339},
    },
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CHUNK_INDEX_FIELD: &str = "chunk_index";
const SOURCE_PATH_FIELD: &str = "source_path";

/// Writes documents into a [`VectorStore`], one record per chunk.
///
/// Every document is keyed by its path fingerprint. Re-indexing first deletes all records of
/// the document and then writes the new ones, so identifiers stay stable and a shrinking chunk
/// count leaves nothing behind.
///
/// The delete and the writes are not atomic. A re-index that fails partway leaves only the
/// chunks written before the failure; indexing the file again restores the full set.
pub struct DocumentIndexer {
    store: Arc<dyn VectorStore>,
    chunk_size: usize,
    overlap: usize,
    metrics: Arc<IndexingMetrics>,
}

impl DocumentIndexer {
    /// Build an indexer chunking at `chunk_size` characters with `overlap` carried sentences.
    pub fn new(store: Arc<dyn VectorStore>, chunk_size: usize, overlap: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            overlap,
            metrics: Arc::new(IndexingMetrics::new()),
        }
    }

    /// Index one in-memory document.
    ///
    /// Whitespace-only content is skipped. With `use_chunking`, content longer than the chunk
    /// size is stored as `<fingerprint>_chunk<n>` records; otherwise as one record keyed by the
    /// bare fingerprint.
    pub async fn index(
        &self,
        document: &Document,
        use_chunking: bool,
    ) -> Result<IndexOutcome, IndexError> {
        if document.content().trim().is_empty() {
            tracing::debug!(path = %document.path().display(), "Skipping empty document");
            return Ok(IndexOutcome::Skipped);
        }

        let fingerprint = document.fingerprint();
        let base = base_metadata(document, &fingerprint);

        let result = self.write_records(document, &fingerprint, base, use_chunking).await;
        match &result {
            Ok(records) => {
                self.metrics.record_document(*records as u64);
                tracing::info!(
                    path = %document.path().display(),
                    records,
                    "Document indexed"
                );
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::warn!(path = %document.path().display(), error = %error, "Indexing failed");
            }
        }
        Ok(IndexOutcome::Indexed { records: result? })
    }

    async fn write_records(
        &self,
        document: &Document,
        fingerprint: &str,
        base: Map<String, Value>,
        use_chunking: bool,
    ) -> Result<usize, StoreError> {
        self.store.delete_document(fingerprint).await?;

        if !use_chunking || document.char_len() <= self.chunk_size {
            self.store
                .upsert(fingerprint, document.content(), base)
                .await?;
            return Ok(1);
        }

        let chunks = chunk_text(document.content(), self.chunk_size, self.overlap);
        let total = chunks.len();
        for (ordinal, chunk) in chunks.iter().enumerate() {
            let mut metadata = base.clone();
            metadata.insert(CHUNK_INDEX_FIELD.into(), ordinal.into());
            metadata.insert("total_chunks".into(), total.into());
            self.store
                .upsert(&chunk_id(fingerprint, ordinal), chunk, metadata)
                .await?;
        }
        tracing::debug!(path = %document.path().display(), chunks = total, "Stored chunks");
        Ok(total)
    }

    /// Read and index a file. OCR output files are tagged as image-derived.
    pub async fn index_file(&self, path: &Path) -> Result<IndexOutcome, IndexError> {
        let document =
            Document::load(path, SourceKind::infer(path)).map_err(|source| {
                tracing::warn!(path = %path.display(), error = %source, "Unreadable file");
                self.metrics.record_failure();
                IndexError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        self.index(&document, true).await
    }

    /// Index every file, continuing past individual failures.
    pub async fn index_all(&self, paths: &[PathBuf]) -> IndexStats {
        let mut stats = IndexStats::default();
        for path in paths {
            let result = self.index_file(path).await;
            stats.record(SourceKind::infer(path), &result);
        }
        tracing::info!(
            total = stats.total,
            successful = stats.successful,
            failed = stats.failed,
            skipped = stats.skipped,
            "Batch indexing finished"
        );
        stats
    }

    /// Semantic search over indexed text.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        let hits = self.store.query(query, limit).await?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                source_path: string_field(&hit.record.metadata, SOURCE_PATH_FIELD),
                chunk_index: chunk_index(&hit.record),
                record_id: hit.record.id,
                score: hit.score,
                text: hit.record.text,
            })
            .collect())
    }

    /// Every stored record grouped by source path, chunks in order.
    pub async fn list_documents(&self) -> Result<Vec<StoredDocument>, StoreError> {
        let mut grouped: BTreeMap<String, Vec<StoredRecord>> = BTreeMap::new();
        for record in self.store.get().await? {
            grouped
                .entry(string_field(&record.metadata, SOURCE_PATH_FIELD))
                .or_default()
                .push(record);
        }

        Ok(grouped
            .into_iter()
            .map(|(source_path, mut records)| {
                records.sort_by_key(|record| chunk_index(record).unwrap_or(0));
                StoredDocument {
                    source_path,
                    records,
                }
            })
            .collect())
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.store.count().await
    }

    /// Current indexing counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn base_metadata(document: &Document, fingerprint: &str) -> Map<String, Value> {
    let file_name = document.file_name();
    let extension = document
        .path()
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut metadata = Map::new();
    metadata.insert(DOCUMENT_ID_FIELD.into(), fingerprint.into());
    metadata.insert(
        SOURCE_PATH_FIELD.into(),
        document.path().to_string_lossy().into_owned().into(),
    );
    metadata.insert("source_kind".into(), document.kind().as_str().into());
    metadata.insert("extension".into(), extension.into());
    metadata.insert("size".into(), document.size().into());
    metadata.insert("timestamp".into(), current_timestamp_rfc3339().into());
    if let Some(original) = ocr_source_name(&file_name) {
        metadata.insert("original_file_name".into(), original.into());
    }
    metadata.insert("file_name".into(), file_name.into());
    metadata
}

fn string_field(metadata: &Map<String, Value>, key: &str) -> String {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn chunk_index(record: &StoredRecord) -> Option<usize> {
    record
        .metadata
        .get(CHUNK_INDEX_FIELD)
        .and_then(Value::as_u64)
        .map(|value| value as usize)
}
