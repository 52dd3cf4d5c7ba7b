use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing indexing activity.
#[derive(Default)]
pub struct IndexingMetrics {
    documents_indexed: AtomicU64,
    records_indexed: AtomicU64,
    documents_failed: AtomicU64,
}

impl IndexingMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document and the number of records written for it.
    pub fn record_document(&self, record_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.records_indexed
            .fetch_add(record_count, Ordering::Relaxed);
    }

    /// Record a document that could not be indexed.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            records_indexed: self.records_indexed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of indexing counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents indexed since startup.
    pub documents_indexed: u64,
    /// Total records (whole documents or chunks) written to the store.
    pub records_indexed: u64,
    /// Documents whose indexing failed.
    pub documents_failed: u64,
}
