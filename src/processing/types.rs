//! Data types and errors for the indexing pipeline.

use crate::document::SourceKind;
use crate::store::{StoreError, StoredRecord};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors emitted while indexing a single document.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Source file could not be read.
    #[error("Failed to read {path}: {source}")]
    Unreadable {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// Vector store rejected a write.
    #[error("Vector store write failed: {0}")]
    Store(#[from] StoreError),
}

/// What happened to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Records were written.
    Indexed {
        /// Number of records (whole document or chunks) written.
        records: usize,
    },
    /// Content was empty or whitespace; nothing was written.
    Skipped,
}

/// Aggregate counts for a batch of documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Documents attempted.
    pub total: usize,
    /// Documents written.
    pub successful: usize,
    /// Documents that failed to read or write.
    pub failed: usize,
    /// Empty documents skipped.
    pub skipped: usize,
    /// OCR output files among the attempted documents.
    pub ocr_files: usize,
    /// Native text files among the attempted documents.
    pub text_files: usize,
}

impl IndexStats {
    /// Fold one document's result into the totals.
    pub fn record(&mut self, kind: SourceKind, result: &Result<IndexOutcome, IndexError>) {
        self.total += 1;
        match kind {
            SourceKind::Image => self.ocr_files += 1,
            SourceKind::Text => self.text_files += 1,
        }
        match result {
            Ok(IndexOutcome::Indexed { .. }) => self.successful += 1,
            Ok(IndexOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// A similarity-search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Stored record identifier.
    pub record_id: String,
    /// Source file of the matching text.
    pub source_path: String,
    /// Chunk ordinal, when the document was chunked.
    pub chunk_index: Option<usize>,
    /// Similarity score.
    pub score: f32,
    /// Matching text.
    pub text: String,
}

/// All records of one source file, in chunk order.
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    /// Source file path.
    pub source_path: String,
    /// Records belonging to the file.
    pub records: Vec<StoredRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_fold_outcomes_by_kind() {
        let mut stats = IndexStats::default();
        stats.record(SourceKind::Image, &Ok(IndexOutcome::Indexed { records: 3 }));
        stats.record(SourceKind::Text, &Ok(IndexOutcome::Skipped));
        stats.record(
            SourceKind::Text,
            &Err(IndexError::Unreadable {
                path: "/x".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
        );

        assert_eq!(
            stats,
            IndexStats {
                total: 3,
                successful: 1,
                failed: 1,
                skipped: 1,
                ocr_files: 1,
                text_files: 2,
            }
        );
    }
}
