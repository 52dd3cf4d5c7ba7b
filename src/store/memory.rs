//! In-memory [`VectorStore`] used by unit tests.

use super::{RankedRecord, StoreError, StoredRecord, VectorStore};
use crate::store::payload::DOCUMENT_ID_FIELD;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub(crate) struct MemoryStore {
    records: Mutex<BTreeMap<String, StoredRecord>>,
    pub(crate) upserts: AtomicUsize,
    /// Record ids whose upsert fails.
    pub(crate) failing_ids: Mutex<Vec<String>>,
    /// Token cancelled once this many upserts have succeeded.
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl MemoryStore {
    pub(crate) fn ids(&self) -> Vec<String> {
        self.records.lock().unwrap().keys().cloned().collect()
    }

    pub(crate) fn fail_on(&self, id_fragment: &str) {
        self.failing_ids.lock().unwrap().push(id_fragment.to_string());
    }

    pub(crate) fn cancel_after_upserts(&self, upserts: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((upserts, token));
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(
        &self,
        id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError> {
        if self
            .failing_ids
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| id.contains(fragment.as_str()))
        {
            return Err(StoreError::UnexpectedStatus {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: format!("refusing {id}"),
            });
        }
        self.records.lock().unwrap().insert(
            id.to_string(),
            StoredRecord {
                id: id.to_string(),
                text: text.to_string(),
                metadata,
            },
        );
        let upserts = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = self.cancel_after.lock().unwrap().as_ref()
            && upserts == *limit
        {
            token.cancel();
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        self.records.lock().unwrap().retain(|_, record| {
            record.metadata.get(DOCUMENT_ID_FIELD).and_then(Value::as_str) != Some(document_id)
        });
        Ok(())
    }

    async fn get(&self) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().unwrap().len())
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RankedRecord>, StoreError> {
        let needle = text.to_lowercase();
        let mut hits: Vec<RankedRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter_map(|record| {
                let haystack = record.text.to_lowercase();
                let matched = needle
                    .split_whitespace()
                    .filter(|word| haystack.contains(word))
                    .count();
                (matched > 0).then(|| RankedRecord {
                    record: record.clone(),
                    score: matched as f32,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}
