//! Streaming helper for iterating Qdrant's scroll endpoint without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Value, json};

use super::client::QdrantStore;
use super::payload::record_from_payload;
use super::types::{ScrollResponse, StoreError, StoredRecord};

const DEFAULT_SCROLL_LIMIT: usize = 256;

/// Stream every record of the collection, optionally restricted by a Qdrant filter.
pub fn stream_records<'a>(
    store: &'a QdrantStore,
    filter: Option<Value>,
) -> impl Stream<Item = Result<StoredRecord, StoreError>> + 'a {
    try_stream! {
        let mut offset = Value::Null;
        let filter_body = filter.unwrap_or_else(|| json!({ "must": [] }));
        let path = format!("collections/{}/points/scroll", store.collection());

        loop {
            let body = json!({
                "with_payload": true,
                "with_vector": false,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter_body.clone(),
                "offset": offset.clone(),
            });

            let response = store.request(Method::POST, &path).json(&body).send().await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    if let Some(record) = point.payload.and_then(record_from_payload) {
                        yield record;
                    }
                }

                match result.next_page_offset {
                    Some(next) if !next.is_null() => offset = next,
                    _ => break,
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection = store.collection(), status = %status, "Failed to scroll records");
                Err(StoreError::UnexpectedStatus { status, body })?;
            }
        }
    }
}
