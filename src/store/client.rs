//! Qdrant-backed [`VectorStore`] over the HTTP API.

use super::payload::{DOCUMENT_ID_FIELD, build_payload, point_id, record_from_payload};
use super::scroller::stream_records;
use super::types::{
    CountResponse, QueryResponse, QueryResponseResult, RankedRecord, StoreError, StoredRecord,
};
use super::VectorStore;
use crate::embedding::EmbeddingClient;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Vector store backed by one Qdrant collection.
///
/// Textual record ids map to deterministic UUIDv5 point ids, so upserting the same id twice
/// overwrites the earlier point.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    embedder: Arc<dyn EmbeddingClient>,
}

impl QdrantStore {
    /// Build a store for `collection` at `url`, embedding text with `embedder`.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("privascan/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(StoreError::InvalidUrl)?;
        let collection = collection.into();
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection,
            embedder,
        })
    }

    /// Collection this store writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection when missing and index the `document_id` payload field.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        if !self.collection_exists().await? {
            let vector_size = self.embedder.dimension();
            tracing::info!(collection = %self.collection, vector_size, "Creating collection");
            let body = json!({
                "vectors": {
                    "size": vector_size,
                    "distance": "Cosine"
                }
            });
            let response = self
                .request(Method::PUT, &format!("collections/{}", self.collection))
                .json(&body)
                .send()
                .await?;
            ensure_success(response).await?;
        }

        let response = self
            .request(Method::PUT, &format!("collections/{}/index", self.collection))
            .json(&json!({ "field_name": DOCUMENT_ID_FIELD, "field_schema": "keyword" }))
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(collection = %self.collection, "Payload index already exists");
            return Ok(());
        }
        ensure_success(response).await
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        self.embedder
            .generate_embeddings(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| {
                StoreError::Embedding(crate::embedding::EmbeddingClientError::GenerationFailed(
                    "provider returned no vectors".into(),
                ))
            })
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(
        &self,
        id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let vector = self.embed_one(text).await?;
        let point = json!({
            "id": point_id(id).to_string(),
            "vector": vector,
            "payload": build_payload(id, text, metadata),
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}/points", self.collection))
            .query(&[("wait", true)])
            .json(&json!({ "points": [point] }))
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(collection = %self.collection, record = id, "Record upserted");
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        let body = json!({
            "filter": {
                "must": [
                    { "key": DOCUMENT_ID_FIELD, "match": { "value": document_id } }
                ]
            }
        });
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(collection = %self.collection, document = document_id, "Document records deleted");
        Ok(())
    }

    async fn get(&self) -> Result<Vec<StoredRecord>, StoreError> {
        stream_records(self, None).try_collect().await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
            )
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::UnexpectedStatus { status, body });
        }
        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RankedRecord>, StoreError> {
        let vector = self.embed_one(text).await?;
        let body = json!({
            "query": vector,
            "limit": limit.max(1),
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .filter_map(|point| {
                let record = point.payload.and_then(record_from_payload)?;
                Some(RankedRecord {
                    record,
                    score: point.score,
                })
            })
            .collect())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), StoreError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = StoreError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "Qdrant request failed");
    Err(error)
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
