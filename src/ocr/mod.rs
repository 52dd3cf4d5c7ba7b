//! OCR engine abstraction and the Ollama vision-model adapter.
//!
//! The OCR model is memory-heavy, so engines expose an explicit lifecycle: `load` brings the
//! model into memory (repeated calls are no-ops), `unload` frees it (safe without a prior
//! `load`). The scan orchestrator owns the engine and decides when each happens.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::document::ocr_output_name;

const KEEP_LOADED: &str = "30m";

/// Errors raised by OCR engines.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Model could not be brought into memory.
    #[error("Failed to load OCR model: {0}")]
    ModelLoad(String),
    /// `process` was called before a successful `load`.
    #[error("OCR model is not loaded")]
    NotLoaded,
    /// Image file could not be read.
    #[error("Failed to read image {path}: {source}")]
    ReadImage {
        /// Image path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// OCR server could not be reached.
    #[error("OCR service unavailable: {0}")]
    Unavailable(String),
    /// OCR server rejected the request.
    #[error("Text recognition failed: {0}")]
    RecognitionFailed(String),
    /// OCR server reply could not be decoded.
    #[error("Malformed OCR response: {0}")]
    InvalidResponse(String),
}

/// Text recognition backend with an explicit load/unload lifecycle.
#[async_trait]
pub trait OcrEngine: Send {
    /// Bring the model into memory. A no-op when already loaded.
    async fn load(&mut self) -> Result<(), OcrError>;

    /// Recognize the text in `image`.
    async fn process(&mut self, image: &Path, prompt: &str) -> Result<String, OcrError>;

    /// Release the model. Safe to call when nothing is loaded.
    async fn unload(&mut self);

    /// Whether the model is currently held.
    fn is_loaded(&self) -> bool;
}

/// OCR through a vision model served by Ollama's `/api/generate`.
pub struct OllamaOcrEngine {
    http: Client,
    base_url: String,
    model: String,
    loaded: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaOcrEngine {
    /// Build an engine for `model` served at `base_url`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, OcrError> {
        let http = Client::builder()
            .user_agent("privascan/ocr")
            .build()
            .map_err(|error| OcrError::Unavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            loaded: false,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response, OcrError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                OcrError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(OcrError::ModelLoad(format!(
                "model '{}' not found on Ollama: {body}",
                self.model
            )));
        }
        Err(OcrError::RecognitionFailed(format!(
            "Ollama returned {status}: {body}"
        )))
    }
}

#[async_trait]
impl OcrEngine for OllamaOcrEngine {
    async fn load(&mut self) -> Result<(), OcrError> {
        if self.loaded {
            return Ok(());
        }

        tracing::info!(model = %self.model, "Loading OCR model");
        let payload = json!({ "model": self.model, "keep_alive": KEEP_LOADED });
        self.post(&payload).await.map_err(|error| match error {
            OcrError::ModelLoad(_) => error,
            other => OcrError::ModelLoad(other.to_string()),
        })?;

        self.loaded = true;
        tracing::info!(model = %self.model, "OCR model loaded");
        Ok(())
    }

    async fn process(&mut self, image: &Path, prompt: &str) -> Result<String, OcrError> {
        if !self.loaded {
            return Err(OcrError::NotLoaded);
        }

        let bytes = tokio::fs::read(image)
            .await
            .map_err(|source| OcrError::ReadImage {
                path: image.to_path_buf(),
                source,
            })?;

        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "images": [STANDARD.encode(&bytes)],
            "stream": false,
            "keep_alive": KEEP_LOADED,
            "options": { "temperature": 0.0 },
        });

        let body: GenerateResponse = self.post(&payload).await?.json().await.map_err(|error| {
            OcrError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(OcrError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        tracing::debug!(image = %image.display(), chars = body.response.len(), "OCR complete");
        Ok(body.response.trim().to_string())
    }

    async fn unload(&mut self) {
        if !self.loaded {
            return;
        }

        let payload = json!({ "model": self.model, "keep_alive": 0 });
        match self.post(&payload).await {
            Ok(_) => tracing::info!(model = %self.model, "OCR model unloaded"),
            Err(error) => {
                tracing::warn!(model = %self.model, error = %error, "OCR unload request failed")
            }
        }
        self.loaded = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// Write recognized text next to other OCR results, returning the file path.
///
/// The file is named `ocr_<image file name>.txt` inside `output_dir`.
pub async fn write_ocr_output(output_dir: &Path, image: &Path, text: &str) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(ocr_output_name(image));
    tokio::fs::write(&path, text.as_bytes()).await?;
    Ok(path)
}
