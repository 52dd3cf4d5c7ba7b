use crate::processing::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP_SENTENCES};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for a Privascan process.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the llama.cpp server used for privacy analysis.
    pub llm_base_url: String,
    /// Optional model name forwarded with chat completions.
    pub llm_model: Option<String>,
    /// Optional bearer token for the language-model server.
    pub llm_api_key: Option<String>,
    /// Whether images are run through OCR.
    pub ocr_enabled: bool,
    /// Base URL of the Ollama runtime hosting the OCR vision model.
    pub ocr_base_url: String,
    /// Vision model identifier used for text recognition.
    pub ocr_model: String,
    /// Instruction sent alongside every image.
    pub ocr_prompt: String,
    /// Whether discovered documents are written to the vector store.
    pub indexing_enabled: bool,
    /// Whether scans descend into subdirectories by default.
    pub scan_recursive: bool,
    /// Folder receiving OCR output files and scan summaries.
    pub output_dir: PathBuf,
    /// Target chunk size in characters.
    pub text_splitter_chunk_size: usize,
    /// Number of sentences carried over between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Corrective retries granted to malformed analysis responses.
    pub analysis_max_retries: usize,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for document storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime serving embeddings.
    pub ollama_url: String,
}

/// Supported embedding backends for the vector store.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic byte-hashing vectors; no model required.
    Hashing,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            llm_base_url: load_env_or("LLM_BASE_URL", "http://localhost:8080"),
            llm_model: load_env_optional("LLM_MODEL"),
            llm_api_key: load_env_optional("LLM_API_KEY"),
            ocr_enabled: parse_flag("OCR_ENABLED", true)?,
            ocr_base_url: load_env_or("OCR_BASE_URL", "http://127.0.0.1:11434"),
            ocr_model: load_env_or("OCR_MODEL", "glm-ocr"),
            ocr_prompt: load_env_or("OCR_PROMPT", "Text Recognition:"),
            indexing_enabled: parse_flag("INDEXING_ENABLED", true)?,
            scan_recursive: parse_flag("SCAN_RECURSIVE", false)?,
            output_dir: PathBuf::from(load_env_or("OUTPUT_DIR", "ocr_result")),
            text_splitter_chunk_size: parse_number("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            text_splitter_chunk_overlap: parse_number(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                DEFAULT_OVERLAP_SENTENCES,
            )?,
            analysis_max_retries: parse_number("ANALYSIS_MAX_RETRIES", 2)?,
            qdrant_url: load_env_or("QDRANT_URL", "http://127.0.0.1:6333"),
            qdrant_collection_name: load_env_or("QDRANT_COLLECTION_NAME", "documents"),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::Hashing),
            embedding_model: load_env_or("EMBEDDING_MODEL", "embeddinggemma"),
            embedding_dimension: parse_number("EMBEDDING_DIMENSION", 768)?,
            ollama_url: load_env_or("OLLAMA_URL", "http://127.0.0.1:11434"),
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_number(key: &str, default: usize) -> Result<usize, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

fn parse_flag(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        llm_base_url = %config.llm_base_url,
        ocr_enabled = config.ocr_enabled,
        indexing_enabled = config.indexing_enabled,
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
