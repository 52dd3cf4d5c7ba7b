#![deny(missing_docs)]

//! Core library for Privascan, a local privacy scanner for folders of images and notes.

/// Language-model privacy classification.
pub mod analysis;
/// Environment-driven configuration management.
pub mod config;
/// File enumeration by extension.
pub mod discovery;
/// Documents, fingerprints, and OCR output naming.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Language-model client and structured-response extraction.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Indexing metrics helpers.
pub mod metrics;
/// OCR engine abstraction and the Ollama vision adapter.
pub mod ocr;
/// Document processing pipeline utilities.
pub mod processing;
/// Scan orchestration: phases, progress, cancellation, and reports.
pub mod scan;
/// Vector store abstraction and the Qdrant adapter.
pub mod store;
