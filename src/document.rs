//! Documents, their path-derived fingerprints, and record identifiers.
//!
//! A document's identity comes from its absolute path, never its content: scanning the same
//! path twice yields the same fingerprint even when the text changed, so re-indexing replaces
//! records instead of duplicating them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

const OCR_OUTPUT_PREFIX: &str = "ocr_";
const OCR_OUTPUT_SUFFIX: &str = ".txt";

/// Where a document's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Text recognized from an image.
    Image,
    /// Native text or markdown file.
    Text,
}

impl SourceKind {
    /// Classify a file on disk: OCR output files count as image-derived.
    pub fn infer(path: &Path) -> Self {
        let is_ocr = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(ocr_source_name)
            .is_some();
        if is_ocr { Self::Image } else { Self::Text }
    }

    /// Lowercase label stored in index metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
        }
    }
}

/// A logical unit of text content keyed by its absolute source path.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    content: String,
    kind: SourceKind,
}

impl Document {
    /// Build a document from in-memory text. Relative paths are made absolute.
    pub fn new(path: impl AsRef<Path>, content: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            path: absolute_path(path.as_ref()),
            content: content.into(),
            kind,
        }
    }

    /// Read a document from disk, decoding as UTF-8 with a Latin-1 fallback.
    ///
    /// Only I/O failures are reported; undecodable bytes never make a file unreadable.
    pub fn load(path: impl AsRef<Path>, kind: SourceKind) -> io::Result<Self> {
        let path = path.as_ref();
        let content = read_text(path)?;
        Ok(Self::new(path, content, kind))
    }

    /// Absolute source path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw text content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content classification.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Content size in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Content length in characters, the unit chunk sizes are measured in.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// File name component, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Stable identifier derived from the absolute path.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.path)
    }
}

/// SHA-256 hex digest of an absolute path.
pub fn fingerprint(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

/// Identifier of the `ordinal`-th chunk of a document.
pub fn chunk_id(fingerprint: &str, ordinal: usize) -> String {
    format!("{fingerprint}_chunk{ordinal}")
}

/// Name of the OCR output file written for an image.
pub fn ocr_output_name(image: &Path) -> String {
    let name = image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{OCR_OUTPUT_PREFIX}{name}{OCR_OUTPUT_SUFFIX}")
}

/// Recover the image file name from an OCR output file name, if it is one.
pub fn ocr_source_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(OCR_OUTPUT_PREFIX)?
        .strip_suffix(OCR_OUTPUT_SUFFIX)
        .filter(|name| !name.is_empty())
}

/// Read a file as UTF-8, falling back to Latin-1 when the bytes are not valid UTF-8.
pub fn read_text(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => Ok(err.into_bytes().into_iter().map(char::from).collect()),
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_depends_on_path_not_content() {
        let first = Document::new("/data/notes.txt", "alpha", SourceKind::Text);
        let second = Document::new("/data/notes.txt", "beta", SourceKind::Text);
        let other = Document::new("/data/other.txt", "alpha", SourceKind::Text);

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_ne!(first.fingerprint(), other.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
    }

    #[test]
    fn relative_paths_become_absolute() {
        let doc = Document::new("notes.txt", "text", SourceKind::Text);
        assert!(doc.path().is_absolute());
    }

    #[test]
    fn chunk_ids_append_ordinal() {
        assert_eq!(chunk_id("abc", 0), "abc_chunk0");
        assert_eq!(chunk_id("abc", 12), "abc_chunk12");
    }

    #[test]
    fn ocr_names_round_trip() {
        let name = ocr_output_name(Path::new("/photos/receipt.png"));
        assert_eq!(name, "ocr_receipt.png.txt");
        assert_eq!(ocr_source_name(&name), Some("receipt.png"));
        assert_eq!(ocr_source_name("notes.txt"), None);
        assert_eq!(ocr_source_name("ocr_.txt"), None);
    }

    #[test]
    fn infers_kind_from_file_name() {
        assert_eq!(
            SourceKind::infer(Path::new("/out/ocr_scan.jpg.txt")),
            SourceKind::Image
        );
        assert_eq!(SourceKind::infer(Path::new("/docs/readme.md")), SourceKind::Text);
    }

    #[test]
    fn read_text_falls_back_to_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.txt");
        std::fs::write(&path, [b'c', b'a', b'f', 0xE9]).unwrap();

        let text = read_text(&path).unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn load_reports_missing_files() {
        let error = Document::load("/definitely/not/here.txt", SourceKind::Text).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
    }
}
