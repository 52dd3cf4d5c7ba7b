//! File discovery: enumerate candidate files under a scan target.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Image extensions sent through OCR.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];
/// Native text extensions analyzed directly.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Errors raised while enumerating a scan target.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Target does not exist.
    #[error("Directory not found: {0}")]
    NotFound(PathBuf),
    /// Target exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    /// Traversal failed part-way.
    #[error("Failed to walk {path}: {source}")]
    Walk {
        /// Directory being walked.
        path: PathBuf,
        /// Underlying traversal error.
        #[source]
        source: walkdir::Error,
    },
}

/// Enumerates files by extension.
pub trait FileDiscovery: Send + Sync {
    /// List files under `directory` whose extension is in `extensions` (case-insensitive,
    /// without the dot). Returns absolute paths in a deterministic order.
    fn list_files(
        &self,
        directory: &Path,
        extensions: &[&str],
        recursive: bool,
    ) -> Result<Vec<PathBuf>, DiscoveryError>;
}

/// [`FileDiscovery`] over the local file system using `walkdir`.
#[derive(Debug, Clone, Default)]
pub struct WalkDirDiscovery {
    excluded: Vec<PathBuf>,
}

impl WalkDirDiscovery {
    /// Discovery with no excluded directories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip everything beneath `directory`.
    pub fn excluding(mut self, directory: impl AsRef<Path>) -> Self {
        self.excluded.push(absolute(directory.as_ref()));
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|excluded| path.starts_with(excluded))
    }
}

impl FileDiscovery for WalkDirDiscovery {
    fn list_files(
        &self,
        directory: &Path,
        extensions: &[&str],
        recursive: bool,
    ) -> Result<Vec<PathBuf>, DiscoveryError> {
        let root = absolute(directory);
        if !root.exists() {
            return Err(DiscoveryError::NotFound(root));
        }
        if !root.is_dir() {
            return Err(DiscoveryError::NotADirectory(root));
        }

        let walker = WalkDir::new(&root)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry.path()));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|source| DiscoveryError::Walk {
                path: root.clone(),
                source,
            })?;
            if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
                files.push(entry.into_path());
            }
        }

        tracing::debug!(
            directory = %root.display(),
            recursive,
            found = files.len(),
            "Discovered files"
        );
        Ok(files)
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_: io::Error| path.to_path_buf())
}
