//! Tracing setup for scans.
//!
//! Diagnostics go to stdout through a compact formatter and are mirrored into a log file
//! through a non-blocking writer, so a slow disk never stalls OCR or analysis. The file is
//! `PRIVASCAN_LOG_FILE` when that variable is set, else `logs/privascan.log`.
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable that redirects the log file.
pub const LOG_FILE_ENV: &str = "PRIVASCAN_LOG_FILE";

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_NAME: &str = "privascan.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file layer writes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogDestination {
    /// A file named by the user, appended to.
    Explicit(PathBuf),
    /// `<dir>/<name>`, with the directory created on demand.
    Default { dir: PathBuf, name: &'static str },
}

impl LogDestination {
    fn resolve(explicit: Option<String>) -> Self {
        match explicit.map(|value| value.trim().to_string()) {
            Some(path) if !path.is_empty() => Self::Explicit(PathBuf::from(path)),
            _ => Self::Default {
                dir: PathBuf::from(DEFAULT_LOG_DIR),
                name: DEFAULT_LOG_NAME,
            },
        }
    }

    fn open(&self) -> std::io::Result<(NonBlocking, WorkerGuard)> {
        match self {
            Self::Explicit(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(tracing_appender::non_blocking(file))
            }
            Self::Default { dir, name } => {
                std::fs::create_dir_all(dir)?;
                let appender = tracing_appender::rolling::never(dir, name);
                Ok(tracing_appender::non_blocking(appender))
            }
        }
    }

    fn path(&self) -> PathBuf {
        match self {
            Self::Explicit(path) => path.clone(),
            Self::Default { dir, name } => Path::new(dir).join(name),
        }
    }
}

/// Install the stdout and file subscribers.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. If the log file cannot be opened the
/// scan still runs with stdout logging only. Later calls keep the first subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact());

    let destination = LogDestination::resolve(std::env::var(LOG_FILE_ENV).ok());
    let installed = match destination.open() {
        Ok((writer, guard)) => {
            let _ = FILE_GUARD.set(guard);
            registry
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .compact(),
                )
                .try_init()
        }
        Err(err) => {
            eprintln!(
                "Logging to stdout only; cannot open {}: {err}",
                destination.path().display()
            );
            registry.try_init()
        }
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_blank_variable_uses_default_file() {
        let expected = PathBuf::from("logs").join("privascan.log");
        assert_eq!(LogDestination::resolve(None).path(), expected);
        assert_eq!(LogDestination::resolve(Some("  ".into())).path(), expected);
    }

    #[test]
    fn explicit_file_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scan.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "earlier\n").unwrap();

        let destination = LogDestination::resolve(Some(path.display().to_string()));
        assert_eq!(destination, LogDestination::Explicit(path.clone()));
        let (_writer, guard) = destination.open().unwrap();
        drop(guard);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\n");
    }
}
