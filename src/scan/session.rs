//! Scan phases and the mutable state of one run.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Phases of a scan in execution order, followed by the terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// Session created, nothing started.
    Idle,
    /// Enumerating images and text files.
    Discovering,
    /// Running OCR over discovered images.
    ExtractingText,
    /// Freeing the OCR model before analysis.
    ReleasingOcr,
    /// Classifying text through the language model.
    Analyzing,
    /// Writing documents into the vector store.
    Indexing,
    /// Aggregating and persisting the summary.
    Summarizing,
    /// Every phase finished.
    Done,
    /// Stopped at an item boundary on request.
    Cancelled,
    /// A session precondition could not be met.
    FailedFatal,
}

impl ScanPhase {
    /// Stable snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::ExtractingText => "extracting_text",
            Self::ReleasingOcr => "releasing_ocr",
            Self::Analyzing => "analyzing",
            Self::Indexing => "indexing",
            Self::Summarizing => "summarizing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::FailedFatal => "failed_fatal",
        }
    }

    /// Whether the session can no longer change phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::FailedFatal)
    }

    fn can_advance_to(self, next: ScanPhase) -> bool {
        use ScanPhase::*;
        match (self, next) {
            (Idle, Discovering)
            | (Discovering, ExtractingText | Analyzing)
            | (ExtractingText, ReleasingOcr)
            | (ReleasingOcr, Analyzing)
            | (Analyzing, Indexing | Summarizing)
            | (Indexing, Summarizing)
            | (Summarizing, Done) => true,
            (from, Cancelled | FailedFatal) => from != Idle && !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase bookkeeping for one scan of one directory.
#[derive(Debug, Clone)]
pub struct ScanSession {
    directory: PathBuf,
    recursive: bool,
    phase: ScanPhase,
    completed: Vec<ScanPhase>,
    failure: Option<String>,
}

impl ScanSession {
    /// Fresh session in [`ScanPhase::Idle`].
    pub fn new(directory: &Path, recursive: bool) -> Self {
        Self {
            directory: std::path::absolute(directory).unwrap_or_else(|_| directory.to_path_buf()),
            recursive,
            phase: ScanPhase::Idle,
            completed: Vec::new(),
            failure: None,
        }
    }

    /// Absolute scan target.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether subdirectories are scanned.
    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// Current phase.
    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Phases that ran to completion, in order.
    pub fn completed_phases(&self) -> &[ScanPhase] {
        &self.completed
    }

    /// Reason recorded by [`ScanSession::fail`].
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Finish the current phase and enter `next`.
    pub fn advance(&mut self, next: ScanPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal scan transition {} -> {next}",
            self.phase
        );
        if self.phase != ScanPhase::Idle {
            self.completed.push(self.phase);
        }
        tracing::debug!(from = %self.phase, to = %next, "Scan phase changed");
        self.phase = next;
    }

    /// Stop without marking the interrupted phase as completed.
    pub fn cancel(&mut self) {
        debug_assert!(self.phase.can_advance_to(ScanPhase::Cancelled));
        tracing::info!(phase = %self.phase, "Scan cancelled");
        self.phase = ScanPhase::Cancelled;
    }

    /// Abort the session because a precondition failed.
    pub fn fail(&mut self, reason: impl Into<String>) {
        debug_assert!(self.phase.can_advance_to(ScanPhase::FailedFatal));
        let reason = reason.into();
        tracing::error!(phase = %self.phase, reason = %reason, "Scan failed");
        self.failure = Some(reason);
        self.phase = ScanPhase::FailedFatal;
    }
}
