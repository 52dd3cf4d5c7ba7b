//! Multi-phase privacy scan of a directory.
//!
//! A scan discovers images and text files, extracts image text through OCR, releases the OCR
//! model, classifies every text through the language model, optionally indexes everything into
//! the vector store, and writes a summary. Callers observe progress through a channel and stop
//! a scan with a cancellation token; both are bundled in [`ScanControl`].

mod orchestrator;
pub mod progress;
pub mod report;
pub mod session;

pub use orchestrator::{ScanOrchestrator, ScanSettings};
pub use progress::{ProgressEvent, ProgressReporter, ScanControl};
pub use report::{
    DiscoveryCounts, ErrorResult, FlaggedFile, ImageResult, ScanEntry, ScanReport, ScanSummary,
    TextResult,
};
pub use session::{ScanPhase, ScanSession};
