//! Per-file scan entries, the aggregated summary, and its JSON artifact.

use super::session::{ScanPhase, ScanSession};
use crate::analysis::{AnalysisResult, RiskLevel};
use crate::processing::IndexStats;
use crate::store::payload::current_timestamp_rfc3339;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;

/// Label counted for images whose OCR text has not been analyzed yet.
pub const PENDING_LABEL: &str = "pending";

/// An image that went through OCR.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageResult {
    /// Source image.
    pub image_path: PathBuf,
    /// File holding the recognized text.
    pub ocr_file: PathBuf,
    /// Characters recognized.
    pub ocr_text_length: usize,
    /// RFC 3339 time the text was extracted.
    pub extracted_at: String,
    /// Classification of the recognized text; `None` while pending.
    pub analysis: Option<AnalysisResult>,
}

/// A native text or markdown file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextResult {
    /// Source file.
    pub path: PathBuf,
    /// Classification of the file's content.
    pub analysis: AnalysisResult,
}

/// A file that failed before it could be classified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResult {
    /// File that failed.
    pub path: PathBuf,
    /// Phase where the failure happened.
    pub stage: ScanPhase,
    /// Failure description.
    pub message: String,
    /// RFC 3339 time of the failure.
    pub timestamp: String,
}

impl ErrorResult {
    /// Failure stamped with the current time.
    pub fn new(path: &Path, stage: ScanPhase, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            stage,
            message: message.into(),
            timestamp: current_timestamp_rfc3339(),
        }
    }
}

/// Result of one scanned file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "file_type", rename_all = "lowercase")]
pub enum ScanEntry {
    /// OCR'd image.
    Image(ImageResult),
    /// Native text file.
    Text(TextResult),
    /// File that failed.
    Error(ErrorResult),
}

impl ScanEntry {
    /// Source file of the entry.
    pub fn path(&self) -> &Path {
        match self {
            Self::Image(image) => &image.image_path,
            Self::Text(text) => &text.path,
            Self::Error(error) => &error.path,
        }
    }

    /// Risk of the entry; `None` while an image is still pending analysis.
    pub fn risk_level(&self) -> Option<RiskLevel> {
        match self {
            Self::Image(image) => image.analysis.as_ref().map(|analysis| analysis.risk_level),
            Self::Text(text) => Some(text.analysis.risk_level),
            Self::Error(_) => Some(RiskLevel::Error),
        }
    }

    fn analysis(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Image(image) => image.analysis.as_ref(),
            Self::Text(text) => Some(&text.analysis),
            Self::Error(_) => None,
        }
    }
}

/// A high or critical finding listed in the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedFile {
    /// Source file.
    pub path: PathBuf,
    /// Its risk level.
    pub risk_level: RiskLevel,
    /// Categories reported for it.
    pub categories: Vec<String>,
}

/// Files found during discovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryCounts {
    /// Images found.
    pub images: usize,
    /// Text and markdown files found.
    pub text_files: usize,
}

/// Aggregate view of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    /// RFC 3339 time the summary was built.
    pub scan_timestamp: String,
    /// Absolute scan target.
    pub scanned_directory: PathBuf,
    /// Whether subdirectories were included.
    pub recursive: bool,
    /// Files found during discovery.
    pub discovered: DiscoveryCounts,
    /// Entries produced.
    pub total_entries: usize,
    /// Images whose text was extracted.
    pub ocr_processed: usize,
    /// Entries per risk label, including `error` and `pending`.
    pub risk_counts: BTreeMap<String, usize>,
    /// High and critical entries.
    pub high_risk_files: Vec<FlaggedFile>,
    /// Indexing totals when the indexing phase ran.
    pub index_stats: Option<IndexStats>,
    /// Phases that ran to completion.
    pub completed_phases: Vec<ScanPhase>,
}

impl ScanSummary {
    /// Aggregate `entries` for the state `session` is in.
    pub fn build(
        session: &ScanSession,
        entries: &[ScanEntry],
        discovered: DiscoveryCounts,
        index_stats: Option<IndexStats>,
    ) -> Self {
        let mut risk_counts: BTreeMap<String, usize> = RiskLevel::ALL
            .iter()
            .map(|level| (level.as_str().to_string(), 0))
            .collect();
        risk_counts.insert(PENDING_LABEL.to_string(), 0);

        let mut high_risk_files = Vec::new();
        for entry in entries {
            let label = entry.risk_level().map_or(PENDING_LABEL, RiskLevel::as_str);
            *risk_counts.entry(label.to_string()).or_default() += 1;

            if let Some(analysis) = entry.analysis()
                && analysis.risk_level.is_severe()
            {
                high_risk_files.push(FlaggedFile {
                    path: entry.path().to_path_buf(),
                    risk_level: analysis.risk_level,
                    categories: analysis.categories.clone(),
                });
            }
        }

        Self {
            scan_timestamp: current_timestamp_rfc3339(),
            scanned_directory: session.directory().to_path_buf(),
            recursive: session.recursive(),
            discovered,
            total_entries: entries.len(),
            ocr_processed: entries
                .iter()
                .filter(|entry| matches!(entry, ScanEntry::Image(_)))
                .count(),
            risk_counts,
            high_risk_files,
            index_stats,
            completed_phases: session.completed_phases().to_vec(),
        }
    }

    /// Entries counted under `label` (a risk level or `pending`).
    pub fn count(&self, label: &str) -> usize {
        self.risk_counts.get(label).copied().unwrap_or(0)
    }
}

/// Everything a scan produced. Returned for every outcome, including failures.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Terminal phase reached.
    pub outcome: ScanPhase,
    /// Why the scan failed, for [`ScanPhase::FailedFatal`].
    pub failure: Option<String>,
    /// Aggregated counts.
    pub summary: ScanSummary,
    /// Per-file results in processing order.
    pub entries: Vec<ScanEntry>,
    /// Written summary artifact, when the scan completed.
    pub summary_path: Option<PathBuf>,
}

impl ScanReport {
    /// Whether every phase finished.
    pub fn is_complete(&self) -> bool {
        self.outcome == ScanPhase::Done
    }
}

#[derive(Serialize)]
struct SummaryArtifact<'a> {
    #[serde(flatten)]
    summary: &'a ScanSummary,
    results: &'a [ScanEntry],
}

/// File name of a summary written at `at`: `privacy_scan_summary_<YYYYMMDD_HHMMSS>.json`.
pub fn summary_file_name(at: OffsetDateTime) -> Result<String, time::error::Format> {
    let stamp = at.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    Ok(format!("privacy_scan_summary_{stamp}.json"))
}

/// Persist the summary and all entries as pretty JSON inside `output_dir`.
pub async fn write_summary(
    output_dir: &Path,
    summary: &ScanSummary,
    entries: &[ScanEntry],
) -> io::Result<PathBuf> {
    let file_name = summary_file_name(OffsetDateTime::now_utc()).map_err(io::Error::other)?;
    let artifact = SummaryArtifact {
        summary,
        results: entries,
    };
    let body = serde_json::to_vec_pretty(&artifact).map_err(io::Error::other)?;

    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(file_name);
    tokio::fs::write(&path, body).await?;
    tracing::info!(path = %path.display(), "Scan summary written");
    Ok(path)
}
