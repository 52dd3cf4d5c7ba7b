//! The scan pipeline: discovery, OCR, model release, analysis, indexing, summary.

use super::progress::ScanControl;
use super::report::{
    DiscoveryCounts, ErrorResult, ImageResult, ScanEntry, ScanReport, ScanSummary, TextResult,
    write_summary,
};
use super::session::{ScanPhase, ScanSession};
use crate::analysis::{AnalysisContext, AnalysisResult, PrivacyAnalyzer};
use crate::config::Config;
use crate::discovery::{DiscoveryError, FileDiscovery, IMAGE_EXTENSIONS, TEXT_EXTENSIONS};
use crate::document::{SourceKind, read_text};
use crate::ocr::{OcrEngine, write_ocr_output};
use crate::processing::{DocumentIndexer, IndexStats};
use crate::store::payload::current_timestamp_rfc3339;
use std::path::{Path, PathBuf};

/// Switches and locations that shape a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Run images through OCR.
    pub ocr_enabled: bool,
    /// Write documents into the vector store after analysis.
    pub indexing_enabled: bool,
    /// Instruction sent with every image.
    pub ocr_prompt: String,
    /// Folder receiving OCR output files and the summary.
    pub output_dir: PathBuf,
}

impl ScanSettings {
    /// Settings taken from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ocr_enabled: config.ocr_enabled,
            indexing_enabled: config.indexing_enabled,
            ocr_prompt: config.ocr_prompt.clone(),
            output_dir: config.output_dir.clone(),
        }
    }
}

/// Why a scan stopped before finishing.
enum Halt {
    Cancelled,
    Fatal(String),
}

/// OCR text waiting for analysis, tied to its entry.
struct PendingImage {
    entry: usize,
    file_name: String,
    text: String,
}

/// Mutable state threaded through the phases of one scan.
struct ScanRun {
    session: ScanSession,
    entries: Vec<ScanEntry>,
    pending: Vec<PendingImage>,
    discovered: DiscoveryCounts,
    index_stats: Option<IndexStats>,
}

impl ScanRun {
    fn new(directory: &Path, recursive: bool) -> Self {
        Self {
            session: ScanSession::new(directory, recursive),
            entries: Vec::new(),
            pending: Vec::new(),
            discovered: DiscoveryCounts::default(),
            index_stats: None,
        }
    }

    fn halt(&mut self, halt: Halt) {
        match halt {
            Halt::Cancelled => self.session.cancel(),
            Halt::Fatal(reason) => self.session.fail(reason),
        }
    }

    fn summary(&self) -> ScanSummary {
        ScanSummary::build(&self.session, &self.entries, self.discovered, self.index_stats)
    }

    fn into_report(self, summary: ScanSummary, summary_path: Option<PathBuf>) -> ScanReport {
        ScanReport {
            outcome: self.session.phase(),
            failure: self.session.failure().map(str::to_string),
            summary,
            entries: self.entries,
            summary_path,
        }
    }
}

/// Runs scans one at a time, owning the OCR engine between them.
///
/// The OCR model is loaded lazily on the first image and released exactly once when the
/// extraction phase ends, whether it finished, failed, or was cancelled.
pub struct ScanOrchestrator {
    discovery: Box<dyn FileDiscovery>,
    ocr: Option<Box<dyn OcrEngine>>,
    analyzer: PrivacyAnalyzer,
    indexer: Option<DocumentIndexer>,
    settings: ScanSettings,
}

impl ScanOrchestrator {
    /// Orchestrator without OCR or indexing; add them with the `with_*` builders.
    pub fn new(
        discovery: Box<dyn FileDiscovery>,
        analyzer: PrivacyAnalyzer,
        settings: ScanSettings,
    ) -> Self {
        Self {
            discovery,
            ocr: None,
            analyzer,
            indexer: None,
            settings,
        }
    }

    /// Use `engine` for image text extraction.
    pub fn with_ocr(mut self, engine: Box<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// Index scanned documents through `indexer`.
    pub fn with_indexer(mut self, indexer: DocumentIndexer) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Scan `directory` and return everything gathered, whatever the outcome.
    pub async fn scan(
        &mut self,
        directory: &Path,
        recursive: bool,
        control: &ScanControl,
    ) -> ScanReport {
        let mut run = ScanRun::new(directory, recursive);
        tracing::info!(directory = %run.session.directory().display(), recursive, "Scan started");

        run.session.advance(ScanPhase::Discovering);
        control.progress.report(
            ScanPhase::Discovering,
            0,
            1,
            format!("Scanning {}", run.session.directory().display()),
        );
        let (images, texts) = match self.discover(run.session.directory(), recursive) {
            Ok(found) => found,
            Err(error) => {
                run.halt(Halt::Fatal(error.to_string()));
                return self.finish(run, control).await;
            }
        };
        run.discovered = DiscoveryCounts {
            images: images.len(),
            text_files: texts.len(),
        };
        control.progress.report(
            ScanPhase::Discovering,
            1,
            1,
            format!("Found {} image(s) and {} text file(s)", images.len(), texts.len()),
        );

        if !self.analyzer.is_available().await {
            run.halt(Halt::Fatal("Language model server is unreachable".to_string()));
            return self.finish(run, control).await;
        }

        if self.ocr_active() {
            run.session.advance(ScanPhase::ExtractingText);
            let extracted = self.extract_text(&images, &mut run, control).await;
            if extracted.is_ok() {
                run.session.advance(ScanPhase::ReleasingOcr);
            }
            self.release_ocr(control).await;
            if let Err(halt) = extracted {
                run.halt(halt);
                return self.finish(run, control).await;
            }
        } else if !images.is_empty() {
            tracing::warn!(images = images.len(), "OCR disabled; images are not processed");
        }

        run.session.advance(ScanPhase::Analyzing);
        if let Err(halt) = self.analyze(&texts, &mut run, control).await {
            run.halt(halt);
            return self.finish(run, control).await;
        }

        if self.settings.indexing_enabled && self.indexer.is_some() {
            run.session.advance(ScanPhase::Indexing);
            if let Err(halt) = self.index(&texts, &mut run, control).await {
                run.halt(halt);
                return self.finish(run, control).await;
            }
        }

        run.session.advance(ScanPhase::Summarizing);
        self.finish(run, control).await
    }

    fn ocr_active(&self) -> bool {
        if !self.settings.ocr_enabled {
            return false;
        }
        if self.ocr.is_none() {
            tracing::warn!("OCR enabled but no engine configured");
            return false;
        }
        true
    }

    fn discover(
        &self,
        directory: &Path,
        recursive: bool,
    ) -> Result<(Vec<PathBuf>, Vec<PathBuf>), DiscoveryError> {
        let images = self
            .discovery
            .list_files(directory, IMAGE_EXTENSIONS, recursive)?;
        let texts = self
            .discovery
            .list_files(directory, TEXT_EXTENSIONS, recursive)?;
        tracing::info!(images = images.len(), texts = texts.len(), "Discovery finished");
        Ok((images, texts))
    }

    async fn extract_text(
        &mut self,
        images: &[PathBuf],
        run: &mut ScanRun,
        control: &ScanControl,
    ) -> Result<(), Halt> {
        let Some(engine) = self.ocr.as_mut() else {
            return Ok(());
        };
        let total = images.len();

        for (index, image) in images.iter().enumerate() {
            if control.is_cancelled() {
                return Err(Halt::Cancelled);
            }
            if !engine.is_loaded() {
                control
                    .progress
                    .report(ScanPhase::ExtractingText, index, total, "Loading OCR model");
                engine
                    .load()
                    .await
                    .map_err(|error| Halt::Fatal(format!("OCR model failed to load: {error}")))?;
            }

            let file_name = display_name(image);
            control.progress.report(
                ScanPhase::ExtractingText,
                index,
                total,
                format!("Extracting text from image {}/{total}: {file_name}", index + 1),
            );

            let recognized = match engine.process(image, &self.settings.ocr_prompt).await {
                Ok(text) => write_ocr_output(&self.settings.output_dir, image, &text)
                    .await
                    .map(|ocr_file| (ocr_file, text))
                    .map_err(|error| format!("Failed to write OCR output: {error}")),
                Err(error) => Err(error.to_string()),
            };

            match recognized {
                Ok((ocr_file, text)) => {
                    tracing::debug!(image = %image.display(), chars = text.chars().count(), "Text extracted");
                    run.entries.push(ScanEntry::Image(ImageResult {
                        image_path: image.clone(),
                        ocr_file,
                        ocr_text_length: text.chars().count(),
                        extracted_at: current_timestamp_rfc3339(),
                        analysis: None,
                    }));
                    run.pending.push(PendingImage {
                        entry: run.entries.len() - 1,
                        file_name,
                        text,
                    });
                }
                Err(message) => {
                    tracing::warn!(image = %image.display(), error = %message, "OCR failed");
                    run.entries.push(ScanEntry::Error(ErrorResult::new(
                        image,
                        ScanPhase::ExtractingText,
                        message,
                    )));
                }
            }
        }
        if control.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        control
            .progress
            .report(ScanPhase::ExtractingText, total, total, "Text extraction finished");
        Ok(())
    }

    async fn release_ocr(&mut self, control: &ScanControl) {
        let Some(engine) = self.ocr.as_mut() else {
            return;
        };
        control
            .progress
            .report(ScanPhase::ReleasingOcr, 0, 1, "Unloading OCR model");
        engine.unload().await;
        tracing::info!("OCR model released");
        control
            .progress
            .report(ScanPhase::ReleasingOcr, 1, 1, "OCR model unloaded");
    }

    async fn analyze(
        &self,
        texts: &[PathBuf],
        run: &mut ScanRun,
        control: &ScanControl,
    ) -> Result<(), Halt> {
        let pending = std::mem::take(&mut run.pending);
        let total = pending.len() + texts.len();
        let mut done = 0;

        for image in pending {
            if control.is_cancelled() {
                return Err(Halt::Cancelled);
            }
            control.progress.report(
                ScanPhase::Analyzing,
                done,
                total,
                format!("Analyzing image text {}/{total}: {}", done + 1, image.file_name),
            );
            let analysis = if image.text.trim().is_empty() {
                AnalysisResult::blank()
            } else {
                self.analyzer
                    .analyze(&image.text, &image.file_name, AnalysisContext::OcrExtraction)
                    .await
            };
            if let Some(ScanEntry::Image(entry)) = run.entries.get_mut(image.entry) {
                entry.analysis = Some(analysis);
            }
            done += 1;
        }

        for path in texts {
            if control.is_cancelled() {
                return Err(Halt::Cancelled);
            }
            let file_name = display_name(path);
            control.progress.report(
                ScanPhase::Analyzing,
                done,
                total,
                format!("Analyzing text file {}/{total}: {file_name}", done + 1),
            );
            match read_text(path) {
                Ok(content) if content.trim().is_empty() => {
                    tracing::warn!(path = %path.display(), "Skipping empty file");
                }
                Ok(content) => {
                    let analysis = self
                        .analyzer
                        .analyze(&content, &file_name, AnalysisContext::NativeText)
                        .await;
                    run.entries.push(ScanEntry::Text(TextResult {
                        path: path.clone(),
                        analysis,
                    }));
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Unreadable file");
                    run.entries.push(ScanEntry::Error(ErrorResult::new(
                        path,
                        ScanPhase::Analyzing,
                        format!("Failed to read file: {error}"),
                    )));
                }
            }
            done += 1;
        }
        if control.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        control
            .progress
            .report(ScanPhase::Analyzing, total, total, "Analysis finished");
        Ok(())
    }

    async fn index(
        &self,
        texts: &[PathBuf],
        run: &mut ScanRun,
        control: &ScanControl,
    ) -> Result<(), Halt> {
        let Some(indexer) = &self.indexer else {
            return Ok(());
        };
        let targets: Vec<PathBuf> = run
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ScanEntry::Image(image) => Some(image.ocr_file.clone()),
                _ => None,
            })
            .chain(texts.iter().cloned())
            .collect();
        let total = targets.len();
        let stats = run.index_stats.insert(IndexStats::default());

        for (index, path) in targets.iter().enumerate() {
            if control.is_cancelled() {
                return Err(Halt::Cancelled);
            }
            control.progress.report(
                ScanPhase::Indexing,
                index,
                total,
                format!("Indexing {}/{total}: {}", index + 1, display_name(path)),
            );
            let result = indexer.index_file(path).await;
            stats.record(SourceKind::infer(path), &result);
        }
        if control.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        tracing::info!(
            total = stats.total,
            successful = stats.successful,
            failed = stats.failed,
            "Scan indexing finished"
        );
        control
            .progress
            .report(ScanPhase::Indexing, total, total, "Indexing finished");
        Ok(())
    }

    /// Build the report; on the completed path also persist the summary and enter `Done`.
    async fn finish(&self, mut run: ScanRun, control: &ScanControl) -> ScanReport {
        if run.session.phase() != ScanPhase::Summarizing {
            let summary = run.summary();
            tracing::info!(outcome = %run.session.phase(), entries = run.entries.len(), "Scan stopped early");
            return run.into_report(summary, None);
        }

        control
            .progress
            .report(ScanPhase::Summarizing, 0, 1, "Saving results");
        run.session.advance(ScanPhase::Done);
        let summary = run.summary();
        let summary_path =
            match write_summary(&self.settings.output_dir, &summary, &run.entries).await {
                Ok(path) => Some(path),
                Err(error) => {
                    tracing::warn!(error = %error, "Failed to write scan summary");
                    None
                }
            };

        control
            .progress
            .report(ScanPhase::Done, 1, 1, "Scan complete");
        tracing::info!(
            entries = run.entries.len(),
            high_risk = summary.high_risk_files.len(),
            "Scan complete"
        );
        run.into_report(summary, summary_path)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
