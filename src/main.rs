use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use privascan::{
    analysis::PrivacyAnalyzer,
    config::{self, Config},
    discovery::{FileDiscovery, TEXT_EXTENSIONS, WalkDirDiscovery},
    document::ocr_source_name,
    embedding::build_embedding_client,
    llm::LlamaCppClient,
    logging,
    ocr::OllamaOcrEngine,
    processing::DocumentIndexer,
    scan::{
        ProgressReporter, ScanControl, ScanEntry, ScanOrchestrator, ScanPhase, ScanReport,
        ScanSettings,
    },
    store::QdrantStore,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "privascan",
    about = "Scan folders of images and notes for privacy-sensitive content"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR images, classify every text, and index the results.
    Scan(ScanArgs),
    /// Index text files and existing OCR outputs without analysis.
    Index {
        directory: PathBuf,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Semantic search over indexed documents.
    Search {
        query: String,
        #[arg(short = 'k', long, default_value_t = 5)]
        limit: usize,
    },
    /// List indexed documents.
    Documents,
    /// Show vector store statistics.
    Stats,
}

#[derive(Args)]
struct ScanArgs {
    directory: PathBuf,
    #[arg(short, long)]
    recursive: bool,
    #[arg(long)]
    no_ocr: bool,
    #[arg(long)]
    no_index: bool,
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    llm_url: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("invalid configuration")?;
    logging::init_tracing();

    match cli.command {
        Command::Scan(args) => scan(config, args).await,
        Command::Index {
            directory,
            recursive,
        } => index(config, &directory, recursive).await,
        Command::Search { query, limit } => search(config, &query, limit).await,
        Command::Documents => documents(config).await,
        Command::Stats => stats(config).await,
    }
}

async fn scan(config: &Config, args: ScanArgs) -> Result<()> {
    let recursive = args.recursive || config.scan_recursive;
    let mut settings = ScanSettings::from_config(config);
    if args.no_ocr {
        settings.ocr_enabled = false;
    }
    if args.no_index {
        settings.indexing_enabled = false;
    }
    if let Some(output) = args.output {
        settings.output_dir = output;
    }

    let llm_url = args.llm_url.unwrap_or_else(|| config.llm_base_url.clone());
    let llm = LlamaCppClient::new(llm_url, config.llm_api_key.clone())
        .context("failed to build language-model client")?;
    let analyzer = PrivacyAnalyzer::new(
        Arc::new(llm),
        config.analysis_max_retries,
        config.llm_model.clone(),
    );
    let discovery = WalkDirDiscovery::new().excluding(&settings.output_dir);

    let mut orchestrator = ScanOrchestrator::new(Box::new(discovery), analyzer, settings.clone());
    if settings.ocr_enabled {
        let engine = OllamaOcrEngine::new(config.ocr_base_url.clone(), config.ocr_model.clone())
            .context("failed to build OCR client")?;
        orchestrator = orchestrator.with_ocr(Box::new(engine));
    }
    if settings.indexing_enabled {
        match connect_indexer(config).await {
            Ok(indexer) => orchestrator = orchestrator.with_indexer(indexer),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "Vector store unavailable; indexing disabled");
            }
        }
    }

    let (progress, mut events) = ProgressReporter::channel();
    let control = ScanControl::new(CancellationToken::new(), progress);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(
                phase = %event.phase,
                current = event.current,
                total = event.total,
                "{}",
                event.message
            );
        }
    });
    let cancel = control.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current item");
            cancel.cancel();
        }
    });

    let report = orchestrator.scan(&args.directory, recursive, &control).await;
    drop(control);
    printer.await.context("progress printer panicked")?;

    print_report(&report);
    if report.outcome == ScanPhase::FailedFatal {
        bail!(
            "scan failed: {}",
            report.failure.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_report(report: &ScanReport) {
    let summary = &report.summary;
    println!(
        "Scan of {}: {}",
        summary.scanned_directory.display(),
        report.outcome
    );
    println!(
        "  discovered {} image(s), {} text file(s); {} result(s)",
        summary.discovered.images, summary.discovered.text_files, summary.total_entries
    );
    let counts = summary
        .risk_counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(label, count)| format!("{label}: {count}"))
        .collect::<Vec<_>>();
    if !counts.is_empty() {
        println!("  {}", counts.join(", "));
    }
    if let Some(stats) = &summary.index_stats {
        println!(
            "  indexed {}/{} document(s), {} failed, {} skipped",
            stats.successful, stats.total, stats.failed, stats.skipped
        );
    }

    if !summary.high_risk_files.is_empty() {
        println!("High-risk files:");
        for flagged in &summary.high_risk_files {
            println!(
                "  [{}] {} {}",
                flagged.risk_level,
                flagged.path.display(),
                flagged.categories.join(", ")
            );
        }
    }
    for entry in &report.entries {
        if let ScanEntry::Error(error) = entry {
            println!(
                "  failed ({}): {} - {}",
                error.stage,
                error.path.display(),
                error.message
            );
        }
    }
    if let Some(path) = &report.summary_path {
        println!("Summary written to {}", path.display());
    }
}

async fn connect_indexer(config: &Config) -> Result<DocumentIndexer> {
    let embedder = build_embedding_client(config).context("failed to build embedding client")?;
    let store = QdrantStore::new(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        config.qdrant_collection_name.clone(),
        embedder,
    )
    .context("failed to build Qdrant client")?;
    store
        .ensure_collection()
        .await
        .with_context(|| format!("failed to prepare collection {}", store.collection()))?;
    Ok(DocumentIndexer::new(
        Arc::new(store),
        config.text_splitter_chunk_size,
        config.text_splitter_chunk_overlap,
    ))
}

async fn index(config: &Config, directory: &Path, recursive: bool) -> Result<()> {
    let discovery = WalkDirDiscovery::new().excluding(&config.output_dir);
    let mut paths = discovery
        .list_files(directory, TEXT_EXTENSIONS, recursive)
        .with_context(|| format!("failed to list {}", directory.display()))?;
    if config.output_dir.is_dir() {
        let outputs = WalkDirDiscovery::new()
            .list_files(&config.output_dir, &["txt"], false)
            .context("failed to list OCR outputs")?;
        paths.extend(outputs.into_iter().filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(ocr_source_name)
                .is_some()
        }));
    }

    let indexer = connect_indexer(config).await?;
    let stats = indexer.index_all(&paths).await;
    let report = serde_json::json!({
        "stats": stats,
        "metrics": indexer.metrics_snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let indexer = connect_indexer(config).await?;
    let hits = indexer.search(query, limit).await.context("search failed")?;
    if hits.is_empty() {
        println!("No matches.");
    }
    for hit in hits {
        let chunk = hit
            .chunk_index
            .map(|index| format!(" [chunk {index}]"))
            .unwrap_or_default();
        let excerpt: String = hit.text.chars().take(160).collect();
        println!("{:.3}  {}{chunk}", hit.score, hit.source_path);
        println!("       {}", excerpt.replace('\n', " "));
    }
    Ok(())
}

async fn documents(config: &Config) -> Result<()> {
    let indexer = connect_indexer(config).await?;
    let documents = indexer
        .list_documents()
        .await
        .context("failed to list documents")?;
    for document in &documents {
        println!("{} ({} record(s))", document.source_path, document.records.len());
    }
    println!("{} document(s)", documents.len());
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let indexer = connect_indexer(config).await?;
    let records = indexer.count().await.context("failed to count records")?;
    let report = serde_json::json!({
        "collection": config.qdrant_collection_name,
        "records": records,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
