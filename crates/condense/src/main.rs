//! Summarize pending documents under a directory, or answer questions
//! about them.
//!
//! Reads the backend API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Summarize every pending .txt/.md document under ./docs
//! condense run --source-dir ./docs --artifacts-dir ./summaries
//!
//! # Raw chunks (no relevance filtering), two documents at a time
//! condense run --source-dir ./docs --no-filter --jobs 2
//!
//! # Redo documents that already have final artifacts
//! condense run --source-dir ./docs --reprocess
//!
//! # Ask a question over the indexed documents
//! condense ask "what does fault code P0420 mean?" --source-dir ./docs
//! ```

use chrono::Local;
use clap::{Parser, Subcommand};
use condense::prelude::*;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Bounded-context incremental document summarization.
#[derive(Parser)]
#[command(name = "condense")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize every pending document under a source directory
    Run {
        /// Directory of pre-extracted document text (.txt / .md)
        #[arg(long, default_value = ".")]
        source_dir: PathBuf,

        /// Directory for summary artifacts (keep it outside the source tree)
        #[arg(long, default_value = "artifacts")]
        artifacts_dir: PathBuf,

        /// Summarization model
        #[arg(long, default_value = condense::DEFAULT_MODEL)]
        model: String,

        /// Token budget at which a batch is flushed to the backend
        #[arg(long, default_value_t = condense::pipeline::config::DEFAULT_FLUSH_THRESHOLD)]
        flush_threshold: u32,

        /// Backoff-and-retry cycles per batch before the document fails
        #[arg(long, default_value_t = 3)]
        max_flush_retries: u32,

        /// Fixed backoff delay (seconds) after a rate-limit failure
        #[arg(long, default_value_t = 60)]
        backoff_secs: u64,

        /// Use exponential backoff instead of the fixed delay
        #[arg(long)]
        exponential_backoff: bool,

        /// Words per chunk when splitting documents
        #[arg(long, default_value_t = 60_000)]
        chunk_words: usize,

        /// Skip the fault-code / instruction relevance filter
        #[arg(long)]
        no_filter: bool,

        /// Documents to process concurrently (each document's pipeline stays
        /// strictly sequential)
        #[arg(long, default_value_t = 1)]
        jobs: usize,

        /// Also reprocess documents that already have final artifacts
        #[arg(long)]
        reprocess: bool,
    },
    /// Answer a question from the documents via embedding retrieval
    Ask {
        /// The question
        question: String,

        /// Directory of documents to index
        #[arg(long, default_value = ".")]
        source_dir: PathBuf,

        /// Ollama-compatible embeddings endpoint
        #[arg(long, default_value = condense::qa::DEFAULT_EMBEDDINGS_URL)]
        embeddings_url: String,

        /// Embedding model
        #[arg(long, default_value = condense::qa::DEFAULT_EMBEDDINGS_MODEL)]
        embeddings_model: String,

        /// Documents to include as answer context
        #[arg(long, default_value_t = 3)]
        top_k: usize,

        /// Answering model
        #[arg(long, default_value = condense::DEFAULT_MODEL)]
        model: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: OPENROUTER_KEY environment variable is not set");
            process::exit(1);
        }
    };

    let outcome = match cli.command {
        Command::Run {
            source_dir,
            artifacts_dir,
            model,
            flush_threshold,
            max_flush_retries,
            backoff_secs,
            exponential_backoff,
            chunk_words,
            no_filter,
            jobs,
            reprocess,
        } => {
            let config = PipelineConfig::default()
                .with_model(model)
                .with_flush_threshold(flush_threshold)
                .with_max_flush_retries(max_flush_retries)
                .with_backoff_delay(Duration::from_secs(backoff_secs))
                .with_artifacts_dir(artifacts_dir)
                .with_chunk_size_words(chunk_words)
                .with_relevance_filter(!no_filter);
            run_documents(
                api_key,
                config,
                source_dir,
                exponential_backoff,
                jobs.max(1),
                reprocess,
            )
            .await
        }
        Command::Ask {
            question,
            source_dir,
            embeddings_url,
            embeddings_model,
            top_k,
            model,
        } => {
            ask_documents(
                api_key,
                question,
                source_dir,
                embeddings_url,
                embeddings_model,
                top_k,
                model,
            )
            .await
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run_documents(
    api_key: String,
    config: PipelineConfig,
    source_dir: PathBuf,
    exponential_backoff: bool,
    jobs: usize,
    reprocess: bool,
) -> Result<(), String> {
    let client = OpenRouterClient::with_timeout(
        api_key,
        "https://github.com/tacryt-socryp/condense-rs",
        "condense",
        config.request_timeout,
    )?
    .with_model(&config.model)
    .with_temperature(config.temperature);
    let store = ArtifactStore::new(&config.artifacts_dir)
        .map_err(|e| format!("failed to create artifacts dir: {e}"))?;

    let documents = find_documents(&source_dir)?;
    let pending = if reprocess {
        documents
    } else {
        pending_documents(&documents, &store)?
    };

    if pending.is_empty() {
        println!("Nothing to do — every document has a final summary.");
        return Ok(());
    }
    println!("{} document(s) to process", pending.len());

    let filter = if config.relevance_filter {
        Some(RelevanceFilter::new()?)
    } else {
        None
    };
    let estimator = TokenEstimator::with_calibration(config.chars_per_token);
    let observer = LoggingObserver;

    // Ctrl-C requests a stop; each job ends at its next flush boundary,
    // keeping the last persisted artifact intact.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let results: Vec<Result<JobReport, String>> = stream::iter(pending)
        .map(|path| {
            let config = &config;
            let client = &client;
            let store = &store;
            let filter = filter.as_ref();
            let observer = &observer;
            let estimator = &estimator;
            let stop = stop.clone();
            async move {
                let doc_id = doc_id_for(&path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
                let source = ChunkSource::from_text(&text, config.chunk_size_words, estimator);

                let mut runner = JobRunner::new(client, store, config)
                    .with_observer(observer)
                    .with_stop_signal(move || stop.load(Ordering::Relaxed));
                if let Some(f) = filter {
                    runner = runner.with_filter(f);
                }
                if exponential_backoff {
                    runner = runner.with_backoff(ExponentialBackoff::default());
                }
                runner.run(&doc_id, source).await
            }
        })
        .buffer_unordered(jobs)
        .collect()
        .await;

    let mut failed = 0usize;
    for result in &results {
        let stamp = Local::now().format("%H:%M:%S");
        match result {
            Ok(report) => {
                let artifact = report
                    .artifact
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(no artifact)".to_string());
                println!(
                    "[{stamp}] {}: {:?} — {}/{} chunks, {} flush(es), {} backoff(s) -> {artifact}",
                    report.doc_id,
                    report.phase,
                    report.chunks_done,
                    report.chunks_total,
                    report.flushes,
                    report.backoffs,
                );
                if let Some(ref reason) = report.failure_reason {
                    println!("           reason: {reason}");
                }
                if report.phase == JobPhase::Failed {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("[{stamp}] error: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        Err(format!("{failed} document(s) did not finish"))
    } else {
        Ok(())
    }
}

async fn ask_documents(
    api_key: String,
    question: String,
    source_dir: PathBuf,
    embeddings_url: String,
    embeddings_model: String,
    top_k: usize,
    model: String,
) -> Result<(), String> {
    let embedder = OllamaEmbeddings::new(embeddings_url, embeddings_model)?;
    let client = OpenRouterClient::new(api_key)?
        .with_model(&model)
        .with_temperature(0.5);

    let index = DocumentIndex::build(&source_dir, &embedder).await?;
    if index.is_empty() {
        return Err("no documents found to index".to_string());
    }

    let answer = index.ask(&question, &embedder, &client, top_k).await?;
    println!("{answer}");
    Ok(())
}
