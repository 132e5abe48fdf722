//! # Chunk Relay CLI (`relay`)
//!
//! ## Usage
//!
//! ```bash
//! relay --config ./config/relay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay chunk <file>` | Chunk a manuscript and print per-chunk diagnostics |
//! | `relay process <file>` | Chunk a manuscript and resolve every chunk through the providers |
//!
//! ## Examples
//!
//! ```bash
//! # Inspect how a manuscript will be split
//! relay chunk novel.txt --max-chunk-size 8000 --overlap-size 200
//!
//! # Summarize every chunk, three at a time, with JSON progress on stderr
//! relay process novel.txt --user-prompt "Summarize this passage" \
//!     --concurrency 3 --progress json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use chunk_relay::chunk::{estimate_processing_time, ChunkValidation, TextChunker};
use chunk_relay::config::{self, Config};
use chunk_relay::ingest;
use chunk_relay::logging;
use chunk_relay::models::{ChunkState, JobStatus, ProcessingJob};
use chunk_relay::orchestrator::FallbackOrchestrator;
use chunk_relay::progress::ProgressMode;
use chunk_relay::provider::ProviderSet;
use chunk_relay::retry::RetryPolicy;
use chunk_relay::stats;
use chunk_relay::store::{ChunkStore, InMemoryChunkStore};
use chunk_relay::supervisor::JobSupervisor;
use chunk_relay::tracker::{JobOptions, JobTracker};

const DEFAULT_CONFIG_PATH: &str = "./config/relay.toml";

/// Chunk Relay CLI: chunk long manuscripts and resolve every chunk through
/// ranked completion providers with retry and fallback.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/relay.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "relay",
    about = "Chunk Relay: chunk manuscripts and process them with provider fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/relay.toml`. When the default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk a manuscript and print per-chunk statistics.
    ///
    /// Nothing is sent to any provider. Validation issues are advisory.
    Chunk {
        /// Manuscript file (UTF-8 plain text).
        file: PathBuf,

        /// Maximum unique characters per chunk.
        #[arg(long)]
        max_chunk_size: Option<usize>,

        /// Characters repeated from the previous chunk.
        #[arg(long)]
        overlap_size: Option<usize>,

        /// Do not turn sentence ends into paragraph breaks.
        #[arg(long)]
        no_preserve_paragraphs: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Process every chunk of a manuscript through the configured providers.
    ///
    /// Providers are tried in order main, backup1, backup2. Ctrl-C cancels
    /// the job; the partial results are still written.
    Process {
        /// Manuscript file (UTF-8 plain text).
        file: PathBuf,

        /// System message sent before every chunk.
        #[arg(long)]
        system_prompt: Option<String>,

        /// Instruction prepended to every chunk.
        #[arg(long)]
        user_prompt: Option<String>,

        /// Chunks processed at once (1 = strictly in order).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Where to write the chunk results (default: `<file>.results.json`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },
}

#[derive(Serialize)]
struct ChunkReport {
    index: usize,
    id: String,
    char_count: usize,
    word_count: usize,
    overlap: usize,
    hash: String,
    validation: ChunkValidation,
}

#[derive(Serialize)]
struct ProcessOutput<'a> {
    job: &'a ProcessingJob,
    chunks: &'a [ChunkState],
}

fn load(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG_PATH) && !path.exists() {
        return Ok(Config::default());
    }
    config::load_config(path)
}

fn manuscript_id(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manuscript".to_string())
}

fn run_chunk(
    cfg: &Config,
    file: &Path,
    max_chunk_size: Option<usize>,
    overlap_size: Option<usize>,
    no_preserve_paragraphs: bool,
    json: bool,
) -> Result<()> {
    let mut options = cfg.chunking.options();
    if let Some(max) = max_chunk_size {
        if max == 0 {
            bail!("--max-chunk-size must be > 0");
        }
        options.max_chunk_size = max;
    }
    if let Some(overlap) = overlap_size {
        options.overlap_size = overlap;
    }
    if no_preserve_paragraphs {
        options.preserve_paragraphs = false;
    }

    let text = ingest::read_manuscript(file)?;
    let chunker = TextChunker::new(options);
    let chunks = chunker.chunk(&text);
    let estimate = estimate_processing_time(chunks.len());

    let reports: Vec<ChunkReport> = chunks
        .iter()
        .map(|c| ChunkReport {
            index: c.index,
            id: c.id.clone(),
            char_count: c.char_count(),
            word_count: c.word_count(),
            overlap: c.overlap,
            hash: c.hash.clone(),
            validation: chunker.validate(c),
        })
        .collect();

    if json {
        let out = serde_json::json!({
            "manuscript": manuscript_id(file),
            "total_chunks": reports.len(),
            "estimate": estimate,
            "chunks": reports,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} chunks", reports.len());
    if !reports.is_empty() {
        println!();
        println!(
            "  {:<6} {:>8} {:>8} {:>8}   {}",
            "INDEX", "CHARS", "WORDS", "OVERLAP", "ISSUES"
        );
        println!("  {}", "-".repeat(56));
        for r in &reports {
            let issues = if r.validation.valid {
                "-".to_string()
            } else {
                r.validation.issues.join("; ")
            };
            println!(
                "  {:<6} {:>8} {:>8} {:>8}   {}",
                r.index, r.char_count, r.word_count, r.overlap, issues
            );
        }
    }
    println!();
    println!(
        "Estimated processing time: {}m {}s",
        estimate.minutes, estimate.seconds
    );
    Ok(())
}

async fn run_process(
    cfg: Config,
    file: &Path,
    output: Option<PathBuf>,
    progress: ProgressMode,
) -> Result<()> {
    let text = ingest::read_manuscript(file)?;
    let manuscript_id = manuscript_id(file);

    let providers = ProviderSet::from_config(&cfg.providers);
    if providers.is_empty() {
        bail!("No providers configured; add [providers.main] to the config");
    }

    let store = Arc::new(InMemoryChunkStore::new());
    let chunks =
        ingest::ingest_manuscript(store.as_ref(), &manuscript_id, &text, cfg.chunking.options())
            .await?;
    let estimate = estimate_processing_time(chunks.len());
    tracing::info!(
        manuscript_id = %manuscript_id,
        chunks = chunks.len(),
        providers = ?providers.slots(),
        "Estimated processing time: {}m {}s",
        estimate.minutes,
        estimate.seconds
    );

    let orchestrator = Arc::new(FallbackOrchestrator::new(
        providers,
        RetryPolicy::from(&cfg.retry),
    ));
    let tracker =
        JobTracker::new(orchestrator, store.clone()).with_progress(progress.reporter());
    let supervisor = JobSupervisor::new(Arc::new(tracker));

    let interrupt = supervisor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling job");
            interrupt.cancel();
        }
    });

    let options = JobOptions {
        system_prompt: cfg.processing.system_prompt.clone(),
        user_prompt: cfg.processing.user_prompt.clone(),
        concurrency: cfg.processing.concurrency,
    };
    let job = supervisor.submit(&manuscript_id, options).await?;
    let job = supervisor.wait(&job.id).await?;

    let snapshot = stats::job_snapshot(store.as_ref(), &job.id).await?;
    stats::print_snapshot(&snapshot);

    let states = store.chunk_states(&manuscript_id).await?;
    let output = output.unwrap_or_else(|| file.with_extension("results.json"));
    let body = serde_json::to_string_pretty(&ProcessOutput {
        job: &job,
        chunks: &states,
    })?;
    std::fs::write(&output, body)?;
    println!("Results written to {}", output.display());

    if job.status == JobStatus::Failed {
        bail!(
            "Job failed: {}",
            job.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = load(&cli.config)?;

    match cli.command {
        Commands::Chunk {
            file,
            max_chunk_size,
            overlap_size,
            no_preserve_paragraphs,
            json,
        } => {
            logging::init_tracing(&cfg.logging)?;
            run_chunk(
                &cfg,
                &file,
                max_chunk_size,
                overlap_size,
                no_preserve_paragraphs,
                json,
            )?;
        }
        Commands::Process {
            file,
            system_prompt,
            user_prompt,
            concurrency,
            output,
            progress,
        } => {
            if system_prompt.is_some() {
                cfg.processing.system_prompt = system_prompt;
            }
            if user_prompt.is_some() {
                cfg.processing.user_prompt = user_prompt;
            }
            if let Some(k) = concurrency {
                cfg.processing.concurrency = k;
            }
            config::validate(&cfg)?;
            logging::init_tracing(&cfg.logging)?;

            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            run_process(cfg, &file, output, progress).await?;
        }
    }

    Ok(())
}
