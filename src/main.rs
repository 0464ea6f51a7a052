//! pdfharvest: collect a token-filtered, deduplicated PDF text corpus.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pdfharvest::config::{HarvestConfig, LogFormat, LoggingConfig, TokenizerConfig};
use pdfharvest::error::Error;
use pdfharvest::harvest::{HarvestReport, Harvester};
use pdfharvest::pipeline::cancel::CancelToken;
use pdfharvest::stats::HarvestStats;
use pdfharvest::store::ledger::{merge_files, Ledger};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "pdfharvest.toml";
const FLUSH_RETRIES: u32 = 3;

#[derive(Parser)]
#[command(name = "pdfharvest")]
#[command(about = "Harvest a token-filtered, deduplicated PDF text corpus from remote ZIP archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and process archives until the target count is reached
    Run(RunArgs),

    /// Merge two ledger files; entries from the primary file win
    Merge {
        primary: PathBuf,
        secondary: PathBuf,
        output: PathBuf,
    },

    /// Write the default configuration to a file
    Init {
        #[arg(default_value = DEFAULT_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file (defaults to ./pdfharvest.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of documents to collect
    #[arg(short, long)]
    target: Option<usize>,

    #[arg(long)]
    min_tokens: Option<usize>,

    #[arg(long)]
    max_tokens: Option<usize>,

    /// Concurrent downloads
    #[arg(long)]
    downloads: Option<usize>,

    /// Concurrent archive processors
    #[arg(long)]
    processors: Option<usize>,

    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Ledger file
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    total_archives: Option<u32>,

    /// Count tokens with this tokenizer.json instead of tiktoken cl100k_base
    #[arg(long)]
    tokenizer: Option<PathBuf>,

    /// No progress bars
    #[arg(short, long)]
    quiet: bool,
}

impl RunArgs {
    fn load_config(&self) -> Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::load(path)?,
            None if Path::new(DEFAULT_CONFIG).exists() => HarvestConfig::load(Path::new(DEFAULT_CONFIG))?,
            None => HarvestConfig::default(),
        };

        if let Some(target) = self.target {
            config.limits.target_count = target;
        }
        if let Some(min) = self.min_tokens {
            config.limits.min_tokens = min;
        }
        if let Some(max) = self.max_tokens {
            config.limits.max_tokens = max;
        }
        if let Some(downloads) = self.downloads {
            config.concurrency.downloads = downloads;
        }
        if let Some(processors) = self.processors {
            config.concurrency.processors = processors;
        }
        if let Some(dir) = &self.staging_dir {
            config.paths.staging_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.paths.output = output.clone();
        }
        if let Some(url) = &self.base_url {
            config.source.base_url = url.clone();
        }
        if let Some(total) = self.total_archives {
            config.source.total_archives = total;
        }
        if let Some(path) = &self.tokenizer {
            config.text.tokenizer = TokenizerConfig::HuggingFace { path: path.clone() };
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = args.load_config()?;
            init_logging(&config.logging)?;
            run(config, args.quiet).await
        }
        Commands::Merge {
            primary,
            secondary,
            output,
        } => {
            init_logging(&LoggingConfig::default())?;
            let count = merge_files(&primary, &secondary, &output).with_context(|| {
                format!(
                    "failed to merge {} and {}",
                    primary.display(),
                    secondary.display()
                )
            })?;
            info!(documents = count, output = %output.display(), "merged ledgers");
            println!("Wrote {count} documents to {}", output.display());
            Ok(())
        }
        Commands::Init { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let content = HarvestConfig::default().to_toml()?;
            std::fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match logging.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

async fn run(config: HarvestConfig, quiet: bool) -> Result<()> {
    let total_archives = u64::from(config.source.total_archives);
    let target = config.limits.target_count;
    let output = config.paths.output.clone();

    let harvester = Harvester::new(config)?;
    let ledger = harvester
        .load_ledger()
        .with_context(|| format!("failed to load ledger {}", output.display()))?;
    let loaded = ledger.len() as u64;
    info!(loaded = loaded, target = target, output = %output.display(), "starting harvest");

    watch_interrupts(harvester.cancel_token());
    let progress = (!quiet).then(|| Progress::start(harvester.stats(), loaded, target as u64, total_archives));

    let result = harvester.run_with(ledger).await;

    if let Some(progress) = progress {
        progress.finish();
    }

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(Error::Flush {
            path,
            source,
            ledger,
        }) => {
            error!(path = %path.display(), error = %source, "final ledger flush failed, retrying");
            retry_flush(&ledger, &path).await
        }
        Err(err) => Err(err.into()),
    }
}

/// First Ctrl-C drains the pipeline, the second stops it outright.
fn watch_interrupts(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received: finishing in-flight archives (press Ctrl-C again to stop now)");
        cancel.drain();

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("second interrupt: stopping");
        cancel.cancel();
    });
}

async fn retry_flush(ledger: &Ledger, path: &Path) -> Result<()> {
    let mut last = None;
    for attempt in 1..=FLUSH_RETRIES {
        tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
        match ledger.flush(path) {
            Ok(()) => {
                info!(attempt = attempt, documents = ledger.len(), "ledger flushed on retry");
                return Ok(());
            }
            Err(err) => {
                warn!(attempt = attempt, error = %err, "ledger flush retry failed");
                last = Some(err);
            }
        }
    }
    match last {
        Some(err) => Err(anyhow::Error::new(err).context(format!(
            "could not persist {} documents to {}",
            ledger.len(),
            path.display()
        ))),
        None => Ok(()),
    }
}

fn print_report(report: &HarvestReport) {
    println!(
        "Collected {} of {} documents ({} new) into {}",
        report.accepted,
        report.target,
        report.newly_accepted,
        report.output.display()
    );
    println!(
        "Archives: {} processed, {} failed, {} skipped",
        report.archives_scanned, report.archives_failed, report.archives_skipped
    );
    println!(
        "Documents: {} seen, {} out of token range, {} unprocessable, {} already known, {} duplicate",
        report.documents_seen,
        report.documents_out_of_range,
        report.documents_unprocessable,
        report.documents_known,
        report.documents_duplicate
    );
    if !report.reached_target() {
        println!("Short of target by {} documents", report.shortfall);
    }
}

struct Progress {
    documents: ProgressBar,
    archives: ProgressBar,
    ticker: tokio::task::JoinHandle<()>,
}

impl Progress {
    fn start(stats: HarvestStats, loaded: u64, target: u64, total_archives: u64) -> Self {
        let bars = MultiProgress::new();
        let documents = bars.add(ProgressBar::new(target));
        documents.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        let archives = bars.add(ProgressBar::new(total_archives));
        archives.set_style(
            ProgressStyle::default_bar()
                .template("  [{bar:40.yellow/blue}] {pos}/{len} archives {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let (docs, arcs) = (documents.clone(), archives.clone());
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(250));
            loop {
                interval.tick().await;
                let snap = stats.snapshot();
                docs.set_position((loaded + snap.documents_accepted).min(target));
                docs.set_message(format!(
                    "({} seen, {} out of range)",
                    snap.documents_seen, snap.documents_out_of_range
                ));
                arcs.set_position(snap.archives_processed + snap.archives_failed + snap.archives_skipped);
                arcs.set_message(format!("({} failed)", snap.archives_failed));
            }
        });

        Self {
            documents,
            archives,
            ticker,
        }
    }

    fn finish(self) {
        self.ticker.abort();
        self.documents.finish();
        self.archives.finish();
    }
}
