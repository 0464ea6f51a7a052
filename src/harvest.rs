//! Wiring the stages into one run.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::HarvestConfig;
use crate::error::{Error, Result};
use crate::extract::process::DocumentProcessor;
use crate::extract::stage::ProcessStage;
use crate::fetch::fetcher::Fetcher;
use crate::fetch::locator::ArchiveLocator;
use crate::fetch::stage::FetchStage;
use crate::pipeline::cancel::{CancelToken, StopLevel};
use crate::pipeline::chain::PipeExt;
use crate::pipeline::runtime::Runtime;
use crate::source::indices::IndexSource;
use crate::stats::HarvestStats;
use crate::store::actor::LedgerHandle;
use crate::store::ledger::Ledger;
use crate::store::sink::LedgerSink;
use crate::types::{ProcessedDocument, StagedArchive};

/// Summary of one harvest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    /// Documents in the ledger at the end of the run, including loaded ones.
    pub accepted: usize,
    /// Documents accepted during this run.
    pub newly_accepted: u64,
    pub target: usize,
    pub archives_scanned: u64,
    pub archives_failed: u64,
    pub archives_skipped: u64,
    pub documents_seen: u64,
    pub documents_out_of_range: u64,
    pub documents_unprocessable: u64,
    pub documents_known: u64,
    pub documents_duplicate: u64,
    pub documents_late: u64,
    pub partials_discarded: u64,
    /// How many documents short of the target the run ended.
    pub shortfall: usize,
    /// The run was hard-stopped rather than completed or drained.
    pub cancelled: bool,
    pub output: PathBuf,
}

impl HarvestReport {
    pub fn reached_target(&self) -> bool {
        self.shortfall == 0
    }
}

/// Runs the whole pipeline described by a [`HarvestConfig`].
///
/// ```no_run
/// # async fn demo() -> pdfharvest::error::Result<()> {
/// use pdfharvest::prelude::*;
///
/// let config = HarvestConfig::default();
/// let harvester = Harvester::new(config)?;
/// let report = harvester.run().await?;
/// println!("{} documents", report.accepted);
/// # Ok(()) }
/// ```
pub struct Harvester {
    config: HarvestConfig,
    locator: ArchiveLocator,
    fetcher: Fetcher,
    processor: DocumentProcessor,
    stats: HarvestStats,
    cancel: CancelToken,
}

impl Harvester {
    /// Validate `config` and build the fetcher and document processor it describes.
    pub fn new(config: HarvestConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = Fetcher::new(&config.fetch)?;
        let processor = DocumentProcessor::from_config(&config)?;
        Ok(Self::with_parts(config, fetcher, processor))
    }

    /// Use a prebuilt fetcher and processor instead of the configured ones.
    pub fn with_parts(config: HarvestConfig, fetcher: Fetcher, processor: DocumentProcessor) -> Self {
        let locator = ArchiveLocator::new(&config.source.base_url, &config.paths.staging_dir);
        Self {
            config,
            locator,
            fetcher,
            processor,
            stats: HarvestStats::new(),
            cancel: CancelToken::default(),
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Token that stops this harvester's run: [`CancelToken::drain`] for a
    /// graceful stop, [`CancelToken::cancel`] for a hard one.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> HarvestStats {
        self.stats.clone()
    }

    /// Load the ledger persisted at the configured output path.
    pub fn load_ledger(&self) -> Result<Ledger> {
        Ledger::load(&self.config.paths.output, self.config.limits.target_count)
    }

    /// Load the ledger and harvest until the target is reached, every archive
    /// has been tried, or the run is stopped.
    pub async fn run(&self) -> Result<HarvestReport> {
        let ledger = self.load_ledger()?;
        self.run_with(ledger).await
    }

    /// Harvest into an already loaded `ledger`.
    ///
    /// The ledger is flushed to the configured output path at the end,
    /// including after a pipeline error, in which case that error is
    /// returned once the flush has been attempted. A failed final flush is
    /// returned as [`Error::Flush`] holding the ledger.
    pub async fn run_with(&self, ledger: Ledger) -> Result<HarvestReport> {
        let staging_dir = self.config.paths.staging_dir.clone();
        std::fs::create_dir_all(&staging_dir).map_err(|source| Error::Staging {
            path: staging_dir.clone(),
            source,
        })?;

        if self.config.source.probe {
            self.fetcher.probe(self.locator.base_url()).await?;
        }

        let output = self.config.paths.output.clone();
        let initial = ledger.len();

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "pdfharvest.harvest.start",
            loaded = initial,
            target = ledger.target(),
            archives = self.config.source.total_archives,
            downloads = self.config.concurrency.downloads,
            processors = self.config.concurrency.processors,
            tokens = %self.processor.token_scheme(),
            "pdfharvest.harvest.start"
        );

        let (handle, actor) = LedgerHandle::spawn(ledger, self.config.concurrency.queue);

        let pipeline = if initial >= self.config.limits.target_count {
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::INFO,
                event = "pdfharvest.drain",
                stage = "harvest",
                accepted = initial,
                "pdfharvest.drain"
            );
            Ok(())
        } else {
            self.run_pipeline(handle.clone()).await
        };

        let flushed = handle.flush(output.clone()).await;
        let ledger = handle.shutdown().await?;
        actor.await?;

        pipeline?;
        if let Err(err) = flushed {
            return Err(err.with_ledger(ledger));
        }

        cleanup_staging(&staging_dir);

        let report = self.report(&ledger, output);
        #[cfg(feature = "tracing")]
        {
            if report.shortfall > 0 && !report.cancelled {
                tracing::event!(
                    tracing::Level::WARN,
                    event = "pdfharvest.shortfall",
                    accepted = report.accepted,
                    target = report.target,
                    shortfall = report.shortfall,
                    "pdfharvest.shortfall"
                );
            }
            tracing::event!(
                tracing::Level::INFO,
                event = "pdfharvest.harvest.done",
                accepted = report.accepted,
                newly_accepted = report.newly_accepted,
                archives_scanned = report.archives_scanned,
                archives_failed = report.archives_failed,
                cancelled = report.cancelled,
                "pdfharvest.harvest.done"
            );
        }
        Ok(report)
    }

    async fn run_pipeline(&self, ledger: LedgerHandle) -> Result<()> {
        let concurrency = &self.config.concurrency;

        let source = IndexSource::new(
            self.locator.clone(),
            0..self.config.source.total_archives,
            self.stats.clone(),
        );
        let fetch = FetchStage::new(self.fetcher.clone(), self.stats.clone());
        let mut process = ProcessStage::new(
            self.processor.clone(),
            self.config.source.entry_suffix.clone(),
            self.stats.clone(),
        );
        if self.config.ledger.skip_known {
            process = process.skip_known(ledger.clone());
        }
        let sink = LedgerSink::new(ledger, self.stats.clone())
            .checkpoint(&self.config.paths.output, self.config.ledger.checkpoint_every);

        let chain = source
            .pipe::<StagedArchive, _>(fetch)
            .pipe::<ProcessedDocument, _>(process)
            .pipe::<(), _>(sink);

        let runtime = Runtime::new()
            .buffer(concurrency.queue)
            .buffer_stage("fetch", concurrency.downloads)
            .concurrency_stage("fetch", concurrency.downloads)
            .concurrency_stage("process", concurrency.processors)
            .cancel_token(self.cancel.clone());

        let (tx, _cancel, join) = runtime.spawn_sink::<(), _>(chain);
        // The source only waits for this start signal.
        let _ = tx.send(()).await;
        drop(tx);

        join.await?
    }

    fn report(&self, ledger: &Ledger, output: PathBuf) -> HarvestReport {
        let snap = self.stats.snapshot();
        HarvestReport {
            accepted: ledger.len(),
            newly_accepted: snap.documents_accepted,
            target: ledger.target(),
            archives_scanned: snap.archives_processed,
            archives_failed: snap.archives_failed,
            archives_skipped: snap.archives_skipped,
            documents_seen: snap.documents_seen,
            documents_out_of_range: snap.documents_out_of_range,
            documents_unprocessable: snap.documents_unprocessable,
            documents_known: snap.documents_known,
            documents_duplicate: snap.documents_duplicate,
            documents_late: snap.documents_late,
            partials_discarded: snap.partials_discarded,
            shortfall: ledger.remaining(),
            cancelled: self.cancel.level() == StopLevel::Cancelled,
            output,
        }
    }
}

/// Remove the staging directory if nothing was left in it.
fn cleanup_staging(dir: &Path) {
    let leftover = match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => return,
    };
    if leftover == 0 {
        let _ = std::fs::remove_dir(dir);
        return;
    }
    #[cfg(feature = "tracing")]
    tracing::event!(
        tracing::Level::WARN,
        event = "pdfharvest.staging.not_empty",
        path = %dir.display(),
        entries = leftover,
        "pdfharvest.staging.not_empty"
    );
}
