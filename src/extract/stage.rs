use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::error::{Error, Result};
use crate::extract::process::{process_archive, ArchiveSummary, DocumentProcessor};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::stage_concurrency;
use crate::pipeline::pipe::Pipe;
use crate::stats::HarvestStats;
use crate::text::decode::panic_message;
use crate::store::actor::LedgerHandle;
use crate::types::{ProcessedDocument, StagedArchive};

const STAGE: &str = "process";

/// Extracts and measures the documents of staged archives, one blocking
/// thread per archive, at most `concurrency_stage("process", n)` at a time.
///
/// Each staged archive is dropped (and its file deleted) as soon as its
/// processing ends, whether it completed, failed or was cut short.
pub struct ProcessStage {
    processor: DocumentProcessor,
    suffix: Arc<str>,
    known: Option<LedgerHandle>,
    stats: HarvestStats,
}

impl ProcessStage {
    pub fn new(processor: DocumentProcessor, suffix: impl Into<String>, stats: HarvestStats) -> Self {
        Self {
            processor,
            suffix: Arc::from(suffix.into()),
            known: None,
            stats,
        }
    }

    /// Skip entries whose identifier `ledger` already holds without decoding them.
    pub fn skip_known(mut self, ledger: LedgerHandle) -> Self {
        self.known = Some(ledger);
        self
    }

    /// A panicked archive task counts as a failed archive; the stage keeps going.
    fn reap(&self, joined: Option<std::result::Result<Result<()>, JoinError>>) -> Result<()> {
        match joined {
            None | Some(Ok(Ok(()))) => Ok(()),
            Some(Ok(Err(err))) => Err(err),
            Some(Err(err)) if err.is_panic() => {
                self.stats.add_failed(1);
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::WARN,
                    event = "pdfharvest.archive.failed",
                    state = %crate::types::ArchiveState::Failed,
                    error = %err,
                    "pdfharvest.archive.failed"
                );
                Ok(())
            }
            Some(Err(err)) => Err(Error::Join(err)),
        }
    }

    fn skip(&self, _archive: &StagedArchive) {
        self.stats.add_skipped(1);
        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "pdfharvest.drain",
            stage = STAGE,
            index = _archive.index(),
            "pdfharvest.drain"
        );
    }
}

#[async_trait]
impl Pipe<StagedArchive, ProcessedDocument> for ProcessStage {
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        mut input: Receiver<StagedArchive>,
        output: Sender<ProcessedDocument>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let permits = Arc::new(Semaphore::new(stage_concurrency(STAGE)));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                joined = tasks.join_next(), if !tasks.is_empty() => {
                    self.reap(joined)?;
                }
                msg = input.recv() => {
                    let Some(archive) = msg else { break; };
                    if cancel.is_draining() {
                        self.skip(&archive);
                        continue;
                    }

                    let permit = tokio::select! {
                        _ = cancel.draining() => {
                            self.skip(&archive);
                            continue;
                        }
                        permit = permits.clone().acquire_owned() => {
                            permit.map_err(|_| Error::pipeline("process permits closed"))?
                        }
                    };

                    let processor = self.processor.clone();
                    let suffix = self.suffix.clone();
                    let known = self.known.clone();
                    let stats = self.stats.clone();
                    let output = output.clone();
                    let cancel = cancel.clone();
                    tasks.spawn_blocking(move || {
                        let _permit = permit;
                        run_archive(archive, &suffix, &processor, known.as_ref(), &output, &stats, &cancel);
                        Ok(())
                    });
                }
            }
        }

        // Blocking tasks cannot be aborted; they observe the token between documents.
        while let Some(joined) = tasks.join_next().await {
            self.reap(Some(joined))?;
        }
        Ok(())
    }
}

fn run_archive(
    archive: StagedArchive,
    suffix: &str,
    processor: &DocumentProcessor,
    known: Option<&LedgerHandle>,
    output: &Sender<ProcessedDocument>,
    stats: &HarvestStats,
    cancel: &CancelToken,
) {
    let is_known = |identifier: &str| match known {
        Some(ledger) => ledger.blocking_contains(identifier).unwrap_or(false),
        None => false,
    };
    let emit = |doc: ProcessedDocument| output.blocking_send(doc).is_ok();

    let processed = catch_unwind(AssertUnwindSafe(|| {
        process_archive(&archive, suffix, processor, cancel, is_known, emit)
    }))
    .unwrap_or_else(|panic| {
        Err(Error::stage(
            STAGE,
            format!("archive processing panicked: {}", panic_message(panic.as_ref())),
        ))
    });

    match processed {
        Ok(summary) => record(stats, &summary, output.is_closed()),
        Err(_err) => {
            stats.add_failed(1);
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::WARN,
                event = "pdfharvest.archive.failed",
                index = archive.index(),
                state = %crate::types::ArchiveState::Failed,
                path = %archive.path().display(),
                error = %_err,
                "pdfharvest.archive.failed"
            );
        }
    }
}

fn record(stats: &HarvestStats, summary: &ArchiveSummary, _downstream_closed: bool) {
    stats.add_processed(1);
    stats.add_seen(summary.seen as u64);
    stats.add_out_of_range(summary.out_of_range as u64);
    stats.add_unprocessable(summary.unprocessable as u64);
    stats.add_known(summary.known as u64);

    #[cfg(feature = "tracing")]
    {
        tracing::event!(
            tracing::Level::INFO,
            event = "pdfharvest.archive.done",
            index = summary.index,
            seen = summary.seen,
            kept = summary.kept,
            out_of_range = summary.out_of_range,
            unprocessable = summary.unprocessable,
            known = summary.known,
            stopped_early = summary.stopped_early,
            "pdfharvest.archive.done"
        );
        if _downstream_closed {
            tracing::event!(
                tracing::Level::DEBUG,
                event = "pdfharvest.downstream.closed",
                stage = STAGE,
                index = summary.index,
                "pdfharvest.downstream.closed"
            );
        }
    }
}
