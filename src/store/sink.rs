use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::stats::HarvestStats;
use crate::store::actor::LedgerHandle;
use crate::store::ledger::Acceptance;
use crate::types::ProcessedDocument;

/// Offers every processed document to the ledger.
///
/// Once the ledger reaches its target the sink puts the pipeline into drain
/// mode; it keeps consuming its input afterwards so upstream stages never
/// block on a full channel, and late documents are rejected by the ledger.
pub struct LedgerSink {
    ledger: LedgerHandle,
    stats: HarvestStats,
    checkpoint: Option<(PathBuf, usize)>,
}

impl LedgerSink {
    pub fn new(ledger: LedgerHandle, stats: HarvestStats) -> Self {
        Self {
            ledger,
            stats,
            checkpoint: None,
        }
    }

    /// Flush the ledger to `path` after every `every` accepted documents.
    /// Zero disables checkpoints.
    pub fn checkpoint(mut self, path: impl Into<PathBuf>, every: usize) -> Self {
        self.checkpoint = (every > 0).then(|| (path.into(), every));
        self
    }

    async fn maybe_checkpoint(&self, since_last: &mut usize) {
        let Some((path, every)) = &self.checkpoint else { return; };
        if *since_last < *every {
            return;
        }
        *since_last = 0;
        // A failed checkpoint is not fatal; the final flush reports for real.
        if let Err(_err) = self.ledger.flush(path.clone()).await {
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::WARN,
                event = "pdfharvest.ledger.checkpoint_failed",
                path = %path.display(),
                error = %_err,
                "pdfharvest.ledger.checkpoint_failed"
            );
        }
    }
}

#[async_trait]
impl Pipe<ProcessedDocument, ()> for LedgerSink {
    fn stage_name(&self) -> &'static str {
        "ledger"
    }

    async fn process(
        &self,
        mut input: Receiver<ProcessedDocument>,
        _output: Sender<()>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mut since_checkpoint = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(doc) = msg else { break; };
                    let _identifier = doc.filename.clone();

                    match self.ledger.offer(doc).await? {
                        Acceptance::Accepted => {
                            self.stats.add_accepted(1);
                            since_checkpoint += 1;
                            self.maybe_checkpoint(&mut since_checkpoint).await;

                            let accepted = self.ledger.len().await?;
                            if accepted >= self.ledger.target() && cancel.drain() {
                                #[cfg(feature = "tracing")]
                                tracing::event!(
                                    tracing::Level::INFO,
                                    event = "pdfharvest.drain",
                                    stage = "ledger",
                                    accepted = accepted,
                                    target = self.ledger.target(),
                                    "pdfharvest.drain"
                                );
                            }
                        }
                        Acceptance::Duplicate => {
                            self.stats.add_duplicate(1);
                            #[cfg(feature = "tracing")]
                            tracing::event!(
                                tracing::Level::DEBUG,
                                event = "pdfharvest.document.skipped",
                                identifier = %_identifier,
                                reason = "duplicate",
                                "pdfharvest.document.skipped"
                            );
                        }
                        Acceptance::Saturated => {
                            self.stats.add_late(1);
                            #[cfg(feature = "tracing")]
                            tracing::event!(
                                tracing::Level::DEBUG,
                                event = "pdfharvest.document.skipped",
                                identifier = %_identifier,
                                reason = "saturated",
                                "pdfharvest.document.skipped"
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
