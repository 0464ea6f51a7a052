use std::ops::Range;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::fetch::locator::ArchiveLocator;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::stats::HarvestStats;
use crate::types::ArchiveHandle;

/// Emits one [`ArchiveHandle`] per archive index, in ascending order.
///
/// Starts on the first `()` received and stops early once the pipeline is
/// draining.
pub struct IndexSource {
    locator: ArchiveLocator,
    indices: Range<u32>,
    stats: HarvestStats,
}

impl IndexSource {
    pub fn new(locator: ArchiveLocator, indices: Range<u32>, stats: HarvestStats) -> Self {
        Self {
            locator,
            indices,
            stats,
        }
    }
}

#[async_trait]
impl Pipe<(), ArchiveHandle> for IndexSource {
    fn stage_name(&self) -> &'static str {
        "source"
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<ArchiveHandle>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.draining() => return Ok(()),
            _ = input.recv() => {}
        }

        for index in self.indices.clone() {
            if cancel.is_draining() {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::INFO,
                    event = "pdfharvest.drain",
                    stage = "source",
                    next_index = index,
                    "pdfharvest.drain"
                );
                break;
            }

            let handle = self.locator.locate(index);
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::TRACE,
                event = "pdfharvest.archive.state",
                index = index,
                state = %crate::types::ArchiveState::Pending,
                "pdfharvest.archive.state"
            );

            tokio::select! {
                _ = cancel.draining() => break,
                sent = output.send(handle) => {
                    if sent.is_err() {
                        return Err(Error::pipeline("output channel closed"));
                    }
                    self.stats.add_planned(1);
                }
            }
        }
        Ok(())
    }
}
