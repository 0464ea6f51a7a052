use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::error::{Error, Result};
use crate::fetch::fetcher::{Fetched, Fetcher};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::stage_concurrency;
use crate::pipeline::pipe::Pipe;
use crate::stats::HarvestStats;
use crate::types::{ArchiveHandle, ArchiveState, FetchFailure, FetchOutcome, StagedArchive};

const STAGE: &str = "fetch";

/// Downloads archives with at most `concurrency_stage("fetch", n)` transfers
/// in flight.
///
/// A download slot is held until the staged archive has been handed to the
/// next stage, so the number of archives on disk waiting to be processed is
/// bounded by the slot count plus the channel capacity. Failed archives are
/// logged and skipped.
pub struct FetchStage {
    fetcher: Fetcher,
    stats: HarvestStats,
}

impl FetchStage {
    pub fn new(fetcher: Fetcher, stats: HarvestStats) -> Self {
        Self { fetcher, stats }
    }
}

#[async_trait]
impl Pipe<ArchiveHandle, StagedArchive> for FetchStage {
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        mut input: Receiver<ArchiveHandle>,
        output: Sender<StagedArchive>,
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
                    if let Err(err) = reap(joined, &cancel) {
                        tasks.abort_all();
                        return Err(err);
                    }
                }
                msg = input.recv() => {
                    let Some(handle) = msg else { break; };
                    if cancel.is_draining() {
                        self.skip(&handle);
                        continue;
                    }

                    let permit = tokio::select! {
                        _ = cancel.draining() => {
                            self.skip(&handle);
                            continue;
                        }
                        permit = permits.clone().acquire_owned() => {
                            permit.map_err(|_| Error::pipeline("fetch permits closed"))?
                        }
                    };

                    tasks.spawn(fetch_one(
                        self.fetcher.clone(),
                        handle,
                        output.clone(),
                        self.stats.clone(),
                        cancel.clone(),
                        permit,
                    ));
                }
            }
        }

        if cancel.is_cancelled() {
            tasks.abort_all();
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = reap(Some(joined), &cancel) {
                tasks.abort_all();
                return Err(err);
            }
        }
        Ok(())
    }
}

impl FetchStage {
    fn skip(&self, _handle: &ArchiveHandle) {
        self.stats.add_skipped(1);
        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "pdfharvest.drain",
            stage = STAGE,
            index = _handle.index,
            "pdfharvest.drain"
        );
    }
}

async fn fetch_one(
    fetcher: Fetcher,
    handle: ArchiveHandle,
    output: Sender<StagedArchive>,
    stats: HarvestStats,
    cancel: CancelToken,
    _permit: OwnedSemaphorePermit,
) -> Result<()> {
    log_state(&handle, ArchiveState::Fetching);
    let result = fetcher.fetch(&handle, &cancel).await;
    if let Ok(Some(fetched)) = &result {
        stats.add_partials_discarded(u64::from(fetched.discarded_partials));
    }

    match into_outcome(&handle, result) {
        Some(FetchOutcome::Fetched(archive)) => {
            stats.add_fetched(1);
            tokio::select! {
                _ = cancel.cancelled() => {}
                sent = output.send(archive) => {
                    if sent.is_err() {
                        return Err(Error::pipeline("output channel closed"));
                    }
                }
            }
        }
        Some(FetchOutcome::Failed(failure)) => {
            stats.add_failed(1);
            log_state(&handle, ArchiveState::Failed);
            log_failure(&failure);
        }
        None => {
            stats.add_skipped(1);
        }
    }
    Ok(())
}

/// `None` when the fetch was cancelled before it finished.
fn into_outcome(handle: &ArchiveHandle, result: Result<Option<Fetched>>) -> Option<FetchOutcome> {
    match result {
        Ok(Some(fetched)) => {
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::DEBUG,
                event = "pdfharvest.archive.fetched",
                index = handle.index,
                attempts = fetched.attempts,
                discarded_partials = fetched.discarded_partials,
                "pdfharvest.archive.fetched"
            );
            Some(FetchOutcome::Fetched(fetched.archive))
        }
        Ok(None) => None,
        Err(err) => {
            let attempts = match &err {
                Error::RetryExhausted { attempts, .. } => *attempts,
                _ => 1,
            };
            Some(FetchOutcome::Failed(FetchFailure {
                index: handle.index,
                url: handle.remote_url.clone(),
                attempts,
                reason: err.to_string(),
            }))
        }
    }
}

fn reap(joined: Option<std::result::Result<Result<()>, JoinError>>, cancel: &CancelToken) -> Result<()> {
    match joined {
        None | Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(err))) => Err(err),
        Some(Err(err)) if err.is_cancelled() && cancel.is_cancelled() => Ok(()),
        Some(Err(err)) => Err(Error::Join(err)),
    }
}

fn log_state(_handle: &ArchiveHandle, _state: ArchiveState) {
    #[cfg(feature = "tracing")]
    tracing::event!(
        tracing::Level::DEBUG,
        event = "pdfharvest.archive.state",
        index = _handle.index,
        state = %_state,
        "pdfharvest.archive.state"
    );
}

fn log_failure(_failure: &FetchFailure) {
    #[cfg(feature = "tracing")]
    tracing::event!(
        tracing::Level::WARN,
        event = "pdfharvest.archive.failed",
        index = _failure.index,
        url = %_failure.url,
        attempts = _failure.attempts,
        error = %_failure.reason,
        "pdfharvest.archive.failed"
    );
}
