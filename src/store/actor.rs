use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::store::ledger::{Acceptance, Ledger};
use crate::types::ProcessedDocument;

/// Cloneable handle to the task that owns the [`Ledger`].
///
/// Every mutation goes through a single task, so concurrent `offer` calls are
/// serialized and the target count can never be overshot.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerCmd>,
    target: usize,
}

enum LedgerCmd {
    Offer {
        doc: ProcessedDocument,
        resp: oneshot::Sender<Acceptance>,
    },
    Contains {
        identifier: String,
        resp: oneshot::Sender<bool>,
    },
    Len {
        resp: oneshot::Sender<usize>,
    },
    Flush {
        path: PathBuf,
        resp: oneshot::Sender<Result<usize>>,
    },
    Shutdown {
        resp: oneshot::Sender<Ledger>,
    },
}

impl LedgerHandle {
    /// Move `ledger` into a new actor task.
    ///
    /// The returned join handle resolves once the actor has stopped, either
    /// after [`LedgerHandle::shutdown`] or when every handle is dropped.
    pub fn spawn(ledger: Ledger, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let target = ledger.target();
        let join = tokio::spawn(run_actor(rx, ledger));
        (Self { tx, target }, join)
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub async fn offer(&self, doc: ProcessedDocument) -> Result<Acceptance> {
        let (resp, rx) = oneshot::channel();
        self.request(LedgerCmd::Offer { doc, resp }, rx).await
    }

    pub async fn accept(&self, doc: ProcessedDocument) -> Result<bool> {
        Ok(self.offer(doc).await?.is_accepted())
    }

    pub async fn contains(&self, identifier: impl Into<String>) -> Result<bool> {
        let (resp, rx) = oneshot::channel();
        let identifier = identifier.into();
        self.request(LedgerCmd::Contains { identifier, resp }, rx).await
    }

    /// Like [`LedgerHandle::contains`], for callers on a blocking thread.
    pub fn blocking_contains(&self, identifier: &str) -> Result<bool> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .blocking_send(LedgerCmd::Contains {
                identifier: identifier.to_owned(),
                resp,
            })
            .map_err(|_| Error::LedgerClosed)?;
        rx.blocking_recv().map_err(|_| Error::LedgerClosed)
    }

    pub async fn len(&self) -> Result<usize> {
        let (resp, rx) = oneshot::channel();
        self.request(LedgerCmd::Len { resp }, rx).await
    }

    /// Persist the current ledger to `path`; returns how many documents were written.
    pub async fn flush(&self, path: impl Into<PathBuf>) -> Result<usize> {
        let (resp, rx) = oneshot::channel();
        let path = path.into();
        self.request(LedgerCmd::Flush { path, resp }, rx).await?
    }

    /// Stop the actor and take back the ledger it owned.
    pub async fn shutdown(self) -> Result<Ledger> {
        let (resp, rx) = oneshot::channel();
        self.request(LedgerCmd::Shutdown { resp }, rx).await
    }

    async fn request<T>(&self, cmd: LedgerCmd, rx: oneshot::Receiver<T>) -> Result<T> {
        self.tx.send(cmd).await.map_err(|_| Error::LedgerClosed)?;
        rx.await.map_err(|_| Error::LedgerClosed)
    }
}

async fn run_actor(mut rx: mpsc::Receiver<LedgerCmd>, mut ledger: Ledger) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            LedgerCmd::Offer { doc, resp } => {
                let _ = resp.send(ledger.offer(doc));
            }
            LedgerCmd::Contains { identifier, resp } => {
                let _ = resp.send(ledger.contains(&identifier));
            }
            LedgerCmd::Len { resp } => {
                let _ = resp.send(ledger.len());
            }
            LedgerCmd::Flush { path, resp } => {
                let (back, result) = flush_blocking(ledger, path).await;
                ledger = back;
                let _ = resp.send(result);
            }
            LedgerCmd::Shutdown { resp } => {
                let _ = resp.send(ledger);
                return;
            }
        }
    }
}

/// Write the ledger on the blocking pool and hand it back afterwards.
async fn flush_blocking(ledger: Ledger, path: PathBuf) -> (Ledger, Result<usize>) {
    let target = ledger.target();
    let joined = tokio::task::spawn_blocking(move || {
        let result = ledger.flush(&path).map(|()| ledger.len());
        log_flush(&path, &result);
        (ledger, result)
    })
    .await;

    match joined {
        Ok(pair) => pair,
        // The closure only panics if serialization itself panics; the ledger
        // moved into it is gone, so continue with an empty one.
        Err(err) => (Ledger::new(target), Err(Error::Join(err))),
    }
}

#[cfg(feature = "tracing")]
fn log_flush(path: &std::path::Path, result: &Result<usize>) {
    match result {
        Ok(count) => tracing::event!(
            tracing::Level::INFO,
            event = "pdfharvest.ledger.flush",
            path = %path.display(),
            documents = *count,
            "pdfharvest.ledger.flush"
        ),
        Err(err) => tracing::event!(
            tracing::Level::ERROR,
            event = "pdfharvest.ledger.flush",
            path = %path.display(),
            error = %err,
            "pdfharvest.ledger.flush"
        ),
    }
}

#[cfg(not(feature = "tracing"))]
fn log_flush(_path: &std::path::Path, _result: &Result<usize>) {}
