use std::path::PathBuf;

use thiserror::Error;

use crate::store::ledger::Ledger;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pipeline error: {context}")]
    Pipeline { context: &'static str },

    #[error("stage `{stage}` failed: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },

    #[error("stage `{stage}` exhausted retries after {attempts} attempts: {source}")]
    RetryExhausted {
        stage: &'static str,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("remote store {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("corrupt archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("could not decode document: {0}")]
    Decode(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("ledger file {} is not a valid document array: {source}", path.display())]
    LedgerFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write ledger to {}: {source}", path.display())]
    LedgerWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The in-memory ledger survives a failed final flush so the caller can retry.
    #[error("failed to persist ledger to {}: {source}", path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        ledger: Box<Ledger>,
    },

    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Config(Vec<String>),

    #[error("could not prepare staging directory {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger actor is no longer running")]
    LedgerClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn pipeline(context: &'static str) -> Self {
        Self::Pipeline { context }
    }

    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }

    pub fn retry_exhausted(stage: &'static str, attempts: u32, source: Error) -> Self {
        Self::RetryExhausted {
            stage,
            attempts,
            source: Box::new(source),
        }
    }

    pub fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }

    /// Attach the ledger that failed to persist, turning a write failure
    /// into [`Error::Flush`]. Other errors are returned unchanged.
    pub fn with_ledger(self, ledger: Ledger) -> Self {
        match self {
            Self::LedgerWrite { path, source } => Self::Flush {
                path,
                source,
                ledger: Box::new(ledger),
            },
            other => other,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Io(_) => true,
            Self::RetryExhausted { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
