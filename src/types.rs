//! Values that flow between pipeline stages.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One remote archive resolved to its download URL and staging location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveHandle {
    pub index: u32,
    pub remote_url: String,
    pub local_path: PathBuf,
}

/// An archive that exists on local disk.
///
/// The staged file is owned by this value and removed when it is dropped,
/// whichever way the processing of the archive ends.
#[derive(Debug)]
pub struct StagedArchive {
    handle: ArchiveHandle,
}

impl StagedArchive {
    pub(crate) fn new(handle: ArchiveHandle) -> Self {
        Self { handle }
    }

    pub fn index(&self) -> u32 {
        self.handle.index
    }

    pub fn path(&self) -> &Path {
        &self.handle.local_path
    }

    pub fn handle(&self) -> &ArchiveHandle {
        &self.handle
    }
}

impl Drop for StagedArchive {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.handle.local_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::WARN,
                    event = "pdfharvest.staging.remove_failed",
                    index = self.handle.index,
                    path = %self.handle.local_path.display(),
                    error = %_err,
                    "pdfharvest.staging.remove_failed"
                );
            }
        }
    }
}

/// A document entry read out of an archive, before decoding.
#[derive(Debug, Clone)]
pub struct DocumentCandidate {
    pub identifier: String,
    pub raw_bytes: Bytes,
}

/// A decoded document whose token count fell inside the accepted window.
///
/// Field names are the on-disk ledger schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub filename: String,
    pub text: String,
    pub token_count: usize,
    pub language: String,
}

impl ProcessedDocument {
    pub fn identifier(&self) -> &str {
        &self.filename
    }
}

/// Where an archive is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Pending,
    Fetching,
    Extracting,
    Processing,
    Done,
    Failed,
}

impl ArchiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of trying to bring one archive onto local disk.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(StagedArchive),
    Failed(FetchFailure),
}

#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub index: u32,
    pub url: String,
    pub attempts: u32,
    pub reason: String,
}

/// Result of decoding and measuring a single archive entry.
#[derive(Debug)]
pub enum DocumentOutcome {
    Kept(ProcessedDocument),
    OutOfRange {
        identifier: String,
        token_count: usize,
    },
    Unprocessable {
        identifier: String,
        reason: String,
    },
    /// Already recorded in the ledger; not decoded again.
    Known { identifier: String },
}
