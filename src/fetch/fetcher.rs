use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::AsyncWriteExt;

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::retry::{RetryOutcome, RetryPolicy};
use crate::types::{ArchiveHandle, StagedArchive};

const STAGE: &str = "fetch";

/// A successfully downloaded archive.
#[derive(Debug)]
pub struct Fetched {
    pub archive: StagedArchive,
    pub attempts: u32,
    /// Partial files removed after failed attempts.
    pub discarded_partials: u32,
}

/// Streams archives from the remote store to the staging directory.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::http("client builder", e))?;
        Ok(Self::with_client(client, config.retry_policy()))
    }

    pub fn with_client(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Check that the store answers at all. Any HTTP status counts as reachable.
    pub async fn probe(&self, url: &str) -> Result<()> {
        match self.client.head(url).send().await {
            Ok(_response) => {
                #[cfg(feature = "tracing")]
                tracing::event!(tracing::Level::DEBUG, event = "pdfharvest.probe", url = url, status = _response.status().as_u16(), "pdfharvest.probe");
                Ok(())
            }
            Err(source) => Err(Error::Unreachable {
                url: url.to_string(),
                source,
            }),
        }
    }

    /// Download `handle` with retries.
    ///
    /// Returns `Ok(None)` if `cancel` fired before the download finished. No
    /// partial file is left behind on any error path.
    pub async fn fetch(&self, handle: &ArchiveHandle, cancel: &CancelToken) -> Result<Option<Fetched>> {
        let discarded = AtomicU32::new(0);

        let outcome = self
            .retry
            .run(STAGE, cancel, |_attempt| self.download_once(handle, &discarded))
            .await?;

        match outcome {
            RetryOutcome::Done(done) => Ok(Some(Fetched {
                archive: StagedArchive::new(handle.clone()),
                attempts: done.attempts,
                discarded_partials: discarded.load(Ordering::SeqCst),
            })),
            RetryOutcome::Cancelled => Ok(None),
        }
    }

    async fn download_once(&self, handle: &ArchiveHandle, discarded: &AtomicU32) -> Result<()> {
        let url = handle.remote_url.as_str();
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let path = handle.local_path.as_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut partial = PartialFile::new(path, discarded);
        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = response.chunk().await.map_err(|e| Error::http(url, e))? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        partial.keep();
        Ok(())
    }
}

/// Removes a file being written unless the write completed.
struct PartialFile<'a> {
    path: &'a Path,
    discarded: &'a AtomicU32,
    keep: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path, discarded: &'a AtomicU32) -> Self {
        Self {
            path,
            discarded,
            keep: false,
        }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if std::fs::remove_file(self.path).is_ok() {
            self.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }
}
