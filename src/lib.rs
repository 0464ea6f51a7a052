//! # pdfharvest
//!
//! **Concurrent PDF corpus harvesting in Rust.**
//!
//! `pdfharvest` downloads numbered ZIP archives from a public object store,
//! extracts the PDF entries, decodes them to text, keeps documents whose token
//! count falls inside a configured window, tags each with a best-effort
//! language code and records it in a deduplicated JSON ledger, until a target
//! number of documents has been collected.
//!
//! It is designed for production constraints:
//!
//! - thousands of multi-hundred-megabyte archives
//! - bounded disk usage for staged archives
//! - downloads and CPU-bound extraction sized independently
//! - resumable runs against an existing ledger
//! - graceful shutdown
//!
//! ---
//!
//! ## Core Model
//!
//! A harvest is a chain of stages:
//!
//! ```text
//! IndexSource → FetchStage → ProcessStage → LedgerSink
//! ```
//!
//! Each stage implements the [`Pipe`] trait and communicates through bounded
//! Tokio channels. The fetch stage runs async downloads behind a semaphore; the
//! process stage runs one blocking task per archive behind another. The ledger
//! is owned by a single actor task, so concurrent stages can never record the
//! same document twice or overshoot the target.
//!
//! ---
//!
//! ## Example
//!
//! ```no_run
//! use pdfharvest::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> pdfharvest::error::Result<()> {
//!     let mut config = HarvestConfig::default();
//!     config.limits.target_count = 1_000;
//!     config.paths.output = "data/sample.json".into();
//!
//!     let harvester = Harvester::new(config)?;
//!     let report = harvester.run().await?;
//!
//!     println!("{} of {} documents", report.accepted, report.target);
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Stopping
//!
//! Every stage watches one [`CancelToken`]:
//!
//! - `drain()`: stop scheduling archives, let in-flight downloads finish, stop
//!   processing between documents. The sink calls this when the ledger reaches
//!   its target.
//! - `cancel()`: stop everything as soon as possible.
//!
//! Either way the ledger is flushed once more before [`Harvester::run`]
//! returns, and every staged archive file is removed when its processing
//! ends.
//!
//! ---
//!
//! ## Ledger
//!
//! The ledger file is a JSON array of `{filename, text, token_count, language}`
//! objects sorted by `filename`, replaced atomically on every flush. A missing
//! file starts an empty ledger; a file that is not such an array is an error.
//!
//! ---
//!
//! ## Observability
//!
//! With the `tracing` feature (default) the library emits structured events
//! such as `pdfharvest.stage`, `pdfharvest.retry.attempt_failed`,
//! `pdfharvest.archive.state`, `pdfharvest.archive.failed`,
//! `pdfharvest.document.skipped`, `pdfharvest.ledger.flush`,
//! `pdfharvest.drain` and `pdfharvest.cancelled`. Live counters are available
//! through [`HarvestStats`].
//!
//! ---
//!
//! ## Feature Flags
//!
//! - `tracing` *(default)*: tracing spans and events.
//! - `cli` *(default)*: the `pdfharvest` binary.
//!
//! [`Pipe`]: pipeline::pipe::Pipe
//! [`CancelToken`]: pipeline::cancel::CancelToken
//! [`Harvester::run`]: harvest::Harvester::run
//! [`HarvestStats`]: stats::HarvestStats

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod store;
pub mod text;
pub mod types;

pub mod prelude {
    //! Convenient imports for most `pdfharvest` users.

    pub use crate::config::HarvestConfig;
    pub use crate::harvest::{HarvestReport, Harvester};
    pub use crate::pipeline::cancel::CancelToken;
    pub use crate::pipeline::chain::PipeExt;
    pub use crate::pipeline::retry::RetryPolicy;
    pub use crate::pipeline::runtime::Runtime;
    pub use crate::stats::{HarvestStats, StatsSnapshot};
    pub use crate::store::{Acceptance, Ledger, LedgerHandle};
    pub use crate::types::ProcessedDocument;
}
