//! Getting archives from the remote store onto local disk.

pub mod fetcher;
pub mod locator;
pub mod stage;

pub use fetcher::{Fetched, Fetcher};
pub use locator::{ArchiveLocator, ARCHIVES_PER_BUCKET};
pub use stage::FetchStage;
