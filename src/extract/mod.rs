//! Turning staged archives into measured documents.

pub mod archive;
pub mod process;
pub mod stage;

pub use archive::{ArchiveReader, Entries};
pub use process::{process_archive, ArchiveSummary, DocumentProcessor};
pub use stage::ProcessStage;
