//! The acceptance ledger: which documents have been collected.

pub mod actor;
pub mod ledger;
pub mod sink;

pub use actor::LedgerHandle;
pub use ledger::{merge_documents, merge_files, Acceptance, Ledger};
pub use sink::LedgerSink;
