//! Live counters shared by every stage of a harvest.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    archives_planned: AtomicU64,
    archives_fetched: AtomicU64,
    archives_failed: AtomicU64,
    archives_skipped: AtomicU64,
    archives_processed: AtomicU64,
    partials_discarded: AtomicU64,
    documents_seen: AtomicU64,
    documents_out_of_range: AtomicU64,
    documents_unprocessable: AtomicU64,
    documents_known: AtomicU64,
    documents_accepted: AtomicU64,
    documents_duplicate: AtomicU64,
    documents_late: AtomicU64,
}

/// Cheap to clone; all clones update the same counters.
#[derive(Debug, Clone, Default)]
pub struct HarvestStats {
    inner: Arc<Counters>,
}

/// A point-in-time copy of [`HarvestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub archives_planned: u64,
    pub archives_fetched: u64,
    pub archives_failed: u64,
    /// Archives never fetched or never processed because the harvest was stopping.
    pub archives_skipped: u64,
    pub archives_processed: u64,
    pub partials_discarded: u64,
    pub documents_seen: u64,
    pub documents_out_of_range: u64,
    pub documents_unprocessable: u64,
    /// Entries skipped because the ledger already held them.
    pub documents_known: u64,
    pub documents_accepted: u64,
    pub documents_duplicate: u64,
    /// In-range documents rejected because the target had been reached.
    pub documents_late: u64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self, n: u64) {
                self.inner.$field.fetch_add(n, Ordering::Relaxed);
            }
        )*
    };
}

impl HarvestStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        add_planned => archives_planned,
        add_fetched => archives_fetched,
        add_failed => archives_failed,
        add_skipped => archives_skipped,
        add_processed => archives_processed,
        add_partials_discarded => partials_discarded,
        add_seen => documents_seen,
        add_out_of_range => documents_out_of_range,
        add_unprocessable => documents_unprocessable,
        add_known => documents_known,
        add_accepted => documents_accepted,
        add_duplicate => documents_duplicate,
        add_late => documents_late,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.inner;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        StatsSnapshot {
            archives_planned: load(&c.archives_planned),
            archives_fetched: load(&c.archives_fetched),
            archives_failed: load(&c.archives_failed),
            archives_skipped: load(&c.archives_skipped),
            archives_processed: load(&c.archives_processed),
            partials_discarded: load(&c.partials_discarded),
            documents_seen: load(&c.documents_seen),
            documents_out_of_range: load(&c.documents_out_of_range),
            documents_unprocessable: load(&c.documents_unprocessable),
            documents_known: load(&c.documents_known),
            documents_accepted: load(&c.documents_accepted),
            documents_duplicate: load(&c.documents_duplicate),
            documents_late: load(&c.documents_late),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let stats = HarvestStats::new();
        let other = stats.clone();
        other.add_accepted(2);
        stats.add_seen(5);
        let snap = stats.snapshot();
        assert_eq!(snap.documents_accepted, 2);
        assert_eq!(snap.documents_seen, 5);
        assert_eq!(snap.archives_failed, 0);
    }
}
