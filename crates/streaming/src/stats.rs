use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how a layer array has been used.
#[derive(Debug, Default)]
pub struct LoadStats {
    loader_invocations: AtomicU64,
    coalesced: AtomicU64,
    ready_hits: AtomicU64,
    failures: AtomicU64,
    commits: AtomicU64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct LoadStatsSnapshot {
    pub loader_invocations: u64,
    /// Requests answered with an already in-flight load.
    pub coalesced: u64,
    /// Requests answered from a ready slot.
    pub ready_hits: u64,
    pub failures: u64,
    pub commits: u64,
}

impl LoadStats {
    pub(crate) fn record_invocation(&self) {
        self.loader_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ready_hit(&self) {
        self.ready_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoadStatsSnapshot {
        LoadStatsSnapshot {
            loader_invocations: self.loader_invocations.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            ready_hits: self.ready_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
        }
    }
}
