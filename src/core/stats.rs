//! Control statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of a control's counters since start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlStats {
    /// Fresh entities flipped to `PROCESSING` and queued.
    pub enqueued: u64,
    /// `TEMPORARY_ERROR` entities queued again.
    pub retried: u64,
    /// Orphaned `PROCESSING` entities queued again.
    pub resubmitted: u64,
    /// Ids moved to the pop end by a dedup push.
    pub cut: u64,
    /// Ids popped and loaded.
    pub dequeued: u64,
    /// Outcomes stored as `SUCCESSFUL`.
    pub succeeded: u64,
    /// Outcomes stored as `TEMPORARY_ERROR`.
    pub temporary_errors: u64,
    /// Outcomes stored as `FAILED`, including exhausted attempts.
    pub failed: u64,
    /// Outcome updates that affected no row.
    pub lost_races: u64,
    /// Popped ids dropped without processing (missing or terminal).
    pub discarded: u64,
    /// Drain tasks running at snapshot time.
    pub active_drains: u64,
}

/// Internal counters (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct ControlCounters {
    pub enqueued: AtomicU64,
    pub retried: AtomicU64,
    pub resubmitted: AtomicU64,
    pub cut: AtomicU64,
    pub dequeued: AtomicU64,
    pub succeeded: AtomicU64,
    pub temporary_errors: AtomicU64,
    pub failed: AtomicU64,
    pub lost_races: AtomicU64,
    pub discarded: AtomicU64,
}

impl ControlCounters {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, active_drains: usize) -> ControlStats {
        ControlStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            resubmitted: self.resubmitted.load(Ordering::Relaxed),
            cut: self.cut.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            temporary_errors: self.temporary_errors.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            lost_races: self.lost_races.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            active_drains: active_drains as u64,
        }
    }
}
