use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct BackendMetrics {
    submissions_accepted: AtomicU64,
    submissions_rejected: AtomicU64,
    submissions_unavailable: AtomicU64,
    feed_delivered: AtomicU64,
    feed_dropped_full: AtomicU64,
    feed_pruned_closed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackendMetricsSnapshot {
    pub submissions_accepted: u64,
    pub submissions_rejected: u64,
    pub submissions_unavailable: u64,
    pub feed_delivered: u64,
    pub feed_dropped_full: u64,
    pub feed_pruned_closed: u64,
}

impl BackendMetrics {
    pub fn snapshot(&self) -> BackendMetricsSnapshot {
        BackendMetricsSnapshot {
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            submissions_rejected: self.submissions_rejected.load(Ordering::Relaxed),
            submissions_unavailable: self.submissions_unavailable.load(Ordering::Relaxed),
            feed_delivered: self.feed_delivered.load(Ordering::Relaxed),
            feed_dropped_full: self.feed_dropped_full.load(Ordering::Relaxed),
            feed_pruned_closed: self.feed_pruned_closed.load(Ordering::Relaxed),
        }
    }

    pub fn inc_submission_accepted(&self) {
        self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_submission_rejected(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_submission_unavailable(&self) {
        self.submissions_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_feed_delivered(&self, delivered: u64) {
        self.feed_delivered.fetch_add(delivered, Ordering::Relaxed);
    }

    pub fn inc_feed_dropped_full(&self) {
        self.feed_dropped_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_feed_pruned_closed(&self) {
        self.feed_pruned_closed.fetch_add(1, Ordering::Relaxed);
    }
}
