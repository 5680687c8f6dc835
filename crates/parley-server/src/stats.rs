//! Delivery counters.
//!
//! Dropped enqueues are counted here so that overflow is visible without
//! the sender ever blocking on a slow recipient.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct DeliveryStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    forced_disconnects: AtomicU64,
    superseded: AtomicU64,
    replayed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub forced_disconnects: u64,
    pub superseded: u64,
    pub replayed: u64,
}

impl DeliveryStats {
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_disconnect(&self) {
        self.forced_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replayed(&self, count: u64) {
        self.replayed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            forced_disconnects: self.forced_disconnects.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = DeliveryStats::default();
        stats.record_enqueued();
        stats.record_enqueued();
        stats.record_dropped();
        stats.record_forced_disconnect();
        stats.record_replayed(3);

        let snap = stats.snapshot();
        assert_eq!(snap.enqueued, 2);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.forced_disconnects, 1);
        assert_eq!(snap.superseded, 0);
        assert_eq!(snap.replayed, 3);
    }
}
