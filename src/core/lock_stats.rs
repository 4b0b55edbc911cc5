use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for row-lock activity inside one store instance.
#[derive(Debug, Default)]
pub struct LockStats {
    granted: AtomicU64,
    waited: AtomicU64,
    wait_timeouts: AtomicU64,
    write_conflicts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub struct LockStatsSnapshot {
    /// Locks handed out, including grants that never had to wait.
    pub granted: u64,
    /// Acquisitions that found the lock held and had to queue.
    pub waited: u64,
    /// Waiters that gave up after the configured wait timeout.
    pub wait_timeouts: u64,
    /// Writes rejected by first-updater-wins conflict detection.
    pub write_conflicts: u64,
}

impl LockStats {
    pub fn record_granted(&self) {
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_waited(&self) {
        self.waited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait_timeout(&self) {
        self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LockStatsSnapshot {
        LockStatsSnapshot {
            granted: self.granted.load(Ordering::Relaxed),
            waited: self.waited.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
        }
    }
}
