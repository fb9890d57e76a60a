//! Queue statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by a [`crate::NotificationQueue`]
pub struct QueueStats {
    /// Entries appended
    pub enqueued: AtomicU64,
    /// Handler invocations
    pub attempts: AtomicU64,
    /// Successful handler invocations
    pub sent: AtomicU64,
    /// Failed handler invocations, retried or not
    pub attempt_failures: AtomicU64,
    /// Entries that became terminally failed
    pub dead_lettered: AtomicU64,
}

impl QueueStats {
    /// All counters at zero
    pub fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            attempt_failures: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            attempt_failures: self.attempt_failures.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.enqueued.store(0, Ordering::Relaxed);
        self.attempts.store(0, Ordering::Relaxed);
        self.sent.store(0, Ordering::Relaxed);
        self.attempt_failures.store(0, Ordering::Relaxed);
        self.dead_lettered.store(0, Ordering::Relaxed);
    }
}

impl Default for QueueStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of [`QueueStats`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    /// See [`QueueStats::enqueued`]
    pub enqueued: u64,
    /// See [`QueueStats::attempts`]
    pub attempts: u64,
    /// See [`QueueStats::sent`]
    pub sent: u64,
    /// See [`QueueStats::attempt_failures`]
    pub attempt_failures: u64,
    /// See [`QueueStats::dead_lettered`]
    pub dead_lettered: u64,
}
