//! Fixed-window rate limiter
//!
//! Not part of the delivery path itself; callers use it to throttle sends per
//! recipient or per provider before handing work to the queue.

use crate::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Counter for one key within its current window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests counted in this window
    pub count: u32,
    /// When the window closes; saturates at `u64::MAX`
    pub reset_at_millis: u64,
}

/// Result of [`RateLimiter::check`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Counted; `remaining` more requests fit in the window
    Allowed {
        /// Requests left before the window is full
        remaining: u32,
    },
    /// Window is full
    Denied {
        /// Time until the window closes
        retry_after_millis: u64,
    },
}

impl RateLimitDecision {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Per-key fixed-window request counter.
///
/// A key's window opens on its first request and lasts `window_millis`.
pub struct RateLimiter {
    entries: Mutex<HashMap<Box<str>, RateLimitEntry>>,
    max_requests: u32,
    window_millis: u64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Limiter on the system clock
    pub fn new(max_requests: u32, window_millis: u64) -> Self {
        Self::with_clock(max_requests, window_millis, Arc::new(SystemClock))
    }

    /// Limiter reading time from `clock`
    pub fn with_clock(max_requests: u32, window_millis: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_requests,
            window_millis,
            clock,
        }
    }

    /// Count one request against `key`
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        match entries.get_mut(key) {
            Some(entry) if now < entry.reset_at_millis => {
                if entry.count < self.max_requests {
                    entry.count += 1;
                    RateLimitDecision::Allowed {
                        remaining: self.max_requests - entry.count,
                    }
                } else {
                    let retry_after_millis = entry.reset_at_millis - now;
                    tracing::debug!(key = %key, retry_after_millis, "Rate limit exceeded");
                    RateLimitDecision::Denied { retry_after_millis }
                }
            }
            _ => {
                if self.max_requests == 0 {
                    return RateLimitDecision::Denied {
                        retry_after_millis: self.window_millis,
                    };
                }
                entries.insert(
                    key.into(),
                    RateLimitEntry {
                        count: 1,
                        reset_at_millis: now.saturating_add(self.window_millis),
                    },
                );
                RateLimitDecision::Allowed {
                    remaining: self.max_requests - 1,
                }
            }
        }
    }

    /// Current window for `key`, if any
    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).copied()
    }

    /// Forget `key` so its next request opens a fresh window
    pub fn reset(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    /// Drop entries whose window already closed
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now < entry.reset_at_millis);
        before - entries.len()
    }

    /// Forget every key
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}
