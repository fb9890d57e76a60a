//! Deduplication storage for idempotency keys

use crate::{Clock, IdempotencyKey, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Default dedup window (one minute)
pub const DEFAULT_DEDUP_WINDOW_MILLIS: u64 = 60_000;

/// Deduplication storage trait
///
/// `is_duplicate` is check-and-set: a `false` verdict records the key as
/// seen, so callers invoke it exactly once per attempted send.
pub trait DedupeStore: Send + Sync + 'static {
    /// `true` if `key` was seen less than `window_millis` ago; otherwise
    /// records it as seen now and returns `false`
    fn is_duplicate(&self, key: &IdempotencyKey, window_millis: u64) -> Result<bool, DedupeError>;
    /// Record `key` as seen now, refreshing any earlier timestamp
    fn mark_sent(&self, key: &IdempotencyKey) -> Result<(), DedupeError>;
    /// Drop keys older than the window, returning how many were dropped
    fn evict_expired(&self, window_millis: u64) -> Result<usize, DedupeError>;
    /// Drop every key
    fn clear(&self) -> Result<(), DedupeError>;
    /// Stored keys, expired ones included until evicted
    fn len(&self) -> usize;

    /// Whether no keys are stored
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dedupe storage errors
#[derive(Debug, thiserror::Error)]
pub enum DedupeError {
    /// Backend failed or its lock was poisoned
    #[error("Storage error: {0}")]
    Storage(Box<str>),
}

/// When a key was last seen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DedupEntry {
    /// Time of the last recording
    pub timestamp_millis: u64,
}

impl DedupEntry {
    fn is_fresh(&self, now: u64, window_millis: u64) -> bool {
        now.saturating_sub(self.timestamp_millis) < window_millis
    }
}

/// In-memory dedupe store
///
/// Entries live only as long as the process. Expired entries stay in the map
/// until [`DedupeStore::evict_expired`] runs but are ignored by lookups.
pub struct InMemoryDedupe {
    data: RwLock<HashMap<Box<str>, DedupEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDedupe {
    /// Empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty store reading time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Entry currently stored for `key`, fresh or not
    pub fn entry(&self, key: &IdempotencyKey) -> Option<DedupEntry> {
        let data = self.data.read().ok()?;
        data.get(key.as_str()).copied()
    }
}

impl DedupeStore for InMemoryDedupe {
    fn is_duplicate(&self, key: &IdempotencyKey, window_millis: u64) -> Result<bool, DedupeError> {
        let now = self.clock.now_millis();
        let mut data = self.data.write().map_err(|e| DedupeError::Storage(e.to_string().into()))?;

        if let Some(entry) = data.get(key.as_str()) {
            if entry.is_fresh(now, window_millis) {
                tracing::debug!(key = %key, "Duplicate within dedup window");
                return Ok(true);
            }
        }

        data.insert(key.0.clone(), DedupEntry { timestamp_millis: now });
        Ok(false)
    }

    fn mark_sent(&self, key: &IdempotencyKey) -> Result<(), DedupeError> {
        let now = self.clock.now_millis();
        let mut data = self.data.write().map_err(|e| DedupeError::Storage(e.to_string().into()))?;
        data.insert(key.0.clone(), DedupEntry { timestamp_millis: now });
        Ok(())
    }

    fn evict_expired(&self, window_millis: u64) -> Result<usize, DedupeError> {
        let now = self.clock.now_millis();
        let mut data = self.data.write().map_err(|e| DedupeError::Storage(e.to_string().into()))?;
        let before = data.len();
        data.retain(|_, entry| entry.is_fresh(now, window_millis));
        let evicted = before - data.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = data.len(), "Evicted expired dedup entries");
        }
        Ok(evicted)
    }

    fn clear(&self) -> Result<(), DedupeError> {
        let mut data = self.data.write().map_err(|e| DedupeError::Storage(e.to_string().into()))?;
        data.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }
}

impl Default for InMemoryDedupe {
    fn default() -> Self {
        Self::new()
    }
}
