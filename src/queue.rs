//! In-process notification queue with retry and dead-lettering

use crate::{
    Clock, NotificationStatus, QueueObserver, QueueStats, QueueStatsSnapshot, QueuedNotification,
    SendHandler, SystemClock, TracingObserver, DEFAULT_MAX_ATTEMPTS,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Outcome counts of one drain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Handler invocations made
    pub processed: usize,
    /// Attempts that ended in `sent`
    pub sent: usize,
    /// Failed attempts that went back to pending
    pub retry_scheduled: usize,
    /// Entries that became terminally failed during this drain
    pub dead_lettered: usize,
}

/// Queue of outbound notifications.
///
/// Share it behind an `Arc` with whichever component enqueues or drains.
/// Entries are drained sequentially, in insertion order, by the single
/// registered [`SendHandler`]. Locks are never held across the handler call.
pub struct NotificationQueue {
    entries: RwLock<Vec<QueuedNotification>>,
    handler: RwLock<Option<Arc<dyn SendHandler>>>,
    sequence: AtomicU64,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn QueueObserver>,
    stats: QueueStats,
}

impl NotificationQueue {
    /// Empty queue on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty queue stamping entries with `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            handler: RwLock::new(None),
            sequence: AtomicU64::new(0),
            clock,
            observer: Arc::new(TracingObserver),
            stats: QueueStats::new(),
        }
    }

    /// Replace the default [`TracingObserver`]
    pub fn with_observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Install the send handler. A drain already running keeps the handler
    /// it started with.
    pub fn register_send_handler<H: SendHandler>(&self, handler: H) {
        self.register_shared_handler(Arc::new(handler));
    }

    /// Same as [`register_send_handler`](Self::register_send_handler) for an
    /// already shared handler
    pub fn register_shared_handler(&self, handler: Arc<dyn SendHandler>) {
        let mut slot = self.handler.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(handler);
    }

    /// Whether a drain would call a handler
    pub fn has_send_handler(&self) -> bool {
        self.handler.read().map(|h| h.is_some()).unwrap_or(false)
    }

    /// Append a pending notification with the default attempt ceiling
    pub fn enqueue(
        &self,
        notification_type: &str,
        recipient: &str,
        payload: serde_json::Value,
    ) -> QueuedNotification {
        self.enqueue_with_max_attempts(notification_type, recipient, payload, DEFAULT_MAX_ATTEMPTS)
    }

    /// Append a pending notification that dead-letters after
    /// `max_attempts` failed sends.
    ///
    /// Ids are `type:recipient:createdAtMillis-seq`, so identical calls in the
    /// same millisecond still get distinct entries.
    pub fn enqueue_with_max_attempts(
        &self,
        notification_type: &str,
        recipient: &str,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> QueuedNotification {
        let now = self.clock.now_millis();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let notification = QueuedNotification {
            id: format!("{}:{}:{}-{}", notification_type, recipient, now, seq).into(),
            notification_type: notification_type.into(),
            recipient: recipient.into(),
            payload,
            status: NotificationStatus::Pending,
            attempts: 0,
            max_attempts,
            created_at_millis: now,
            last_attempt_at_millis: None,
            error: None,
        };

        self.write_entries().push(notification.clone());
        QueueStats::incr(&self.stats.enqueued);
        self.observer.on_enqueued(&notification);
        notification
    }

    /// Run every pending entry through the send handler once.
    ///
    /// Never fails: handler errors become entry state. Without a registered
    /// handler nothing is touched.
    pub async fn process_pending_notifications(&self) -> ProcessSummary {
        let mut summary = ProcessSummary::default();

        let handler = self.handler.read().ok().and_then(|h| (*h).clone());
        let Some(handler) = handler else {
            tracing::warn!("No send handler registered, skipping notification processing");
            return summary;
        };

        let candidates: Vec<Box<str>> = self
            .read_entries()
            .iter()
            .filter(|n| n.is_processable())
            .map(|n| n.id.clone())
            .collect();

        for id in candidates {
            let snapshot = {
                let mut entries = self.write_entries();
                let Some(entry) = entries.iter_mut().find(|n| n.id == id) else {
                    continue;
                };
                if !entry.is_processable() {
                    continue;
                }
                if entry.attempts_exhausted() {
                    if entry.status != NotificationStatus::Failed {
                        entry.status = NotificationStatus::Failed;
                        summary.dead_lettered += 1;
                        QueueStats::incr(&self.stats.dead_lettered);
                        self.observer.on_dead_lettered(entry);
                    }
                    continue;
                }

                entry.status = NotificationStatus::Processing;
                entry.attempts += 1;
                entry.last_attempt_at_millis = Some(self.clock.now_millis());
                entry.clone()
            };

            summary.processed += 1;
            QueueStats::incr(&self.stats.attempts);
            self.observer.on_attempt_started(&snapshot);

            let result = handler.send(&snapshot).await;

            let mut entries = self.write_entries();
            let Some(entry) = entries.iter_mut().find(|n| n.id == id) else {
                continue;
            };

            match result {
                Ok(()) => {
                    entry.status = NotificationStatus::Sent;
                    summary.sent += 1;
                    QueueStats::incr(&self.stats.sent);
                    self.observer.on_sent(entry);
                }
                Err(e) => {
                    let message = e.to_string();
                    entry.error = Some(message.as_str().into());
                    QueueStats::incr(&self.stats.attempt_failures);

                    if entry.attempts_exhausted() {
                        entry.status = NotificationStatus::Failed;
                        self.observer.on_attempt_failed(entry, &message, false);
                        summary.dead_lettered += 1;
                        QueueStats::incr(&self.stats.dead_lettered);
                        self.observer.on_dead_lettered(entry);
                    } else {
                        entry.status = NotificationStatus::Pending;
                        self.observer.on_attempt_failed(entry, &message, true);
                        summary.retry_scheduled += 1;
                    }
                }
            }
        }

        if summary.processed > 0 || summary.dead_lettered > 0 {
            tracing::info!(
                processed = summary.processed,
                sent = summary.sent,
                retry_scheduled = summary.retry_scheduled,
                dead_lettered = summary.dead_lettered,
                "Processed pending notifications"
            );
        }

        summary
    }

    /// Snapshot of every entry in insertion order
    pub fn get_queue(&self) -> Vec<QueuedNotification> {
        self.read_entries().clone()
    }

    /// Entries that exhausted their attempts
    pub fn get_dead_letter_queue(&self) -> Vec<QueuedNotification> {
        self.read_entries()
            .iter()
            .filter(|n| n.is_dead_lettered())
            .cloned()
            .collect()
    }

    /// Entry by id
    pub fn get(&self, id: &str) -> Option<QueuedNotification> {
        self.read_entries().iter().find(|n| &*n.id == id).cloned()
    }

    /// Entries waiting for their next attempt
    pub fn pending_count(&self) -> usize {
        self.read_entries()
            .iter()
            .filter(|n| n.status == NotificationStatus::Pending)
            .count()
    }

    /// Number of entries in any state
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Whether the queue holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. The handler and stats are kept.
    pub fn clear_queue(&self) {
        self.write_entries().clear();
    }

    /// Drop every sent entry. Pending and failed entries keep their order.
    pub fn remove_sent(&self) -> usize {
        self.prune_sent(0)
    }

    /// Drop sent entries whose last attempt is at least `older_than_millis`
    /// old, returning how many were removed.
    ///
    /// Dead letters are never pruned; they stay until an operator clears them.
    pub fn prune_sent(&self, older_than_millis: u64) -> usize {
        let now = self.clock.now_millis();
        let removed = {
            let mut entries = self.write_entries();
            let before = entries.len();
            entries.retain(|n| {
                let sent_at = n.last_attempt_at_millis.unwrap_or(n.created_at_millis);
                n.status != NotificationStatus::Sent
                    || now.saturating_sub(sent_at) < older_than_millis
            });
            before - entries.len()
        };

        if removed > 0 {
            tracing::debug!(removed, older_than_millis, "Pruned sent notifications");
        }
        removed
    }

    /// Counter snapshot since construction
    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot()
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<QueuedNotification>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<QueuedNotification>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}
