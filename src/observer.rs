//! Queue observer trait

use crate::QueuedNotification;

/// Observer trait for external observability
pub trait QueueObserver: Send + Sync + 'static {
    /// Entry appended as `pending`
    fn on_enqueued(&self, notification: &QueuedNotification);
    /// Entry moved to `processing`, handler about to be called
    fn on_attempt_started(&self, notification: &QueuedNotification);
    /// Handler succeeded
    fn on_sent(&self, notification: &QueuedNotification);
    /// Handler failed; `will_retry` is false when this was the last attempt
    fn on_attempt_failed(&self, notification: &QueuedNotification, error: &str, will_retry: bool);
    /// Entry became terminally `failed`
    fn on_dead_lettered(&self, notification: &QueuedNotification);
}

/// No-op observer
pub struct NoOpObserver;

impl QueueObserver for NoOpObserver {
    fn on_enqueued(&self, _notification: &QueuedNotification) {}
    fn on_attempt_started(&self, _notification: &QueuedNotification) {}
    fn on_sent(&self, _notification: &QueuedNotification) {}
    fn on_attempt_failed(&self, _notification: &QueuedNotification, _error: &str, _will_retry: bool) {}
    fn on_dead_lettered(&self, _notification: &QueuedNotification) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl QueueObserver for TracingObserver {
    fn on_enqueued(&self, n: &QueuedNotification) {
        tracing::debug!(id = %n.id, notification_type = %n.notification_type, "Notification enqueued");
    }

    fn on_attempt_started(&self, n: &QueuedNotification) {
        tracing::debug!(id = %n.id, attempt = n.attempts, max_attempts = n.max_attempts, "Send attempt started");
    }

    fn on_sent(&self, n: &QueuedNotification) {
        tracing::info!(id = %n.id, recipient = %n.recipient, attempts = n.attempts, "Notification sent");
    }

    fn on_attempt_failed(&self, n: &QueuedNotification, error: &str, will_retry: bool) {
        tracing::warn!(id = %n.id, attempt = n.attempts, error = %error, will_retry, "Send attempt failed");
    }

    fn on_dead_lettered(&self, n: &QueuedNotification) {
        tracing::warn!(
            id = %n.id,
            recipient = %n.recipient,
            attempts = n.attempts,
            error = n.error.as_deref().unwrap_or(""),
            "Notification moved to dead-letter queue"
        );
    }
}
