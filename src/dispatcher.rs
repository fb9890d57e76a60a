//! Composition of the delivery pieces: dedup in front of the queue, and
//! resilient sub-retries inside the send handler

use crate::{
    DedupeError, DedupeStore, IdempotencyKey, NotificationQueue, QueuedNotification,
    ReliabilityConfig, ResilientCall, RetryPolicy, SendHandler,
};
use std::sync::Arc;

/// Result of [`NotificationDispatcher::dispatch`]
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// Accepted into the queue
    Queued(QueuedNotification),
    /// Same logical send already seen within the dedup window
    Duplicate {
        /// Key that matched
        key: IdempotencyKey,
    },
}

impl DispatchOutcome {
    /// Whether the send was suppressed
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Checks the dedup store before enqueueing.
///
/// The queue itself never deduplicates; this is the only place where the
/// `(type, recipient, context)` triple is compared.
pub struct NotificationDispatcher {
    dedupe: Arc<dyn DedupeStore>,
    queue: Arc<NotificationQueue>,
    window_millis: u64,
    max_attempts: u32,
}

impl NotificationDispatcher {
    /// Dispatcher enqueueing with `max_attempts` and suppressing repeats
    /// within `window_millis`
    pub fn new(
        dedupe: Arc<dyn DedupeStore>,
        queue: Arc<NotificationQueue>,
        window_millis: u64,
        max_attempts: u32,
    ) -> Self {
        Self {
            dedupe,
            queue,
            window_millis,
            max_attempts,
        }
    }

    /// Dispatcher using the configured window and attempt ceiling
    pub fn from_config(
        config: &ReliabilityConfig,
        dedupe: Arc<dyn DedupeStore>,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        Self::new(dedupe, queue, config.dedup_window_millis, config.max_attempts)
    }

    /// Queue that accepted notifications land in
    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    /// Enqueue unless the same `(type, recipient, context)` was dispatched
    /// within the window
    pub fn dispatch(
        &self,
        notification_type: &str,
        recipient: &str,
        context_id: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<DispatchOutcome, DedupeError> {
        let key = IdempotencyKey::generate(recipient, notification_type, context_id);

        if self.dedupe.is_duplicate(&key, self.window_millis)? {
            tracing::info!(key = %key, "Skipping duplicate notification");
            return Ok(DispatchOutcome::Duplicate { key });
        }

        let notification = self.queue.enqueue_with_max_attempts(
            notification_type,
            recipient,
            payload,
            self.max_attempts,
        );
        Ok(DispatchOutcome::Queued(notification))
    }
}

/// Wraps a send handler so each queue attempt is itself a resilient call.
///
/// Transient failures are retried with backoff inside one queue attempt; only
/// when those retries are exhausted does the queue count a failed attempt.
pub struct RetryingHandler<H> {
    inner: H,
    policy: RetryPolicy,
}

impl<H: SendHandler> RetryingHandler<H> {
    /// Wrap `inner`, retrying each send under `policy`
    pub fn new(inner: H, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wrapped handler
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<H: SendHandler> SendHandler for RetryingHandler<H> {
    async fn send(&self, notification: &QueuedNotification) -> anyhow::Result<()> {
        ResilientCall::new(format!("send:{}", notification.id))
            .policy(self.policy.clone())
            .run(|| self.inner.send(notification))
            .await
    }
}
