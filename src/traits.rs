//! Core traits and policies for delivery

use crate::QueuedNotification;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Performs the actual send of one queued notification.
///
/// Retries re-invoke the handler with the same notification id and payload,
/// so implementations must tolerate being called more than once for it.
///
/// # Example
///
/// ```rust,ignore
/// struct WhatsAppSender { client: CloudApiClient }
///
/// #[async_trait::async_trait]
/// impl SendHandler for WhatsAppSender {
///     async fn send(&self, notification: &QueuedNotification) -> anyhow::Result<()> {
///         self.client.send_template(&notification.recipient, &notification.payload).await
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait SendHandler: Send + Sync + 'static {
    /// Deliver the notification. `Err` marks the attempt as failed.
    async fn send(&self, notification: &QueuedNotification) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl<F, Fut> SendHandler for F
where
    F: Fn(QueuedNotification) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn send(&self, notification: &QueuedNotification) -> anyhow::Result<()> {
        (self)(notification.clone()).await
    }
}

/// Retry policy for resilient calls
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds)
    pub initial_delay_millis: u64,
    /// Maximum delay cap (milliseconds)
    pub max_delay_millis: u64,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_millis: 1000,
            max_delay_millis: 30000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Upper bound on how many times the operation runs
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-indexed)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let delay = self.initial_delay_millis as f64
            * self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let capped = delay.min(self.max_delay_millis as f64);
        Duration::from_millis(capped as u64)
    }

    /// Sum of every delay the policy can spend sleeping
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_retries).map(|r| self.delay_for_retry(r)).sum()
    }
}
