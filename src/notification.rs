//! Queued notification record and its status

use serde::{Deserialize, Serialize};

/// Default attempt ceiling for a queued notification
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delivery status
///
/// `Failed` is terminal: it is only stored once attempts are exhausted. A
/// failed attempt with budget left goes back to `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Waiting for a drain
    Pending,
    /// Handler call in flight
    Processing,
    /// Delivered
    Sent,
    /// Attempts exhausted; dead letter
    Failed,
}

impl NotificationStatus {
    /// Lowercase name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Whether no further attempts will be made
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of outbound work owned by the queue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedNotification {
    /// Unique queue id, `type:recipient:createdAtMillis-seq`
    pub id: Box<str>,
    /// Channel tag, e.g. `whatsapp` or `email`
    #[serde(rename = "type")]
    pub notification_type: Box<str>,
    /// Phone number, address or other channel-specific target
    pub recipient: Box<str>,
    /// Opaque content handed to the send handler
    pub payload: serde_json::Value,
    /// Lifecycle state
    pub status: NotificationStatus,
    /// Handler calls made so far
    pub attempts: u32,
    /// Attempt ceiling
    pub max_attempts: u32,
    /// Enqueue time
    pub created_at_millis: u64,
    /// Start of the most recent attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at_millis: Option<u64>,
    /// Message of the most recent failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Box<str>>,
}

impl QueuedNotification {
    /// Whether `attempts` reached `max_attempts`
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Eligible for the next drain
    pub fn is_processable(&self) -> bool {
        matches!(self.status, NotificationStatus::Pending | NotificationStatus::Failed)
    }

    /// Exhausted and parked for manual inspection
    pub fn is_dead_lettered(&self) -> bool {
        self.status == NotificationStatus::Failed && self.attempts_exhausted()
    }
}
