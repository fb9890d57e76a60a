//! Idempotency key generation for outbound notifications

use serde::{Deserialize, Serialize};

/// Idempotency key identifying one logical send.
///
/// Composed as `type:recipient[:context_id]`. Equality is exact string
/// equality, no normalization is applied to any part.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub Box<str>);

impl IdempotencyKey {
    /// Build the key for a notification of `notification_type` to `recipient`
    pub fn generate(recipient: &str, notification_type: &str, context_id: Option<&str>) -> Self {
        let key = match context_id {
            Some(context_id) => format!("{}:{}:{}", notification_type, recipient, context_id),
            None => format!("{}:{}", notification_type, recipient),
        };
        Self(key.into_boxed_str())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Shorthand for [`IdempotencyKey::generate`]
pub fn generate_idempotency_key(
    recipient: &str,
    notification_type: &str,
    context_id: Option<&str>,
) -> IdempotencyKey {
    IdempotencyKey::generate(recipient, notification_type, context_id)
}
