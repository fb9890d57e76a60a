//! Reliable delivery for outbound notifications
//!
//! Four small, independent pieces that callers compose around WhatsApp/email
//! sends and other side effects on external systems:
//!
//! - [`DedupeStore`] / [`InMemoryDedupe`]: suppress the same logical send
//!   within a time window, keyed by an [`IdempotencyKey`].
//! - [`ResilientCall`]: retry one async operation with exponential backoff
//!   and an optional fallback.
//! - [`NotificationQueue`]: pending notifications drained through a
//!   registered [`SendHandler`], retried up to a ceiling, then dead-lettered.
//! - [`TransactionManager`]: saga-style steps with compensations run in
//!   reverse order when a later step fails.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let clock = Arc::new(SystemClock);
//! let dedupe = Arc::new(InMemoryDedupe::with_clock(clock.clone()));
//! let queue = Arc::new(NotificationQueue::with_clock(clock));
//! queue.register_send_handler(RetryingHandler::new(WhatsAppSender::new(), RetryPolicy::default()));
//!
//! let dispatcher = NotificationDispatcher::from_config(&config, dedupe, queue.clone());
//! dispatcher.dispatch("whatsapp", "34600000000", Some("pedido-1"), payload)?;
//!
//! queue.process_pending_notifications().await;
//! for dead in queue.get_dead_letter_queue() {
//!     alert_operator(&dead);
//! }
//! ```
//!
//! All state is in-memory and process-local.

#![warn(missing_docs)]

// === Core Types ===
mod clock;
mod idempotency;
mod notification;

// === Traits ===
mod traits;

// === Storage ===
mod dedupe;
mod queue;
mod rate_limit;

// === Execution ===
mod dispatcher;
mod resilient;
mod transaction;

// === Observability ===
mod observer;
mod stats;

// === Configuration ===
mod config;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// === Re-exports ===

// Types
pub use clock::{Clock, ManualClock, SystemClock};
pub use idempotency::{generate_idempotency_key, IdempotencyKey};
pub use notification::{NotificationStatus, QueuedNotification, DEFAULT_MAX_ATTEMPTS};

// Traits
pub use traits::{RetryPolicy, SendHandler};

// Storage
pub use dedupe::{DedupEntry, DedupeError, DedupeStore, InMemoryDedupe, DEFAULT_DEDUP_WINDOW_MILLIS};
pub use queue::{NotificationQueue, ProcessSummary};
pub use rate_limit::{RateLimitDecision, RateLimitEntry, RateLimiter};

// Execution
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, RetryingHandler};
pub use resilient::{execute_resilient_call, ResilientCall};
pub use transaction::TransactionManager;

// Observability
pub use observer::{NoOpObserver, QueueObserver, TracingObserver};
pub use stats::{QueueStats, QueueStatsSnapshot};

// Configuration
pub use config::{ConfigError, ReliabilityConfig, ENV_PREFIX};
