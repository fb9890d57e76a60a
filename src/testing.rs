//! Test helpers, also exported under the `test-support` feature

use crate::{QueuedNotification, SendHandler};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};

/// Install a fmt subscriber filtered by `RUST_LOG` (default `warn`), once
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Send handler that fails a fixed number of calls, then succeeds.
///
/// Clones share the same call log.
#[derive(Clone)]
pub struct ScriptedHandler {
    inner: Arc<ScriptedInner>,
}

struct ScriptedInner {
    fail_first: u32,
    message: Box<str>,
    calls: AtomicU32,
    seen: Mutex<Vec<Box<str>>>,
}

impl ScriptedHandler {
    /// Fail the first `fail_first` calls with a fixed message
    pub fn failing_first(fail_first: u32) -> Self {
        Self::build(fail_first, "scripted failure")
    }

    /// Fail every call with `message`
    pub fn always_failing(message: &str) -> Self {
        Self::build(u32::MAX, message)
    }

    /// Succeed on every call
    pub fn succeeding() -> Self {
        Self::build(0, "")
    }

    fn build(fail_first: u32, message: &str) -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                fail_first,
                message: message.into(),
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Calls made so far, across clones
    pub fn calls(&self) -> u32 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Notification ids in invocation order
    pub fn seen_ids(&self) -> Vec<Box<str>> {
        self.inner.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SendHandler for ScriptedHandler {
    async fn send(&self, notification: &QueuedNotification) -> anyhow::Result<()> {
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.inner.seen.lock() {
            seen.push(notification.id.clone());
        }
        if call < self.inner.fail_first {
            anyhow::bail!("{}", self.inner.message);
        }
        Ok(())
    }
}
