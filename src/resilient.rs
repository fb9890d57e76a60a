//! Retry a single async operation with exponential backoff

use crate::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, error, info, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type Fallback<'a, T, E> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T, E>> + Send + 'a>;
type FailureHook<'a, E> = Box<dyn FnOnce(&E) + Send + 'a>;

/// Builder for one resilient call.
///
/// The operation runs at most `policy.max_retries + 1` times. When every
/// attempt fails, `on_failure` sees the last error, then the fallback (if
/// any) produces the result; without a fallback the last error is returned.
///
/// ```rust,ignore
/// let body = ResilientCall::new("sheets.append")
///     .policy(RetryPolicy { max_retries: 2, ..Default::default() })
///     .on_failure(|e| alert_ops(e))
///     .fallback(|| async { Ok(Vec::new()) })
///     .run(|| client.append_rows(&rows))
///     .await?;
/// ```
pub struct ResilientCall<'a, T, E> {
    name: Box<str>,
    policy: RetryPolicy,
    fallback: Option<Fallback<'a, T, E>>,
    on_failure: Option<FailureHook<'a, E>>,
}

impl<'a, T, E> ResilientCall<'a, T, E>
where
    E: Display,
{
    /// Call named `name` in logs, under the default policy
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            policy: RetryPolicy::default(),
            fallback: None,
            on_failure: None,
        }
    }

    /// Replace the retry policy
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Value to produce once every attempt failed. Its own error propagates.
    pub fn fallback<F, Fut>(mut self, fallback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
    {
        self.fallback = Some(Box::new(move || -> BoxFuture<'a, Result<T, E>> {
            Box::pin(fallback())
        }));
        self
    }

    /// Called with the last error once every attempt failed
    pub fn on_failure<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&E) + Send + 'a,
    {
        self.on_failure = Some(Box::new(hook));
        self
    }

    /// Run `operation` until it succeeds or the policy is exhausted
    pub async fn run<F, Fut>(self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total_attempts = self.policy.total_attempts();
        let mut attempt = 0;

        let last_error = loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(call = %self.name, attempt, "Resilient call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= total_attempts {
                        break e;
                    }

                    let delay = self.policy.delay_for_retry(attempt - 1);
                    warn!(
                        call = %self.name,
                        attempt,
                        max_attempts = total_attempts,
                        error = %e,
                        "Resilient call attempt failed"
                    );
                    debug!(call = %self.name, delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        };

        error!(
            call = %self.name,
            attempts = attempt,
            error = %last_error,
            "Resilient call failed after exhausting all attempts"
        );

        if let Some(hook) = self.on_failure {
            hook(&last_error);
        }

        match self.fallback {
            Some(fallback) => {
                info!(call = %self.name, "Using fallback result");
                fallback().await
            }
            None => Err(last_error),
        }
    }
}

/// Run `operation` under `policy` with no fallback or failure hook
pub async fn execute_resilient_call<T, E, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    ResilientCall::new(name)
        .policy(policy.clone())
        .run(operation)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_millis: 100,
            max_delay_millis: 1000,
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_without_delay() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = execute_resilient_call("ok", &policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(7) }
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_and_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = execute_resilient_call("always-fails", &policy(2), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(anyhow!("failure {}", n)) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().to_string(), "failure 3");
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_used_after_exhaustion() {
        let calls = AtomicU32::new(0);
        let seen = Arc::new(Mutex::new(None));
        let seen_hook = Arc::clone(&seen);

        let result = ResilientCall::new("with-fallback")
            .policy(policy(2))
            .on_failure(move |e: &anyhow::Error| {
                *seen_hook.lock().unwrap() = Some(e.to_string());
            })
            .fallback(|| async { Ok("cached") })
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("upstream down")) }
            })
            .await
            .unwrap();

        assert_eq!(result, "cached");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("upstream down"));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_error_propagates() {
        let result: Result<u8, anyhow::Error> = ResilientCall::new("fallback-fails")
            .policy(policy(0))
            .fallback(|| async { Err(anyhow!("fallback broke")) })
            .run(|| async { Err(anyhow!("primary broke")) })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "fallback broke");
    }

    #[tokio::test(start_paused = true)]
    async fn on_failure_runs_without_fallback() {
        let hits = Arc::new(AtomicU32::new(0));
        let hook_hits = Arc::clone(&hits);

        let result: Result<(), String> = ResilientCall::new("hook-only")
            .policy(policy(1))
            .on_failure(move |_: &String| {
                hook_hits.fetch_add(1, Ordering::SeqCst);
            })
            .run(|| async { Err("nope".to_string()) })
            .await;

        assert_eq!(result.unwrap_err(), "nope");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_schedule_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay_millis: 100,
            max_delay_millis: 500,
            backoff_multiplier: 2.0,
        };
        let start = Instant::now();
        let stamps = Mutex::new(Vec::new());

        let _: Result<(), &str> = execute_resilient_call("schedule", &policy, || {
            stamps.lock().unwrap().push(start.elapsed().as_millis() as u64);
            async { Err("fail") }
        })
        .await;

        // waits: 100, 200, 400, 500, 500
        assert_eq!(*stamps.lock().unwrap(), vec![0, 100, 300, 700, 1200, 1700]);
        assert_eq!(start.elapsed(), policy.max_total_delay());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = execute_resilient_call("flaky", &policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(anyhow!("transient"))
                } else {
                    Ok("sent")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "sent");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
