//! Configuration for the delivery components

use crate::{RetryPolicy, DEFAULT_DEDUP_WINDOW_MILLIS, DEFAULT_MAX_ATTEMPTS};
use serde::Deserialize;

/// Prefix of every environment variable read by [`ReliabilityConfig::from_env`]
pub const ENV_PREFIX: &str = "RELIABLE_DELIVERY_";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable could not be parsed into its field
    #[error("Invalid or missing environment variable: {0}")]
    Env(#[from] envy::Error),
    /// Values parsed but are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(Box<str>),
}

/// Knobs for dedup, queue and resilient calls.
///
/// Every field has a default, so an empty environment yields
/// `ReliabilityConfig::default()`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// Window within which an identical send is a duplicate
    pub dedup_window_millis: u64,
    /// Queue attempts before an entry is dead-lettered
    pub max_attempts: u32,

    /// Retries after the first try of a resilient call
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_retry_delay_millis: u64,
    /// Cap on any single retry delay
    pub max_retry_delay_millis: u64,
    /// Growth factor between consecutive retry delays
    pub retry_backoff_multiplier: f64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            dedup_window_millis: DEFAULT_DEDUP_WINDOW_MILLIS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_retries: retry.max_retries,
            initial_retry_delay_millis: retry.initial_delay_millis,
            max_retry_delay_millis: retry.max_delay_millis,
            retry_backoff_multiplier: retry.backoff_multiplier,
        }
    }
}

impl ReliabilityConfig {
    /// Load from `RELIABLE_DELIVERY_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of `(name, value)` pairs using the same prefix
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed(ENV_PREFIX).from_iter::<_, Self>(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the components cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup_window_millis == 0 {
            return Err(ConfigError::Invalid("dedup_window_millis must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if !(self.retry_backoff_multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                format!("retry_backoff_multiplier must be >= 1, got {}", self.retry_backoff_multiplier).into(),
            ));
        }
        if self.initial_retry_delay_millis > self.max_retry_delay_millis {
            return Err(ConfigError::Invalid(
                "initial_retry_delay_millis exceeds max_retry_delay_millis".into(),
            ));
        }
        Ok(())
    }

    /// Retry fields as a [`RetryPolicy`]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay_millis: self.initial_retry_delay_millis,
            max_delay_millis: self.max_retry_delay_millis,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}
