//! Retry with backoff for idempotent calls.
//!
//! The `retryRequest` option (`{isOpenRetry, count, waitTime}`) resolves to a
//! [`RetryPolicy`] with a fixed delay. Policies with exponential growth and
//! jitter are available for callers that want to wrap their own operations.
//!
//! # Overview
//!
//! - [`RetryPolicy`]: Max attempts and backoff settings
//! - [`ExponentialBackoff`]: Iterator-like source of sleep durations with jitter
//! - [`retry_with_policy`]: Re-run a fallible async operation while its error is retryable
//!
//! Only errors for which [`ClientError::is_retryable`] holds are retried:
//! connection failures, unreadable bodies, timeouts and gateway statuses.
//! Aborts, application errors and configuration errors return immediately.
//!
//! # Example
//!
//! ```ignore
//! use dualfetch_client::{RetryPolicy, retry_with_policy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::fixed(3, Duration::from_millis(200));
//! let users: Vec<User> = retry_with_policy(&policy, || client.get(RequestDescriptor::new("/users"))).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::ClientError;

/// Default backoff values.
pub mod defaults {
    use std::time::Duration;

    /// Initial delay before the first retry.
    pub const BASE_DELAY: Duration = Duration::from_millis(100);

    /// Multiplier for exponential backoff.
    pub const MULTIPLIER: f64 = 1.6;

    /// Jitter factor (0.2 means +/- 20%).
    pub const JITTER: f64 = 0.2;

    /// Maximum delay between retries.
    pub const MAX_DELAY: Duration = Duration::from_secs(10);

    /// Maximum number of retry attempts.
    pub const MAX_RETRIES: u32 = 5;
}

/// Configuration for retry behavior.
///
/// # Example
///
/// ```
/// use dualfetch_client::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .max_retries(3)
///     .base_delay(Duration::from_millis(50))
///     .max_delay(Duration::from_secs(2));
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Initial delay before the first retry.
    pub base_delay: Duration,

    /// Multiplier for exponential backoff. Should be >= 1.0.
    pub multiplier: f64,

    /// Jitter factor between 0.0 and 1.0.
    pub jitter: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Maximum number of retry attempts, not counting the initial request.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: defaults::BASE_DELAY,
            multiplier: defaults::MULTIPLIER,
            jitter: defaults::JITTER,
            max_delay: defaults::MAX_DELAY,
            max_retries: defaults::MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// A policy that waits the same `delay` before each of `max_retries` retries.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
            max_delay: delay,
            max_retries,
        }
    }

    /// Set the maximum number of retry attempts.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier. Checked by [`validate`](Self::validate).
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter factor. Checked by [`validate`](Self::validate).
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validate the policy configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.base_delay > self.max_delay {
            return Err("base_delay must not exceed max_delay");
        }
        if self.multiplier < 1.0 {
            return Err("multiplier must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0");
        }
        Ok(())
    }

    /// Create an ExponentialBackoff from this policy.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.clone())
    }
}

/// Exponential backoff with jitter.
///
/// Delays follow `base * multiplier^attempt`, each randomized by +/- jitter
/// and clamped to `max_delay`.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    current_delay_secs: f64,
    attempts: u32,
}

impl ExponentialBackoff {
    /// Create a new ExponentialBackoff from a RetryPolicy.
    pub fn new(policy: RetryPolicy) -> Self {
        let current_delay_secs = policy.base_delay.as_secs_f64();
        Self {
            policy,
            current_delay_secs,
            attempts: 0,
        }
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Check if more retries are allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_retries
    }

    /// Get the next delay and advance.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay_secs;

        let jittered = if self.policy.jitter > 0.0 {
            let random_factor =
                rand::random::<f64>() * self.policy.jitter * 2.0 - self.policy.jitter;
            delay * (1.0 + random_factor)
        } else {
            delay
        };

        let max = self.policy.max_delay.as_secs_f64();
        self.current_delay_secs = (self.current_delay_secs * self.policy.multiplier).min(max);
        self.attempts += 1;

        Duration::from_secs_f64(jittered.min(max).max(0.0))
    }
}

/// Re-run `f` while it fails with a retryable error and the policy allows it.
///
/// # Errors
///
/// Returns [`ClientError::Config`] if the policy is invalid, otherwise the
/// last error produced by `f`.
pub async fn retry_with_policy<F, Fut, T>(policy: &RetryPolicy, f: F) -> Result<T, ClientError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    policy.validate().map_err(ClientError::config)?;

    let mut backoff = policy.backoff();

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && backoff.can_retry() => {
                let delay = backoff.next_delay();
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    error = %e,
                    attempt = backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
