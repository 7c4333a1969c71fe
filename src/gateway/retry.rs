//! Bounded exponential backoff with jitter
//!
//! The policy only decides *when* to try again. Whether a failure is worth
//! retrying is decided by the error type through [`Retryable`]; terminal
//! failures are returned on the first attempt.

use crate::config::RetryConfig;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Classifies an error as transient (worth retrying) or terminal
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry parameters for one class of operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential_base: config.exponential_base,
            jitter: config.jitter,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    ///
    /// `min(initial * base^attempt, max)`, scaled by a factor in `[0.5, 1.5)`
    /// when jitter is enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let scaled = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..1.5)
        } else {
            capped
        };

        Duration::try_from_secs_f64(scaled).unwrap_or(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails terminally, or retries run out
    ///
    /// # Arguments
    ///
    /// * `label` - Operation description used in log lines
    /// * `operation` - Produces a fresh attempt each time it is called
    ///
    /// # Returns
    ///
    /// The first success, or the last error once `max_retries` retries have
    /// been spent (at most `max_retries` delays are performed).
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!("{} succeeded after {} retries", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:.2}s",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!("{} failed after {} attempts: {}", label, attempt + 1, e);
                    } else {
                        tracing::debug!("{} failed with a terminal error: {}", label, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Same contract as [`RetryPolicy::run`] for an operation that does not suspend
    pub async fn run_sync<T, E, F>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Retryable + Display,
    {
        self.run(label, || std::future::ready(operation())).await
    }
}
