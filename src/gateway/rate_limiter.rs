//! Global call-rate limiter for the metadata service
//!
//! All callers share one exclusive gate holding the time of the last grant.
//! Waiters queue on tokio's fair mutex, so admission is first-come first-served
//! and the observed cadence never exceeds the configured rate however many
//! tasks are calling concurrently.

use crate::config::GatewayConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes outbound calls to at most `calls_per_second`
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter that grants at most `calls_per_second` acquisitions per second
    ///
    /// A non-positive rate disables throttling.
    pub fn new(calls_per_second: f64) -> Self {
        let min_interval = if calls_per_second > 0.0 && calls_per_second.is_finite() {
            Duration::from_secs_f64(1.0 / calls_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            min_interval,
            last_grant: Mutex::new(None),
        }
    }

    /// Creates the metadata limiter, using the higher rate when an API key is configured
    pub fn from_config(config: &GatewayConfig) -> Self {
        let rate = config.effective_rate();
        tracing::debug!(
            "Metadata rate limit: {:.1} calls/sec (api key: {})",
            rate,
            config.api_key.is_some()
        );
        Self::new(rate)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until a call may be issued, then records the grant
    ///
    /// The gate is held while sleeping so later arrivals queue behind the
    /// current waiter instead of racing it.
    pub async fn acquire(&self) {
        let mut last_grant = self.last_grant.lock().await;

        if let Some(previous) = *last_grant {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last_grant = Some(Instant::now());
    }
}
