//! Capped exponential backoff with randomized jitter.
//!
//! Drives the HTTP publisher's resend loop and the listener's
//! re-registration after a closed stream. Attempts are 1-based: attempt `n`
//! is the `n`-th retry after the initial try.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the initial try. Zero disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Each delay is drawn uniformly from `base * (1 ± jitter_fraction)`.
    /// Clamped to `0.0..=1.0`.
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_retries: 0,
            ..Default::default()
        })
    }

    /// Un-jittered delay for `attempt`, or `None` once the budget is spent.
    pub fn base_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let exp = self.config.multiplier.max(1.0).powi(attempt as i32 - 1);
        let base = self.config.initial_backoff.as_secs_f64() * exp;
        Some(Duration::from_secs_f64(
            base.min(self.config.max_backoff.as_secs_f64()),
        ))
    }

    /// Delay to sleep before retry `attempt`, jittered so concurrent
    /// callers spread out.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        let base = self.base_delay(attempt)?.as_secs_f64();
        let spread = base * self.config.jitter_fraction.clamp(0.0, 1.0);
        if spread == 0.0 {
            return Some(Duration::from_secs_f64(base));
        }
        let jittered = rand::thread_rng().gen_range(base - spread..=base + spread);
        Some(Duration::from_secs_f64(
            jittered.min(self.config.max_backoff.as_secs_f64()),
        ))
    }
}
