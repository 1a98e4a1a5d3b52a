//! Retry configuration and exponential backoff calculation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff parameters for retrying transient failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor in `[0.0, 1.0]`; the delay varies by ±factor.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based), with random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff_delay(self, attempt, rand::random::<f64>())
    }
}

/// Exponential backoff: `base * 2^attempt`, capped at `max_delay_ms`, then
/// scaled by `1 + jitter_factor * (2 * unit - 1)`.
///
/// `unit` is a sample from `[0.0, 1.0)`; passing it in keeps the function pure.
pub fn calculate_backoff_delay(config: &RetryConfig, attempt: u32, unit: f64) -> Duration {
    let exp = config
        .base_delay_ms
        .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    let capped = exp.min(config.max_delay_ms);
    let jitter = config.jitter_factor.clamp(0.0, 1.0);
    let scale = 1.0 + jitter * (2.0 * unit.clamp(0.0, 1.0) - 1.0);
    let ms = (capped as f64 * scale).round().max(0.0);
    Duration::from_millis(ms as u64)
}
