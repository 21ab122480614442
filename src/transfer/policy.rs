use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff.
///
/// `max_retries` counts attempts after the first one, so a policy with
/// `max_retries = 3` issues at most four requests. Delays never decrease
/// from one retry to the next: jitter stays strictly below the gap to the
/// next un-jittered step and the cap is applied last.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 8_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn effective_multiplier(&self) -> f64 {
        if self.multiplier.is_finite() && self.multiplier > 1.0 {
            self.multiplier
        } else {
            1.0
        }
    }

    fn raw_delay_ms(&self, retry: u32) -> f64 {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.base_delay_ms as f64 * self.effective_multiplier().powi(exponent)
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    fn base_delay(&self, retry: u32) -> Duration {
        clamp_ms(self.raw_delay_ms(retry), self.max_delay_ms)
    }

    /// Delay with jitter drawn from `rng` when enabled.
    pub fn next_delay<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let raw = self.raw_delay_ms(retry);
        let spread = raw * (self.effective_multiplier() - 1.0) / 2.0;
        if !self.jitter || spread < 1.0 {
            return self.base_delay(retry);
        }
        clamp_ms(raw + rng.gen_range(0.0..spread), self.max_delay_ms)
    }
}

fn clamp_ms(value: f64, max_ms: u64) -> Duration {
    let capped = if value.is_finite() {
        value.min(max_ms as f64)
    } else {
        max_ms as f64
    };
    Duration::from_millis(capped.max(0.0) as u64)
}
