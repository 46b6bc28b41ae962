//! Exponential delay schedule with jitter.
//!
//! Throttles successive distinct downloads; it never retries anything. Each
//! call to [`Backoff::next_sleep`] yields `current ± jitter` (floored at zero)
//! and then doubles `current`, capped at the configured maximum.

use rand::Rng;
use std::time::Duration;

use crate::config::BackoffConfig;

#[derive(Debug, Clone)]
pub struct Backoff {
    current: f64,
    jitter: f64,
    max: f64,
}

impl Backoff {
    /// Fresh schedule starting at the base delay.
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            current: config.base_delay_secs,
            jitter: config.jitter_secs,
            max: config.max_delay_secs,
        }
    }

    /// Delay (seconds) the next sleep is centred on.
    #[cfg(test)]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Draw the next sleep and advance the schedule.
    pub fn next_sleep<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let offset = if self.jitter > 0.0 && self.jitter.is_finite() {
            rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let secs = (self.current + offset).max(0.0);
        self.current = (self.current * 2.0).min(self.max);
        // Saturate instead of panicking on values that bypassed validation.
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
