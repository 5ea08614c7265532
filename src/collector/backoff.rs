use std::time::Duration;

use rand::random_range;

use crate::config::TimingConfig;

/// Delay before the next connection attempt.
///
/// With `max == base` (the default) this is the plain constant
/// delay. Otherwise the delay doubles per consecutive failed attempt
/// up to `max`; `jitter` picks uniformly in `[delay/2, delay]`.
///
/// The attempt counter resets once a session reaches Connected.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    jitter: bool,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter,
            attempt: 0,
        }
    }

    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self::new(
            Duration::from_secs(timing.reconnect_delay_secs),
            Duration::from_secs(timing.reconnect_max_delay_secs),
            timing.reconnect_jitter,
        )
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt.min(16));
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        if !self.jitter {
            return delay;
        }

        let full = delay.as_millis() as u64;
        let half = full / 2;
        Duration::from_millis(random_range(half..=full))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
