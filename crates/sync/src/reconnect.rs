//! Reconnect pacing for the push channel.
//!
//! [`Backoff`] hands out one wait per failed or lost connection: the
//! first is [`ReconnectConfig::initial_delay`], each further one grows by
//! [`ReconnectConfig::multiplier`] up to [`ReconnectConfig::max_delay`],
//! and every wait is spread by a random jitter. A successful connection
//! resets it.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Relative spread applied to each wait, in `[0, 1)`. `0.2` means +/-20%.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Backoff state across consecutive reconnect attempts.
#[derive(Debug)]
pub struct Backoff {
    config: ReconnectConfig,
    base: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            base: config.initial_delay,
            failures: 0,
            config,
        }
    }

    /// Waits handed out since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// The wait before the next attempt; advances the schedule.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.spread(self.base);
        self.failures += 1;
        let grown = self.base.mul_f64(self.config.multiplier.max(1.0));
        self.base = grown.min(self.config.max_delay);
        wait
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.base = self.config.initial_delay;
        self.failures = 0;
    }

    fn spread(&self, delay: Duration) -> Duration {
        let jitter = self.config.jitter.clamp(0.0, 0.99);
        if jitter == 0.0 || delay.is_zero() {
            return delay;
        }
        delay.mul_f64(rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter)))
    }
}
