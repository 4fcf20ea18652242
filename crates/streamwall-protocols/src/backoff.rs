//! Reconnect backoff.

use rand::Rng;
use std::time::Duration;

/// How long to wait between reconnect attempts.
///
/// The first delay is `min_delay` plus up to `jitter`; every further failed
/// attempt multiplies it by `grow`. Delays never exceed `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
    pub grow: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            jitter: Duration::from_millis(500),
            grow: 1.1,
        }
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_grow(mut self, grow: f64) -> Self {
        self.grow = grow;
        self
    }

    /// Delay before retry number `attempt` (0-based), with `jitter_fraction` in `[0, 1]`.
    pub fn delay_for(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let jitter = self.jitter.mul_f64(jitter_fraction.clamp(0.0, 1.0));
        let grow = if self.grow.is_finite() && self.grow >= 1.0 { self.grow } else { 1.0 };
        let factor = grow.powi(attempt.min(i32::MAX as u32) as i32);
        let base = (self.min_delay + jitter).as_secs_f64() * factor;

        if !base.is_finite() || base >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(base)
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(*self)
    }
}

/// Attempt counter over a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Failed attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, using thread-local randomness for jitter.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    pub fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let delay = self.policy.delay_for(self.attempt, rng.gen::<f64>());
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Forget past failures after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
