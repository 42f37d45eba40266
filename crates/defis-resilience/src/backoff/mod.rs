//! Exponential backoff with a cooldown once attempts are exhausted.

use defis_config::ReconnectConfig;
use std::time::Duration;

/// Backoff policy configuration.
///
/// The delay after the `n`-th consecutive failure is
/// `base_delay * factor^(n - 1)`, capped at `max_delay`. Once `max_attempts`
/// failures have accumulated, callers pause for `cooldown` and start over.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Failed attempts before the cooldown kicks in.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Multiplier applied for every further failure.
    pub factor: f64,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Pause once `max_attempts` is reached.
    pub cooldown: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            factor: 1.5,
            max_delay: Duration::from_secs(30),
            cooldown: Duration::from_secs(60),
        }
    }
}

impl From<&ReconnectConfig> for BackoffPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            factor: config.backoff_factor,
            max_delay: config.max_delay(),
            cooldown: config.cooldown(),
        }
    }
}

impl BackoffPolicy {
    /// Calculates the delay that follows the given failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let millis = self.base_delay.as_millis() as f64 * self.factor.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Returns `true` once `attempts` failures call for the cooldown.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
