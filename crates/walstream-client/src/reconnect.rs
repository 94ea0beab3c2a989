//! Reconnect timing.

use std::time::Duration;

use rand::Rng;

use walstream_core::config::{ReconnectConfig, ReconnectStrategy};

/// Delay strategy between failed connection attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `initial * multiplier^attempt`, capped at `max`, plus up to `jitter`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        jitter: Duration,
    },
}

/// Reconnection policy. Retries are unbounded; only the delay varies.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub backoff: Backoff,
    /// A session that stayed up at least this long resets the attempt counter.
    pub reset_after: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(2))
    }
}

impl ReconnectPolicy {
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(delay),
            reset_after: Duration::from_mins(1),
        }
    }

    pub const fn exponential(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            backoff: Backoff::Exponential {
                initial,
                max,
                multiplier,
                jitter: Duration::ZERO,
            },
            reset_after: Duration::from_mins(1),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Exponential delays never drop below `initial`: multipliers under 1.0
    /// are treated as 1.0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let factor = multiplier.max(1.0).powi(exponent);
                let below_cap = initial.as_secs_f64() * factor < max.as_secs_f64();
                let base = if factor.is_finite() && below_cap {
                    initial.mul_f64(factor)
                } else {
                    (*max).max(*initial)
                };
                base + jitter_duration(*jitter)
            }
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        let delay = Duration::from_millis(config.delay_ms);
        match config.strategy {
            ReconnectStrategy::Fixed => Self::fixed(delay),
            ReconnectStrategy::Exponential => Self {
                backoff: Backoff::Exponential {
                    initial: delay,
                    max: Duration::from_millis(config.max_delay_ms),
                    multiplier: config.multiplier,
                    jitter: Duration::from_millis(config.jitter_ms),
                },
                ..Self::default()
            },
        }
    }
}

fn jitter_duration(max: Duration) -> Duration {
    let limit_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if limit_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=limit_ms))
}
