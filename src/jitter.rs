//! Jitter strategies to prevent thundering herd on correlated retries.

use rand::Rng;
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone)]
pub enum Jitter {
    /// No jitter, use the exact backoff delay.
    None,
    /// Full jitter: random between 0 and delay.
    Full,
    /// Equal jitter: random between delay/2 and delay.
    Equal,
    /// Decorrelated jitter: AWS-style, `random(base, delay * 3)` capped at `max`.
    Decorrelated { base: Duration, max: Duration },
    /// Uniform jitter bounded by a percentage of the delay, e.g. `pct: 0.1` for ±10%.
    Bounded { pct: f64 },
}

impl Jitter {
    pub fn full() -> Self {
        Jitter::Full
    }

    pub fn equal() -> Self {
        Jitter::Equal
    }

    pub fn decorrelated(base: Duration, max: Duration) -> Self {
        Jitter::Decorrelated { base, max }
    }

    /// `pct` is clamped to `[0.0, 1.0]`.
    pub fn bounded(pct: f64) -> Self {
        Jitter::Bounded { pct: pct.clamp(0.0, 1.0) }
    }

    /// Applies jitter to a delay using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rand::rng())
    }

    /// Applies jitter with a caller-supplied RNG, for deterministic tests.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = delay.as_millis() as u64;
                if millis == 0 {
                    return Duration::from_millis(0);
                }
                Duration::from_millis(rng.random_range(0..=millis))
            }
            Jitter::Equal => {
                let millis = delay.as_millis() as u64;
                if millis == 0 {
                    return Duration::from_millis(0);
                }
                let half = millis / 2;
                Duration::from_millis(rng.random_range(half..=millis))
            }
            Jitter::Decorrelated { base, max } => {
                let base_millis = base.as_millis() as u64;
                let delay_millis = delay.as_millis() as u64;
                let max_millis = max.as_millis() as u64;

                let upper = delay_millis.saturating_mul(3);
                let range_max = upper.min(max_millis);

                if base_millis >= range_max {
                    return Duration::from_millis(base_millis);
                }

                Duration::from_millis(rng.random_range(base_millis..=range_max))
            }
            Jitter::Bounded { pct } => {
                let millis = delay.as_millis() as f64;
                if millis == 0.0 {
                    return Duration::from_millis(0);
                }
                let spread = millis * pct;
                let low = (millis - spread).max(0.0) as u64;
                let high = (millis + spread) as u64;
                if low >= high {
                    return delay;
                }
                Duration::from_millis(rng.random_range(low..=high))
            }
        }
    }
}
