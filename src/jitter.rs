//! Jitter strategies to prevent thundering herds.
//!
//! When to use which strategy:
//! - `None`: deterministic retries; the default, since predictable backoff is
//!   what most callers of this toolkit test against.
//! - `Full`: uniform in `[0, delay]`, spreads load the most.
//! - `Equal`: uniform in `[delay/2, delay]`, keeps a floor while adding
//!   randomness.
//!
//! Millisecond conversions saturate to `u64::MAX` to avoid panics on very
//! large durations. Deterministic RNGs can be injected via `apply_with_rng`.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// No jitter - use the exact backoff delay.
    #[default]
    None,
    /// Full jitter: random between 0 and delay.
    Full,
    /// Equal jitter: random between delay/2 and delay.
    Equal,
}

impl Jitter {
    /// Create a full jitter strategy.
    pub fn full() -> Self {
        Jitter::Full
    }

    /// Create an equal jitter strategy.
    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Apply jitter to a delay duration.
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_with_rng(delay, &mut rng)
    }

    /// Apply jitter with a caller-supplied RNG (for deterministic tests).
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = Self::as_millis_saturated(delay);
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.random_range(0..=millis))
            }
            Jitter::Equal => {
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.random_range(millis / 2..=millis))
            }
        }
    }

    fn as_millis_saturated(duration: Duration) -> u64 {
        duration.as_millis().try_into().unwrap_or(u64::MAX)
    }
}
