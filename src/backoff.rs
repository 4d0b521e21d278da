//! Backoff strategies for retry policies.
//!
//! Attempt semantics: attempt index `0` is the initial call (no delay), and
//! retries start at `attempt = 1`. Exponential backoff multiplies the base
//! delay by a configurable factor after every failed attempt (default 2.0).
//! Delays saturate at a documented maximum to avoid overflow.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use faultline::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::from_millis(0)); // initial call
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(6), Duration::from_secs(2)); // capped
//! ```

use std::fmt;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffError {
    ConstantDoesNotSupportMax,
    ConstantDoesNotSupportFactor,
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
    FactorTooSmall { provided: f64 },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportMax => {
                write!(f, "with_max is only valid for Linear or Exponential backoff")
            }
            BackoffError::ConstantDoesNotSupportFactor => {
                write!(f, "with_factor is only valid for Exponential backoff")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
            BackoffError::FactorTooSmall { provided } => {
                write!(f, "multiplier must be >= 1.0 (got {})", provided)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Constant { delay: Duration },
    Linear { base: Duration, max: Option<Duration> },
    Exponential { base: Duration, factor: f64, max: Option<Duration> },
}

/// Delay schedule applied between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    /// Delay grows by `base` each retry.
    pub fn linear(base: Duration) -> Self {
        Self { kind: BackoffKind::Linear { base, max: None } }
    }

    /// Delay multiplied by a factor (default 2.0) after each failed attempt.
    pub fn exponential(base: Duration) -> Self {
        Self { kind: BackoffKind::Exponential { base, factor: 2.0, max: None } }
    }

    /// Override the exponential multiplier; must be >= 1.0.
    pub fn with_factor(mut self, factor: f64) -> Result<Self, BackoffError> {
        if factor < 1.0 || !factor.is_finite() {
            return Err(BackoffError::FactorTooSmall { provided: factor });
        }
        match &mut self.kind {
            BackoffKind::Exponential { factor: existing, .. } => {
                *existing = factor;
                Ok(self)
            }
            _ => Err(BackoffError::ConstantDoesNotSupportFactor),
        }
    }

    /// Set a maximum delay for the backoff (linear or exponential).
    /// Returns an error if called on `Constant`, if `max` is zero, or if `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Exponential { max: existing, base, .. }
            | BackoffKind::Linear { max: existing, base } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Calculate the delay for a given attempt number (0-based; 0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match &self.kind {
            BackoffKind::Constant { delay } => *delay,
            BackoffKind::Linear { base, max } => {
                let attempt_u32 = attempt.min(u32::MAX as usize) as u32;
                let linear = base.checked_mul(attempt_u32).unwrap_or(MAX_BACKOFF);
                let capped = max.map(|m| linear.min(m)).unwrap_or(linear);
                capped.min(MAX_BACKOFF)
            }
            BackoffKind::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
                let secs = base.as_secs_f64() * factor.powi(exponent);
                let exp_delay = if secs.is_finite() && secs < MAX_BACKOFF.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    MAX_BACKOFF
                };
                let capped = max.map(|m| exp_delay.min(m)).unwrap_or(exp_delay);
                capped.min(MAX_BACKOFF)
            }
        }
    }
}
