//! Sliding-log rate limiter.
//!
//! Keeps an insertion-ordered log of call timestamps and allows at most
//! `capacity` calls per `period`. Stale entries are pruned lazily on each
//! check, so the log never holds more than `capacity` live timestamps. A
//! rejected call makes no underlying invocation and carries how long the
//! caller should wait before the oldest retained call ages out.
//!
//! The log sits behind a mutex: a single `Throttle` instance is safe to share
//! between concurrent callers (clones share the same log).

use crate::{clock::Clock, clock::MonotonicClock, PatternError};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Errors produced when validating throttle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleError {
    /// Capacity must be > 0.
    InvalidCapacity {
        /// Value provided by caller.
        provided: usize,
    },
    /// Period must be > 0.
    InvalidPeriod(Duration),
}

impl std::fmt::Display for ThrottleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThrottleError::InvalidCapacity { provided } => {
                write!(f, "capacity must be > 0 (got {})", provided)
            }
            ThrottleError::InvalidPeriod(period) => {
                write!(f, "period must be > 0 (got {:?})", period)
            }
        }
    }
}

impl std::error::Error for ThrottleError {}

/// Sliding-log rate limiter allowing `capacity` calls per `period`.
///
/// Clones share the same log via `Arc`, so all handles count against the
/// same budget.
#[derive(Debug, Clone)]
pub struct Throttle {
    capacity: usize,
    period: Duration,
    log: Arc<Mutex<VecDeque<u64>>>,
    clock: Arc<dyn Clock>,
}

impl Throttle {
    /// Create a throttle allowing `capacity` calls per `period`.
    pub fn new(capacity: usize, period: Duration) -> Result<Self, ThrottleError> {
        if capacity == 0 {
            return Err(ThrottleError::InvalidCapacity { provided: 0 });
        }
        if period == Duration::ZERO {
            return Err(ThrottleError::InvalidPeriod(period));
        }
        Ok(Self {
            capacity,
            period,
            log: Arc::new(Mutex::new(VecDeque::new())),
            clock: Arc::new(MonotonicClock::default()),
        })
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Executes the operation if the rate limit allows it.
    ///
    /// # Errors
    /// Returns [`PatternError::Throttled`], carrying the wait until the
    /// oldest retained call ages out of the window, when `capacity` calls
    /// have already been made within `period`. The underlying operation is
    /// not invoked in that case.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, PatternError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, PatternError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let now = self.clock.now_millis();
        {
            let mut log = self.log.lock().unwrap();
            Self::prune(&mut log, now, self.period);

            if log.len() >= self.capacity {
                // Oldest entry exists whenever len >= capacity >= 1.
                let oldest = *log.front().unwrap_or(&now);
                let period = u64::try_from(self.period.as_millis()).unwrap_or(u64::MAX);
                let retry_after =
                    Duration::from_millis(period.saturating_sub(now.saturating_sub(oldest)));
                tracing::warn!(
                    occupied = log.len(),
                    capacity = self.capacity,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "throttled"
                );
                return Err(PatternError::Throttled { capacity: self.capacity, retry_after });
            }

            log.push_back(now);
            tracing::debug!(occupied = log.len(), capacity = self.capacity, "call allowed");
        }

        operation().await
    }

    /// Calls still available in the current window.
    pub fn remaining_calls(&self) -> usize {
        let now = self.clock.now_millis();
        let mut log = self.log.lock().unwrap();
        Self::prune(&mut log, now, self.period);
        self.capacity - log.len()
    }

    /// Clear the call log unconditionally.
    pub fn reset(&self) {
        self.log.lock().unwrap().clear();
        tracing::debug!("throttle reset");
    }

    // Retained invariant: every kept timestamp satisfies now - t < period.
    fn prune(log: &mut VecDeque<u64>, now: u64, period: Duration) {
        let period = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        while let Some(&oldest) = log.front() {
            if now.saturating_sub(oldest) >= period {
                log.pop_front();
            } else {
                break;
            }
        }
    }
}
