//! Circuit breaker with lock-free state tracking.
//!
//! State machine: `Closed` (normal) → `Open` after `threshold` consecutive
//! failures → `HalfOpen` once `cooldown` has elapsed since the last *executed*
//! attempt → back to `Closed` on a successful probe, or `Open` again on a
//! failed one. The breaker cycles indefinitely; there is no terminal state.
//!
//! Cooldown policy: only real attempts move the cooldown clock. A call
//! rejected while the circuit is open leaves the clock untouched, so rapid
//! polling can never extend the open period indefinitely.

use crate::{clock::Clock, clock::MonotonicClock, PatternError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Rejecting calls until the cooldown elapses.
    Open,
    /// Probe mode: exactly one call is allowed to test recovery.
    HalfOpen,
}

impl CircuitState {
    fn to_u8(self) -> u8 {
        match self {
            CircuitState::Closed => STATE_CLOSED,
            CircuitState::Open => STATE_OPEN,
            CircuitState::HalfOpen => STATE_HALF_OPEN,
        }
    }

    fn from_u8(v: u8) -> CircuitState {
        match v {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            // Only the three constants above are ever stored.
            _ => CircuitState::Closed,
        }
    }
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerError {
    /// Failure threshold must be > 0.
    InvalidThreshold {
        /// Value provided by caller.
        provided: usize,
    },
    /// Cooldown must be > 0.
    InvalidCooldown(Duration),
}

impl std::fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::InvalidThreshold { provided } => {
                write!(f, "threshold must be > 0 (got {})", provided)
            }
            CircuitBreakerError::InvalidCooldown(cooldown) => {
                write!(f, "cooldown must be > 0 (got {:?})", cooldown)
            }
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

#[derive(Debug)]
struct BreakerShared {
    state: AtomicU8,
    failure_count: AtomicUsize,
    // Timestamp of the last attempt that actually executed. Rejections while
    // open never touch this, so the cooldown runs from the last real attempt.
    last_attempt_millis: AtomicU64,
    probing: AtomicBool,
}

/// Circuit breaker guarding an async operation.
///
/// Clones share the same underlying state via `Arc`, so all handles observe
/// and affect the same circuit lifecycle. The breaker is process-local and
/// in-memory; nothing is persisted or coordinated across instances.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    shared: Arc<BreakerShared>,
    threshold: usize,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a circuit breaker that opens after `threshold` consecutive
    /// failures and stays open for at least `cooldown` before probing.
    ///
    /// # Examples
    /// ```
    /// use faultline::CircuitBreaker;
    /// use std::time::Duration;
    /// let breaker = CircuitBreaker::new(5, Duration::from_secs(30)).unwrap();
    /// ```
    pub fn new(threshold: usize, cooldown: Duration) -> Result<Self, CircuitBreakerError> {
        if threshold == 0 {
            return Err(CircuitBreakerError::InvalidThreshold { provided: 0 });
        }
        if cooldown == Duration::ZERO {
            return Err(CircuitBreakerError::InvalidCooldown(cooldown));
        }
        Ok(Self {
            shared: Arc::new(BreakerShared {
                state: AtomicU8::new(CircuitState::Closed.to_u8()),
                failure_count: AtomicUsize::new(0),
                last_attempt_millis: AtomicU64::new(0),
                probing: AtomicBool::new(false),
            }),
            threshold,
            cooldown,
            clock: Arc::new(MonotonicClock::default()),
        })
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Current breaker state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Consecutive failures observed since the last success or close.
    pub fn failure_count(&self) -> usize {
        self.shared.failure_count.load(Ordering::Acquire)
    }

    /// Executes the provided async operation under circuit-breaker protection.
    ///
    /// # Behavior
    /// - **Closed**: runs the operation. A success resets the failure count;
    ///   consecutive failures increment it, tripping the circuit at the
    ///   configured threshold.
    /// - **Open**: rejects with [`PatternError::CircuitOpen`] (carrying the
    ///   remaining wait) until the cooldown has elapsed since the last
    ///   executed attempt; rejected calls do not restart the cooldown.
    /// - **HalfOpen**: admits exactly one probe. Success closes the circuit
    ///   and resets the failure count; failure reopens it and restarts the
    ///   cooldown clock.
    ///
    /// # Errors
    /// Returns `PatternError::CircuitOpen` when the call is rejected, or
    /// whatever the operation itself returned (typically
    /// `PatternError::Inner(E)`) after the state bookkeeping above.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, PatternError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, PatternError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        // Releases the probe slot even if the operation panics.
        struct ProbeGuard<'a> {
            shared: &'a BreakerShared,
        }
        impl Drop for ProbeGuard<'_> {
            fn drop(&mut self) {
                self.shared.probing.store(false, Ordering::Release);
            }
        }
        let mut guard: Option<ProbeGuard<'_>> = None;

        loop {
            match self.state() {
                CircuitState::Closed => break,
                CircuitState::Open => {
                    let remaining = self.remaining_cooldown();
                    if remaining > Duration::ZERO {
                        return Err(PatternError::CircuitOpen {
                            failure_count: self.failure_count(),
                            retry_after: remaining,
                        });
                    }
                    // Cooldown elapsed; race to become the probe.
                    match self.shared.state.compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            // The probing flag, not the CAS, decides who probes:
                            // a caller already in the half-open arm may have
                            // claimed the slot between our exchange and here.
                            if self.shared.probing.swap(true, Ordering::AcqRel) {
                                return Err(PatternError::CircuitOpen {
                                    failure_count: self.failure_count(),
                                    retry_after: self.remaining_cooldown(),
                                });
                            }
                            guard = Some(ProbeGuard { shared: &self.shared });
                            tracing::info!("circuit breaker: open -> half-open, probing");
                            break;
                        }
                        Err(STATE_HALF_OPEN) => continue, // lost the race, re-check
                        Err(_) => break, // someone closed it; proceed normally
                    }
                }
                CircuitState::HalfOpen => {
                    if self.shared.probing.swap(true, Ordering::AcqRel) {
                        // Another caller holds the probe slot.
                        return Err(PatternError::CircuitOpen {
                            failure_count: self.failure_count(),
                            retry_after: self.remaining_cooldown(),
                        });
                    }
                    guard = Some(ProbeGuard { shared: &self.shared });
                    tracing::debug!("circuit breaker: admitted half-open probe");
                    break;
                }
            }
        }

        let result = operation().await;

        // Every executed attempt moves the cooldown clock.
        self.shared.last_attempt_millis.store(self.clock.now_millis(), Ordering::Release);

        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        drop(guard);

        result
    }

    /// Time left before a probe is permitted, zero once the cooldown elapsed.
    fn remaining_cooldown(&self) -> Duration {
        let last = self.shared.last_attempt_millis.load(Ordering::Acquire);
        let elapsed = self.clock.now_millis().saturating_sub(last);
        let cooldown = u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(cooldown.saturating_sub(elapsed))
    }

    /// Any success while closed resets the counter, so only *consecutive*
    /// failures trip the breaker.
    fn on_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                if self
                    .shared
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_CLOSED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.shared.failure_count.store(0, Ordering::Release);
                    tracing::info!("circuit breaker: probe succeeded -> closed");
                }
            }
            CircuitState::Closed => {
                self.shared.failure_count.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let failures = self.shared.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        match self.state() {
            CircuitState::HalfOpen => {
                if self
                    .shared
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    tracing::warn!(failures, "circuit breaker: probe failed -> open");
                }
            }
            CircuitState::Closed => {
                if failures >= self.threshold
                    && self
                        .shared
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    tracing::error!(failures, threshold = self.threshold, "circuit breaker -> open");
                }
            }
            CircuitState::Open => {}
        }
    }
}
