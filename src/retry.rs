//! Bounded retry with backoff.
//!
//! Semantics:
//! - `max_attempts` counts total tries (initial call + retries).
//! - Only `PatternError::Inner(E)` values are eligible for retry; other
//!   variants (circuit open, throttled, timeout) return immediately.
//! - `should_retry` decides whether an `Inner` error is retryable.
//! - Backoff computes the delay before each retry; the first retry sleeps the
//!   base delay, and each subsequent one multiplies it by the backoff factor.
//! - Jitter (default `None`) randomizes delays; Sleeper controls how they are
//!   applied (production uses `TokioSleeper`, tests inject `InstantSleeper`
//!   or `TrackingSleeper`).
//! - The number of attempts consumed by the most recent `execute` is
//!   observable afterwards via [`RetryPolicy::attempts`], for diagnostics.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use faultline::{Backoff, PatternError, RetryPolicy};
//!
//! #[derive(Debug)]
//! struct MyErr;
//! impl std::fmt::Display for MyErr { fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "oops") } }
//! impl std::error::Error for MyErr {}
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<MyErr>::builder()
//!     .max_attempts(3)
//!     .backoff(Backoff::exponential(Duration::from_millis(10)))
//!     .build()
//!     .unwrap();
//! let result: Result<(), PatternError<MyErr>> =
//!     policy.execute(|| async { Err(PatternError::Inner(MyErr)) }).await;
//! assert!(result.unwrap_err().is_retry_exhausted());
//! assert_eq!(policy.attempts(), 3);
//! # });
//! ```

use crate::error::MAX_RETRY_FAILURES;
use crate::{Backoff, Jitter, PatternError, Sleeper, TokioSleeper};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retry policy combining backoff, jitter, predicate, and sleeper.
#[derive(Clone)]
pub struct RetryPolicy<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    // Attempts consumed by the most recent execute; clones share the counter.
    last_attempts: Arc<AtomicUsize>,
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &"<sleeper>")
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Attempts consumed by the most recent `execute` call. Reset to zero at
    /// the start of each execution; intended for diagnostics.
    pub fn attempts(&self) -> usize {
        self.last_attempts.load(Ordering::Acquire)
    }

    /// Execute an async operation with retry semantics.
    ///
    /// Returns the first success immediately. After `max_attempts` retryable
    /// failures, returns [`PatternError::RetryExhausted`] carrying the most
    /// recent causes (the last one always included).
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, PatternError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, PatternError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        self.last_attempts.store(0, Ordering::Release);
        let mut failures: VecDeque<E> = VecDeque::new();

        for attempt in 0..self.max_attempts {
            self.last_attempts.store(attempt + 1, Ordering::Release);
            match operation().await {
                Ok(value) => return Ok(value),
                Err(PatternError::Inner(e)) => {
                    if !(self.should_retry)(&e) {
                        return Err(PatternError::Inner(e));
                    }

                    failures.push_back(e);
                    while failures.len() > MAX_RETRY_FAILURES {
                        failures.pop_front();
                    }

                    if attempt + 1 >= self.max_attempts {
                        tracing::warn!(
                            attempts = self.max_attempts,
                            "retry exhausted, giving up"
                        );
                        return Err(PatternError::retry_exhausted(
                            self.max_attempts,
                            failures.into_iter().collect(),
                        ));
                    }

                    // 1-indexed: the first retry sleeps delay(1).
                    let delay = self.jitter.apply(self.backoff.delay(attempt + 1));
                    tracing::debug!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                }
                // Non-Inner errors (CircuitOpen, Throttled, Timeout) are not retried.
                Err(e) => return Err(e),
            }
        }

        // The loop always returns: the final iteration either succeeds or
        // produces RetryExhausted, and max_attempts is validated > 0.
        debug_assert!(false, "retry loop should have returned");
        unreachable!()
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    InvalidMaxAttempts(usize),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create a builder with sane defaults: 3 attempts, exponential backoff
    /// from 1s, no jitter, retry every `Inner` error.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_secs(1)),
            jitter: Jitter::None,
            should_retry: Arc::new(|_| true),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set backoff strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set jitter strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Predicate to decide if an `Inner` error is retryable.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy<E>, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
            last_attempts: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    fn instant_policy(max_attempts: usize) -> RetryPolicy<TestError> {
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .build()
            .expect("valid policy")
    }

    #[test]
    fn rejects_zero_max_attempts() {
        let err = RetryPolicy::<TestError>::builder().max_attempts(0).build().unwrap_err();
        assert_eq!(err, BuildError::InvalidMaxAttempts(0));
    }

    #[tokio::test]
    async fn success_on_first_attempt_executes_once() {
        let policy = instant_policy(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, PatternError<TestError>>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(policy.attempts(), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = instant_policy(5);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        // Fails twice, then succeeds; no further attempts after success.
        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(PatternError::Inner(TestError(format!("transient {}", n))))
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 99);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(policy.attempts(), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let policy = instant_policy(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PatternError::Inner(TestError("always".into())))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_retry_exhausted());
        assert_eq!(err.retry_exhausted_info(), Some((4, 4)));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(policy.attempts(), 4);
    }

    #[tokio::test]
    async fn attempt_counter_resets_between_calls() {
        let policy = instant_policy(3);

        let _ = policy
            .execute(|| async { Err::<(), _>(PatternError::Inner(TestError("x".into()))) })
            .await;
        assert_eq!(policy.attempts(), 3);

        let result = policy.execute(|| async { Ok::<_, PatternError<TestError>>(1) }).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(policy.attempts(), 1);
    }

    #[tokio::test]
    async fn exponential_backoff_sleeps_between_attempts() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::<TestError>::builder()
            .max_attempts(4)
            .backoff(Backoff::exponential(Duration::from_millis(100)))
            .with_sleeper(sleeper.clone())
            .build()
            .expect("valid policy");

        let _ = policy
            .execute(|| async { Err::<(), _>(PatternError::Inner(TestError("x".into()))) })
            .await;

        // 4 attempts means 3 sleeps: base, base*2, base*4.
        assert_eq!(
            sleeper.calls(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
        assert_eq!(sleeper.total(), Duration::from_millis(700));
    }

    #[tokio::test]
    async fn should_retry_false_propagates_cause_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let policy = RetryPolicy::<TestError>::builder()
            .max_attempts(5)
            .with_sleeper(InstantSleeper)
            .should_retry(|e| e.0 != "fatal")
            .build()
            .expect("valid policy");

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PatternError::Inner(TestError("fatal".into())))
                }
            })
            .await;

        match result.unwrap_err() {
            PatternError::Inner(e) => assert_eq!(e.0, "fatal"),
            e => panic!("expected Inner, got {:?}", e),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrapper_errors_are_not_retried() {
        let policy = instant_policy(5);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        // A circuit-open rejection from a nested wrapper must pass through.
        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), PatternError<TestError>>(PatternError::CircuitOpen {
                        failure_count: 3,
                        retry_after: Duration::from_secs(1),
                    })
                }
            })
            .await;

        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_error_keeps_the_last_cause() {
        let policy = instant_policy(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PatternError::Inner(TestError(format!("err-{}", n))))
                }
            })
            .await;

        let err = result.unwrap_err();
        let failures = err.failures().expect("recorded failures");
        assert_eq!(failures.last().unwrap().0, "err-2");
    }
}
