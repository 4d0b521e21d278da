//! Timeout: bounds how long the caller waits, not how long the work runs.

use crate::PatternError;
use std::future::Future;
use std::time::{Duration, Instant};

/// Best-effort deadline on waiting for an async operation.
///
/// The operation runs on a background tokio task. If it finishes within the
/// limit its own outcome is propagated unchanged; otherwise the caller gets
/// [`PatternError::Timeout`] and the abandoned task keeps running to
/// completion in the background, its result discarded. This is a bound on
/// the caller's patience, **not** forced cancellation of the work.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    limit: Duration,
}

impl TimeoutPolicy {
    /// Create a timeout policy. Panics if the limit is zero or `Duration::MAX`.
    pub fn new(limit: Duration) -> Self {
        assert!(
            limit > Duration::ZERO && limit < Duration::MAX,
            "timeout limit must be non-zero and finite",
        );
        Self { limit }
    }

    /// Inspect the configured limit.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Run the operation on a background task and wait up to the limit.
    ///
    /// # Errors
    /// Returns [`PatternError::Timeout`] if the limit elapses first. The
    /// underlying task is *not* stopped; only the wait is abandoned. A panic
    /// inside the operation resumes on the caller.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, PatternError<E>>
    where
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, PatternError<E>>> + Send + 'static,
        Op: FnOnce() -> Fut + Send,
    {
        let start = Instant::now();
        let handle = tokio::spawn(operation());

        match tokio::time::timeout(self.limit, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => match join_error.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                // We hold the only abort handle, so cancellation cannot
                // happen; treat it as the wait being abandoned anyway.
                Err(_) => {
                    Err(PatternError::Timeout { elapsed: start.elapsed(), limit: self.limit })
                }
            },
            Err(_) => {
                tracing::warn!(
                    limit_ms = self.limit.as_millis() as u64,
                    "gave up waiting; background work continues"
                );
                Err(PatternError::Timeout { elapsed: start.elapsed(), limit: self.limit })
            }
        }
    }
}
