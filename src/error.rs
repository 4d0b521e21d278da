//! Error types shared by all patterns
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
/// Cap the number of stored causes inside RetryExhausted to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;
/// Unified error type for all fault-tolerance wrappers.
///
/// `Inner(E)` is the upstream-failure channel: whenever the wrapped operation
/// itself fails, its cause travels through untouched. Every other variant is a
/// wrapper-specific rejection and carries enough context for the caller to
/// decide what to do next (how long to wait, how many attempts were burned).
///
/// Orchestrators ([`crate::FanIn`], [`crate::FanOut`], [`crate::Sharding`])
/// deliberately do not use this type for element failures; they report
/// per-element `Result<T, E>` values instead, so one failing element never
/// fails the whole operation.
#[derive(Debug, Clone)]
pub enum PatternError<E> {
    /// The circuit breaker refused to attempt the call; retry after the
    /// carried duration.
    CircuitOpen { failure_count: usize, retry_after: Duration },
    /// The sliding-window rate limit was exceeded; no underlying call was made.
    Throttled { capacity: usize, retry_after: Duration },
    /// The caller's waiting bound elapsed. The underlying work is not
    /// guaranteed to have stopped.
    Timeout { elapsed: Duration, limit: Duration },
    /// A promise's `get` gave up waiting. The background task keeps running.
    PromiseTimeout { waited: Duration },
    /// All configured retry attempts failed; the most recent causes are kept.
    RetryExhausted { attempts: usize, failures: Arc<Vec<E>> },
    /// The wrapped operation itself failed.
    Inner(E),
}
impl<E: fmt::Display> fmt::Display for PatternError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { failure_count, retry_after } => {
                write!(
                    f,
                    "circuit breaker open ({} consecutive failures, retry after {:?})",
                    failure_count, retry_after
                )
            }
            Self::Throttled { capacity, retry_after } => {
                write!(f, "rate limit of {} calls exceeded, retry after {:?}", capacity, retry_after)
            }
            Self::Timeout { elapsed, limit } => {
                write!(f, "gave up waiting after {:?} (limit: {:?})", elapsed, limit)
            }
            Self::PromiseTimeout { waited } => {
                write!(f, "promise not ready after waiting {:?}", waited)
            }
            Self::RetryExhausted { attempts, failures } => {
                let recorded = failures.len();
                let truncated_note = if recorded < *attempts {
                    format!(" (recorded last {} failures)", recorded)
                } else {
                    String::new()
                };
                if let Some(last) = failures.last() {
                    write!(
                        f,
                        "retry exhausted after {} attempts{}; last error: {}",
                        attempts, truncated_note, last
                    )
                } else {
                    write!(
                        f,
                        "retry exhausted after {} attempts{}; no recorded failures",
                        attempts, truncated_note
                    )
                }
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}
impl<E: std::error::Error + 'static> std::error::Error for PatternError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { failures, .. } => {
                failures.last().map(|e| e as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}
impl<E> PatternError<E> {
    /// Construct a `RetryExhausted` variant while enforcing the
    /// `MAX_RETRY_FAILURES` cap by keeping the most recent causes.
    pub fn retry_exhausted(attempts: usize, failures: Vec<E>) -> Self {
        let trimmed = if failures.len() > MAX_RETRY_FAILURES {
            failures.into_iter().rev().take(MAX_RETRY_FAILURES).rev().collect()
        } else {
            failures
        };
        PatternError::RetryExhausted { attempts, failures: Arc::new(trimmed) }
    }
    /// Check if this error is a timeout (either kind).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::PromiseTimeout { .. })
    }
    /// Check if this error is a circuit-breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
    /// Check if this error is a rate-limit rejection.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
    /// Check if this error is due to retry exhaustion.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }
    /// Check if this error wraps an upstream failure.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Get the inner error if this is an Inner variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// How long the caller should wait before trying again, for rejections
    /// that carry that hint (`CircuitOpen`, `Throttled`).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } | Self::Throttled { retry_after, .. } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
    /// Access timeout details as (elapsed, limit) if this is a `Timeout`.
    pub fn timeout_details(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Timeout { elapsed, limit } => Some((*elapsed, *limit)),
            _ => None,
        }
    }
    /// Access retry exhaustion info as (attempts, recorded_failures).
    pub fn retry_exhausted_info(&self) -> Option<(usize, usize)> {
        match self {
            Self::RetryExhausted { attempts, failures } => Some((*attempts, failures.len())),
            _ => None,
        }
    }
    /// Access all recorded causes for RetryExhausted, if present.
    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::RetryExhausted { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }
}
