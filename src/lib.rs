#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Faultline
//!
//! Resilience and concurrency-orchestration primitives for async Rust.
//!
//! ## Fault-tolerance wrappers
//!
//! Each wrapper guards a single async operation:
//!
//! - [`CircuitBreaker`]: trips open after consecutive failures, probes
//!   recovery after a cooldown
//! - [`RetryPolicy`]: bounded retries with backoff and optional jitter
//! - [`Throttle`]: sliding-log rate limiting
//! - [`Debounce`]: coalesces bursts of calls into one delayed execution
//! - [`TimeoutPolicy`]: bounds how long the caller waits, best-effort
//!
//! ## Orchestrators
//!
//! Each orchestrator runs a collection of operations concurrently and
//! reports per-element outcomes rather than failing as a whole:
//!
//! - [`FanIn`]: N independent sources, one outcome set
//! - [`FanOut`]: one payload, N handlers
//! - [`Sharding`]: keyed items partitioned deterministically across handlers
//! - [`Promise`]: a one-shot handle on a background task
//!
//! Wrappers compose (a retry around a timeout around a raw call), but the
//! toolkit never composes them implicitly: that is the integrator's call.
//!
//! ## Quick start
//!
//! ```rust
//! use faultline::{Backoff, PatternError, RetryPolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let policy = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .backoff(Backoff::exponential(Duration::from_millis(100)))
//!         .build()
//!         .unwrap();
//!
//!     let result = policy.execute(|| async {
//!         Ok::<_, PatternError<std::io::Error>>(())
//!     }).await;
//!     assert!(result.is_ok());
//! }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod debounce;
pub mod error;
pub mod fan_in;
pub mod fan_out;
pub mod jitter;
pub mod outcome;
pub mod promise;
pub mod retry;
pub mod sharding;
pub mod sleeper;
pub mod throttle;
pub mod timeout;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use debounce::Debounce;
pub use error::PatternError;
pub use fan_in::FanIn;
pub use fan_out::FanOut;
pub use jitter::Jitter;
pub use outcome::{KeyedOutcome, Outcome};
pub use promise::Promise;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sharding::Sharding;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use throttle::{Throttle, ThrottleError};
pub use timeout::TimeoutPolicy;
