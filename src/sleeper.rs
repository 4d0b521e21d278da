//! Injectable waiting, the counterpart of [`crate::clock`] for delays.
//!
//! Retry backoff goes through this trait so tests can observe or skip the
//! sleeps instead of paying for them.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Something that can wait for a duration.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

/// Test sleeper that resolves immediately, discarding the duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

/// Test sleeper that records every requested delay without waiting. Clones
/// share the recording, so the policy under test can hold one handle while
/// the test inspects another.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async {})
    }
}

impl Sleeper for TrackingSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.calls.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in request order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.calls.lock().unwrap().iter().sum()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}
