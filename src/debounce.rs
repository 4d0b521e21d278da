//! Debounce: coalesces bursts of calls into one delayed execution.
//!
//! Each call (re)schedules a single pending firing `quiet_period` in the
//! future, carrying the latest arguments; only the most recent schedule wins.
//! Once the quiet period elapses and the handler starts running, it is
//! committed; later calls schedule a fresh firing instead of cancelling it.
//!
//! The pending slot is guarded by a mutex, so one `Debounce` instance is safe
//! to share between concurrent callers (clones share the slot).

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

struct PendingSlot {
    // Bumped on every schedule/cancel; a sleeping firing only commits if its
    // generation is still current.
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct DebounceShared<T, E> {
    pending: Mutex<PendingSlot>,
    last_result: Mutex<Option<Result<T, E>>>,
    call_count: AtomicUsize,
}

/// Coalescing delay around a one-argument async handler.
///
/// Clones share the pending slot, the last result, and the call counter.
pub struct Debounce<A, T, E> {
    handler: Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>,
    quiet_period: Duration,
    shared: Arc<DebounceShared<T, E>>,
}

impl<A, T, E> Clone for Debounce<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            quiet_period: self.quiet_period,
            shared: self.shared.clone(),
        }
    }
}

impl<A, T, E> std::fmt::Debug for Debounce<A, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debounce")
            .field("quiet_period", &self.quiet_period)
            .field("call_count", &self.shared.call_count.load(Ordering::Acquire))
            .finish()
    }
}

impl<A, T, E> Debounce<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a debouncer that fires `quiet_period` after the last call.
    pub fn new<F, Fut>(quiet_period: Duration, handler: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |args| handler(args).boxed()),
            quiet_period,
            shared: Arc::new(DebounceShared {
                pending: Mutex::new(PendingSlot { generation: 0, handle: None }),
                last_result: Mutex::new(None),
                call_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Schedule a firing with `args` after the quiet period, cancelling any
    /// not-yet-fired pending invocation. Returns immediately.
    pub fn call(&self, args: A) {
        let calls = self.shared.call_count.fetch_add(1, Ordering::AcqRel) + 1;

        let mut pending = self.shared.pending.lock().unwrap();
        pending.generation += 1;
        let generation = pending.generation;
        if let Some(previous) = pending.handle.take() {
            previous.abort();
            tracing::debug!(calls, "debounce: superseded pending firing");
        }

        let handler = self.handler.clone();
        let shared = self.shared.clone();
        let quiet_period = self.quiet_period;
        pending.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            {
                let mut pending = shared.pending.lock().unwrap();
                if pending.generation != generation {
                    return; // superseded while sleeping
                }
                // Commit: from here on the firing runs to completion.
                pending.handle = None;
            }
            tracing::debug!(quiet_ms = quiet_period.as_millis() as u64, "debounce: firing");
            let result = handler(args).await;
            *shared.last_result.lock().unwrap() = Some(result);
            shared.call_count.store(0, Ordering::Release);
        }));
    }

    /// Cancel the pending timer and return the last *completed* result.
    ///
    /// This does not force early execution: flushing right after `call`
    /// without waiting out the quiet period discards the pending firing and
    /// returns whatever the previous completed firing produced (`None` if
    /// nothing has fired yet).
    pub fn flush(&self) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.discard_pending();
        self.shared.last_result.lock().unwrap().clone()
    }

    /// Discard the pending firing without executing it.
    pub fn cancel(&self) {
        self.discard_pending();
        tracing::debug!("debounce: cancelled");
    }

    /// Calls observed since the last completed firing (diagnostics).
    pub fn call_count(&self) -> usize {
        self.shared.call_count.load(Ordering::Acquire)
    }

    fn discard_pending(&self) {
        let mut pending = self.shared.pending.lock().unwrap();
        pending.generation += 1;
        if let Some(previous) = pending.handle.take() {
            previous.abort();
        }
    }
}
