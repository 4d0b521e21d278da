//! Promise: a one-shot handle on a background task.
//!
//! The task is bound at construction and launched explicitly with
//! [`Promise::start`]. `get` waits for the ready signal with a bound on the
//! caller's patience. `cancel` is advisory only: once the task is running
//! nothing stops it, and the handle says so out loud rather than pretending.

use crate::PatternError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

struct PromiseShared<T, E> {
    slot: Mutex<Option<Result<T, E>>>,
    // Fired exactly once, by the worker, after the slot is filled.
    ready: watch::Sender<bool>,
    started: AtomicBool,
    cancelled: AtomicBool,
}

/// One-shot asynchronous handle over a bound task.
pub struct Promise<T, E> {
    task: Mutex<Option<BoxFuture<'static, Result<T, E>>>>,
    shared: Arc<PromiseShared<T, E>>,
}

impl<T, E> std::fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("started", &self.shared.started.load(Ordering::Acquire))
            .field("ready", &*self.shared.ready.borrow())
            .finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Bind a task to a new promise without starting it.
    pub fn new<Fut>(task: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (ready, _) = watch::channel(false);
        Self {
            task: Mutex::new(Some(task.boxed())),
            shared: Arc::new(PromiseShared {
                slot: Mutex::new(None),
                ready,
                started: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Launch the bound task on a background tokio task, exactly once.
    ///
    /// Subsequent calls are no-ops; a cancelled promise refuses to start.
    /// Returns immediately in all cases.
    pub fn start(&self) {
        if self.shared.cancelled.load(Ordering::Acquire) {
            tracing::warn!("promise was cancelled before start; not launching");
            return;
        }
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return; // already launched
        }
        let Some(task) = self.task.lock().unwrap().take() else {
            return;
        };
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let result = task.await;
            match &result {
                Ok(_) => tracing::debug!("promise completed"),
                Err(_) => tracing::debug!("promise completed with failure"),
            }
            *shared.slot.lock().unwrap() = Some(result);
            shared.ready.send_replace(true);
        });
    }

    /// Wait until the task finishes or `timeout` elapses, whichever first.
    ///
    /// Returns the task's value, re-raises its failure as
    /// [`PatternError::Inner`], or fails with [`PatternError::PromiseTimeout`]
    /// if the ready signal has not fired in time, which says nothing about
    /// whether the background task eventually finishes.
    pub async fn get(&self, timeout: Duration) -> Result<T, PatternError<E>> {
        let mut ready = self.shared.ready.subscribe();
        if !*ready.borrow() {
            let waited = tokio::time::timeout(timeout, ready.wait_for(|r| *r)).await;
            match waited {
                Ok(Ok(_)) => {}
                // The sender lives in our shared state, so it cannot drop
                // while this handle exists; treat it as not-ready anyway.
                Ok(Err(_)) | Err(_) => {
                    return Err(PatternError::PromiseTimeout { waited: timeout });
                }
            }
        }

        match self.shared.slot.lock().unwrap().clone() {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(PatternError::Inner(e)),
            None => Err(PatternError::PromiseTimeout { waited: timeout }),
        }
    }

    /// Non-blocking readiness poll.
    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    /// Advisory cancellation.
    ///
    /// A task that has not been started will never launch. A running task
    /// cannot be stopped; this only signals intent, and the warning below
    /// makes the limitation explicit rather than pretending success.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        if self.is_ready() {
            tracing::warn!("promise already completed; cancel has no effect");
        } else if self.shared.started.load(Ordering::Acquire) {
            tracing::warn!("promise already running; the task will not be stopped");
        } else {
            tracing::debug!("promise cancelled before start");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test]
    async fn get_returns_the_task_value() {
        let promise = Promise::new(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, TestError>(42)
        });
        promise.start();
        assert_eq!(promise.get(Duration::from_secs(1)).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn get_reraises_task_failure() {
        let promise: Promise<u32, TestError> =
            Promise::new(async { Err(TestError("task failed".into())) });
        promise.start();

        match promise.get(Duration::from_secs(1)).await.unwrap_err() {
            PatternError::Inner(e) => assert_eq!(e.0, "task failed"),
            e => panic!("expected Inner, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn get_times_out_while_task_is_still_running() {
        let promise = Promise::new(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, TestError>(1)
        });
        promise.start();

        let err = promise.get(Duration::from_millis(30)).await.unwrap_err();
        assert!(matches!(err, PatternError::PromiseTimeout { .. }));

        // The task is unaffected by the abandoned wait.
        assert_eq!(promise.get(Duration::from_secs(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn is_ready_polls_without_blocking() {
        let promise = Promise::new(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, TestError>(7)
        });
        promise.start();
        assert!(!promise.is_ready());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(promise.is_ready());
    }

    #[tokio::test]
    async fn get_can_be_called_repeatedly_once_ready() {
        let promise = Promise::new(async { Ok::<_, TestError>(9) });
        promise.start();
        assert_eq!(promise.get(Duration::from_secs(1)).await.unwrap(), 9);
        assert_eq!(promise.get(Duration::from_secs(1)).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let launches = Arc::new(AtomicUsize::new(0));
        let launches_clone = launches.clone();
        let promise = Promise::new(async move {
            launches_clone.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>(())
        });

        promise.start();
        promise.start();
        promise.start();
        let _ = promise.get(Duration::from_secs(1)).await;
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_before_start_prevents_launch() {
        let launches = Arc::new(AtomicUsize::new(0));
        let launches_clone = launches.clone();
        let promise = Promise::new(async move {
            launches_clone.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>(())
        });

        promise.cancel();
        promise.start();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(launches.load(Ordering::SeqCst), 0);
        assert!(!promise.is_ready());
        let err = promise.get(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, PatternError::PromiseTimeout { .. }));
    }

    #[tokio::test]
    async fn debug_reflects_lifecycle() {
        let promise = Promise::new(async { Ok::<_, TestError>(1) });
        assert_eq!(format!("{:?}", promise), "Promise { started: false, ready: false }");

        promise.start();
        let _ = promise.get(Duration::from_secs(1)).await;
        assert_eq!(format!("{:?}", promise), "Promise { started: true, ready: true }");
    }

    #[tokio::test]
    async fn cancel_after_start_does_not_stop_the_task() {
        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = completed.clone();
        let promise = Promise::new(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            completed_clone.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>(())
        });

        promise.start();
        promise.cancel(); // advisory only
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}
