//! Fan-out: one payload, many handlers.

use crate::Outcome;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

type HandlerFn<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Distributes a single payload to N handlers concurrently.
///
/// The aggregation contract matches [`crate::FanIn`]: one [`Outcome`] per
/// handler, every index exactly once, completion order, no short-circuit on
/// handler failure.
pub struct FanOut<A, T, E> {
    handlers: Vec<HandlerFn<A, T, E>>,
}

impl<A, T, E> Default for FanOut<A, T, E> {
    // No bounds here, so an empty fan-out exists for any parameterization.
    fn default() -> Self {
        Self { handlers: Vec::new() }
    }
}

impl<A, T, E> std::fmt::Debug for FanOut<A, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut").field("handlers", &self.handlers.len()).finish()
    }
}

impl<A, T, E> FanOut<A, T, E>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Add a handler; its index is its position in insertion order.
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.handlers.push(Arc::new(move |payload| handler(payload).boxed()));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Hand a clone of the payload to every handler concurrently and wait
    /// for all of them.
    pub async fn distribute(&self, payload: A) -> Vec<Outcome<T, E>> {
        let mut in_flight = FuturesUnordered::new();
        for (index, handler) in self.handlers.iter().enumerate() {
            let fut = handler(payload.clone());
            in_flight.push(async move { (index, fut.await) });
        }

        let mut outcomes = Vec::with_capacity(self.handlers.len());
        while let Some((index, result)) = in_flight.next().await {
            match &result {
                Ok(_) => tracing::debug!(index, "fan-out handler completed"),
                Err(e) => tracing::warn!(index, error = %e, "fan-out handler failed"),
            }
            outcomes.push(Outcome { index, result });
        }
        tracing::debug!(handlers = self.handlers.len(), "fan-out done");
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test]
    async fn every_handler_receives_the_payload() {
        let fan_out = FanOut::new()
            .handler(|n: u32| async move { Ok::<_, TestError>(n + 1) })
            .handler(|n: u32| async move { Ok(n * 2) })
            .handler(|n: u32| async move { Ok(n * n) });

        let mut outcomes = fan_out.distribute(4).await;
        crate::outcome::sort_by_index(&mut outcomes);

        assert_eq!(outcomes[0].result, Ok(5));
        assert_eq!(outcomes[1].result, Ok(8));
        assert_eq!(outcomes[2].result, Ok(16));
    }

    #[tokio::test]
    async fn partial_failure_yields_complete_outcome_set() {
        let fan_out = FanOut::new()
            .handler(|_: String| async { Ok::<_, TestError>("ok".to_string()) })
            .handler(|_: String| async { Err(TestError("handler down".into())) })
            .handler(|_: String| async { Err(TestError("also down".into())) });

        let outcomes = fan_out.distribute("payload".to_string()).await;
        assert_eq!(outcomes.len(), 3);

        let indices: HashSet<usize> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, HashSet::from([0, 1, 2]));
        assert_eq!(outcomes.iter().filter(|o| o.is_err()).count(), 2);
    }

    #[tokio::test]
    async fn handlers_run_concurrently() {
        let mut fan_out = FanOut::new();
        for _ in 0..4 {
            fan_out = fan_out.handler(|n: u32| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, TestError>(n)
            });
        }

        let start = Instant::now();
        let outcomes = fan_out.distribute(1).await;
        assert_eq!(outcomes.len(), 4);
        assert!(start.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn empty_fan_out_returns_empty_set() {
        let fan_out: FanOut<u32, u32, TestError> = FanOut::new();
        assert!(fan_out.is_empty());
        assert!(fan_out.distribute(1).await.is_empty());
    }

    #[test]
    fn default_and_debug_work_for_non_send_payloads() {
        // Rc is not Send, so none of the bounded methods apply here.
        let fan_out: FanOut<std::rc::Rc<u32>, u32, std::io::Error> = FanOut::default();
        assert_eq!(format!("{:?}", fan_out), "FanOut { handlers: 0 }");
    }
}
