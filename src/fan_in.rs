//! Fan-in: many independent sources, one outcome set.

use crate::Outcome;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

type SourceFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Runs N zero-argument sources concurrently and collects every result.
///
/// A failing source never aborts the others and there is no implicit retry:
/// `collect` always returns exactly one [`Outcome`] per source, each index
/// appearing exactly once, ordered by completion rather than submission.
pub struct FanIn<T, E> {
    sources: Vec<SourceFn<T, E>>,
}

impl<T, E> Default for FanIn<T, E> {
    // No bounds here, so an empty fan-in exists for any parameterization.
    fn default() -> Self {
        Self { sources: Vec::new() }
    }
}

impl<T, E> std::fmt::Debug for FanIn<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanIn").field("sources", &self.sources.len()).finish()
    }
}

impl<T, E> FanIn<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    /// Add a source; its index is its position in insertion order.
    pub fn source<F, Fut>(mut self, source: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.sources.push(Arc::new(move || source().boxed()));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Run every source concurrently and wait for all of them.
    ///
    /// Outcomes arrive in completion order; use their `index` (or
    /// [`crate::outcome::sort_by_index`]) to restore submission order.
    pub async fn collect(&self) -> Vec<Outcome<T, E>> {
        let mut in_flight = FuturesUnordered::new();
        for (index, source) in self.sources.iter().enumerate() {
            let fut = source();
            in_flight.push(async move { (index, fut.await) });
        }

        let mut outcomes = Vec::with_capacity(self.sources.len());
        while let Some((index, result)) = in_flight.next().await {
            match &result {
                Ok(_) => tracing::debug!(index, "fan-in source completed"),
                Err(e) => tracing::warn!(index, error = %e, "fan-in source failed"),
            }
            outcomes.push(Outcome { index, result });
        }
        tracing::debug!(collected = outcomes.len(), sources = self.sources.len(), "fan-in done");
        outcomes
    }
}
