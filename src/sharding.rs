//! Sharding: keyed items partitioned deterministically across handlers.
//!
//! Each `(key, value)` item is assigned to `hash(key) % handler_count`, a
//! pure, deterministic mapping for a fixed handler count. Items within one
//! shard run sequentially and in their submitted relative order; the shards
//! themselves run concurrently. A failing item yields an outcome with its
//! error set and aborts neither its shard nor the others.

use crate::KeyedOutcome;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

type ShardHandlerFn<K, V, T, E> =
    Arc<dyn Fn(K, V) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Hash-partitioned concurrent processing of keyed items.
pub struct Sharding<K, V, T, E> {
    handlers: Vec<ShardHandlerFn<K, V, T, E>>,
}

impl<K, V, T, E> std::fmt::Debug for Sharding<K, V, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sharding").field("shards", &self.handlers.len()).finish()
    }
}

impl<K, V, T, E> Sharding<K, V, T, E>
where
    K: Hash + Clone + Send + 'static,
    V: Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start building with the first shard handler; a sharding over zero
    /// handlers is meaningless, so one is required up front.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(K, V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self { handlers: Vec::new() }.handler(handler)
    }

    /// Add another shard handler. Changing the handler count changes the
    /// key-to-shard mapping.
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(K, V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.handlers.push(Arc::new(move |key, value| handler(key, value).boxed()));
        self
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deterministic shard assignment: the same key always maps to the same
    /// shard for a fixed handler count.
    pub fn shard_index(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.handlers.len() as u64) as usize
    }

    /// Partition the items by shard and process every non-empty shard
    /// concurrently, sequentially within each shard.
    ///
    /// Returns a flattened outcome per item, tagged with its key; a failing
    /// item is recorded, never dropped.
    pub async fn process(&self, items: Vec<(K, V)>) -> Vec<KeyedOutcome<K, T, E>> {
        let item_count = items.len();
        let mut shards: Vec<Vec<(K, V)>> = (0..self.handlers.len()).map(|_| Vec::new()).collect();
        for (key, value) in items {
            let shard = self.shard_index(&key);
            shards[shard].push((key, value));
        }
        tracing::debug!(items = item_count, shards = self.handlers.len(), "sharding items");

        let mut in_flight = FuturesUnordered::new();
        for (shard, batch) in shards.into_iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            let handler = self.handlers[shard].clone();
            in_flight.push(async move {
                let mut results = Vec::with_capacity(batch.len());
                for (key, value) in batch {
                    let result = handler(key.clone(), value).await;
                    if let Err(e) = &result {
                        tracing::warn!(shard, error = %e, "shard item failed");
                    }
                    results.push(KeyedOutcome { key, result });
                }
                tracing::debug!(shard, processed = results.len(), "shard done");
                results
            });
        }

        let mut outcomes = Vec::with_capacity(item_count);
        while let Some(mut shard_results) = in_flight.next().await {
            outcomes.append(&mut shard_results);
        }
        outcomes
    }
}
