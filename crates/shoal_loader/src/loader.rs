// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The coalescing loader and its builder.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use shoal_cache::{BoundedCache, CacheMap, UnboundedCache};
use tracing::{debug, trace};

use crate::{BatchFn, Error, Result};

/// A shared handle to one in-flight or memoized load.
///
/// The loader memoizes these futures rather than resolved values, so a
/// cache hit and joining an in-flight fetch are the same operation: await
/// the shared future, clone the result.
pub type LoadFuture<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Normalizes lookup keys before caching and deduplication.
pub type CacheKeyFn<K> = Arc<dyn Fn(&K) -> K + Send + Sync>;

/// One enqueued-but-not-yet-dispatched batch.
struct OpenBatch<K, V> {
    /// Original keys in enqueue order, handed to the batch function.
    keys: Vec<K>,
    /// The cache key for each position in `keys`.
    cache_keys: Vec<K>,
    /// One waiter per unique cache key.
    waiters: HashMap<K, Waiter<V>>,
}

impl<K, V> OpenBatch<K, V> {
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            cache_keys: Vec::new(),
            waiters: HashMap::new(),
        }
    }
}

struct Waiter<V> {
    tx: oneshot::Sender<Result<V>>,
    shared: LoadFuture<V>,
}

struct State<K, V> {
    cache: Box<dyn CacheMap<K, LoadFuture<V>>>,
    open: Option<OpenBatch<K, V>>,
}

struct Inner<K, V> {
    batch_fn: Box<dyn BatchFn<K, V>>,
    batch: bool,
    cache: bool,
    cache_key_fn: Option<CacheKeyFn<K>>,
    state: Mutex<State<K, V>>,
}

/// A batched, memoizing key/value loader.
///
/// A `Loader` wraps a [`BatchFn`] and provides:
///
/// - **Coalescing**: every load issued before the current task suspends is
///   merged into a single batch-fetch invocation, with at most one
///   underlying fetch per unique key per tick. Concurrent loads for the
///   same uncached key share one in-flight fetch.
/// - **Memoization**: results — including absent values such as a cached
///   `None` — are retained in a [`CacheMap`] until explicitly invalidated
///   or evicted, so repeated loads never re-fetch.
/// - **Invalidation**: [`clear`](Loader::clear) drops one key,
///   [`clear_all`](Loader::clear_all) drops everything; both are idempotent.
///
/// Loads dispatch on the ambient tokio runtime; calling
/// [`load`](Loader::load) outside one panics.
///
/// # Examples
///
/// ```
/// use shoal_loader::Loader;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let loader = Loader::builder(|keys: Vec<String>| async move {
///     let results = keys.into_iter().map(|key| Ok(key.len())).collect();
///     Ok(results)
/// })
/// .build();
///
/// // Same-tick loads for distinct keys coalesce into one batch fetch.
/// let (a, b) = tokio::join!(loader.load("alpha".to_owned()), loader.load("be".to_owned()));
/// assert_eq!(a.unwrap(), 5);
/// assert_eq!(b.unwrap(), 2);
///
/// // A repeated load is served from the cache.
/// assert_eq!(loader.load("alpha".to_owned()).await.unwrap(), 5);
/// # });
/// ```
pub struct Loader<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Loader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> std::fmt::Debug for Loader<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("batch", &self.inner.batch)
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl<K, V> Loader<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a loader with default configuration: batching and caching
    /// enabled, bounded cache with the default capacity.
    #[must_use]
    pub fn new(batch_fn: impl BatchFn<K, V>) -> Self {
        Self::builder(batch_fn).build()
    }

    /// Creates a builder for configuring batching, caching, and the cache map.
    #[must_use]
    pub fn builder(batch_fn: impl BatchFn<K, V>) -> LoaderBuilder<K, V> {
        LoaderBuilder::new(Box::new(batch_fn))
    }

    /// Loads the value for `key`.
    ///
    /// A memoized result — including a memoized absent value — is returned
    /// without invoking the batch function. Otherwise the key joins the
    /// current batch; the batch dispatches asynchronously after the current
    /// synchronous execution completes, so loads issued back-to-back in one
    /// tick are combined into a single fetch.
    ///
    /// # Errors
    ///
    /// Propagates the batch function's failure for this key. Failed loads
    /// are not memoized; a subsequent load re-fetches.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub async fn load(&self, key: K) -> Result<V> {
        self.submit(key).await
    }

    /// Loads values for every key, preserving input order.
    ///
    /// Equivalent to issuing one [`load`](Loader::load) per key in the same
    /// tick: all keys are submitted before the first await, so uncached keys
    /// share a single batch fetch.
    ///
    /// # Errors
    ///
    /// Returns the first per-key failure encountered, in key order.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub async fn load_many(&self, keys: impl IntoIterator<Item = K>) -> Result<Vec<V>> {
        let pending: Vec<LoadFuture<V>> = keys.into_iter().map(|key| self.submit(key)).collect();
        let results = futures::future::join_all(pending).await;
        results.into_iter().collect()
    }

    /// Removes `key` from the cache, reporting whether an entry was present.
    ///
    /// Future loads for the key re-fetch. An in-flight fetch for the key is
    /// unaffected: its waiters still receive the result, but the result is
    /// no longer memoized for later calls.
    pub fn clear(&self, key: &K) -> bool {
        let cache_key = self.inner.cache_key(key);
        self.inner.state.lock().cache.remove(&cache_key)
    }

    /// Empties the cache entirely.
    pub fn clear_all(&self) {
        self.inner.state.lock().cache.clear();
    }

    /// Number of memoized entries, including in-flight loads.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    /// Enqueues a load and returns its shared future.
    ///
    /// Runs synchronously: callers that submit several keys before awaiting
    /// are guaranteed to land them in the same batch.
    fn submit(&self, key: K) -> LoadFuture<V> {
        let cache_key = self.inner.cache_key(&key);
        let mut state = self.inner.state.lock();

        if self.inner.cache {
            if let Some(shared) = state.cache.get(&cache_key) {
                return shared.clone();
            }
        }

        // The key may already sit in the open batch: either the cache is
        // disabled, or the entry was cleared after enqueueing. Reuse the
        // pending fetch instead of requesting the key twice.
        if let Some(open) = state.open.as_ref() {
            if let Some(waiter) = open.waiters.get(&cache_key) {
                let shared = waiter.shared.clone();
                if self.inner.cache {
                    state.cache.insert(cache_key, shared.clone());
                }
                return shared;
            }
        }

        let (tx, rx) = oneshot::channel();
        let shared: LoadFuture<V> = rx.map(|received| received.unwrap_or(Err(Error::Abandoned))).boxed().shared();

        if self.inner.cache {
            state.cache.insert(cache_key.clone(), shared.clone());
        }

        let waiter = Waiter { tx, shared: shared.clone() };

        if self.inner.batch {
            if let Some(open) = state.open.as_mut() {
                open.keys.push(key);
                open.cache_keys.push(cache_key.clone());
                open.waiters.insert(cache_key, waiter);
            } else {
                let mut open = OpenBatch::new();
                open.keys.push(key);
                open.cache_keys.push(cache_key.clone());
                open.waiters.insert(cache_key, waiter);
                state.open = Some(open);
                drop(state);

                let inner = Arc::clone(&self.inner);
                drop(tokio::spawn(async move {
                    // Yield once so every load issued in the current tick
                    // joins the batch before it dispatches.
                    tokio::task::yield_now().await;
                    let open = inner.state.lock().open.take();
                    if let Some(open) = open {
                        inner.dispatch(open).await;
                    }
                }));
            }
        } else {
            let mut single = OpenBatch::new();
            single.keys.push(key);
            single.cache_keys.push(cache_key.clone());
            single.waiters.insert(cache_key, waiter);
            drop(state);

            let inner = Arc::clone(&self.inner);
            drop(tokio::spawn(async move {
                inner.dispatch(single).await;
            }));
        }

        shared
    }
}

impl<K, V> Inner<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn cache_key(&self, key: &K) -> K {
        match &self.cache_key_fn {
            Some(cache_key_fn) => cache_key_fn(key),
            None => key.clone(),
        }
    }

    async fn dispatch(&self, batch: OpenBatch<K, V>) {
        let OpenBatch { keys, cache_keys, mut waiters } = batch;
        let expected = keys.len();
        trace!(keys = expected, "dispatching batch fetch");

        match self.batch_fn.fetch(keys).await {
            Ok(results) if results.len() == expected => {
                for (cache_key, result) in cache_keys.iter().zip(results) {
                    self.complete(cache_key, result, &mut waiters);
                }
            }
            Ok(results) => {
                let error = Error::BatchShape {
                    expected,
                    actual: results.len(),
                };
                debug!(%error, "batch fetch broke its contract");
                for cache_key in &cache_keys {
                    self.complete(cache_key, Err(error.clone()), &mut waiters);
                }
            }
            Err(error) => {
                debug!(%error, "batch fetch failed");
                for cache_key in &cache_keys {
                    self.complete(cache_key, Err(error.clone()), &mut waiters);
                }
            }
        }
    }

    fn complete(&self, cache_key: &K, result: Result<V>, waiters: &mut HashMap<K, Waiter<V>>) {
        let Some(waiter) = waiters.remove(cache_key) else {
            return;
        };
        if result.is_err() && self.cache {
            self.evict_if_current(cache_key, &waiter.shared);
        }
        // Delivery can only fail when every waiter has gone away.
        let _ = waiter.tx.send(result);
    }

    /// Drops the failed entry unless a newer pending load replaced it.
    fn evict_if_current(&self, cache_key: &K, shared: &LoadFuture<V>) {
        let mut state = self.state.lock();
        let current = state.cache.get(cache_key).is_some_and(|cached| cached.ptr_eq(shared));
        if current {
            let _ = state.cache.remove(cache_key);
        }
    }
}

/// Builder for configuring a [`Loader`].
///
/// The defaults match the common case: batching on, caching on, a bounded
/// LRU cache with the default capacity and no expiry.
///
/// # Examples
///
/// ```
/// use shoal_loader::Loader;
/// use std::time::Duration;
///
/// let loader = Loader::builder(|keys: Vec<String>| async move {
///     let results = keys.into_iter().map(Ok).collect();
///     Ok(results)
/// })
/// .cache_capacity(100)
/// .cache_ttl(Duration::from_secs(300))
/// .build();
/// # let _: shoal_loader::Loader<String, String> = loader;
/// ```
#[must_use]
pub struct LoaderBuilder<K, V> {
    batch_fn: Box<dyn BatchFn<K, V>>,
    batch: bool,
    cache: bool,
    cache_key_fn: Option<CacheKeyFn<K>>,
    cache_capacity: Option<usize>,
    cache_ttl: Option<Duration>,
    unbounded: bool,
    cache_map: Option<Box<dyn CacheMap<K, LoadFuture<V>>>>,
}

impl<K, V> std::fmt::Debug for LoaderBuilder<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderBuilder")
            .field("batch", &self.batch)
            .field("cache", &self.cache)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl", &self.cache_ttl)
            .field("unbounded", &self.unbounded)
            .finish_non_exhaustive()
    }
}

impl<K, V> LoaderBuilder<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(batch_fn: Box<dyn BatchFn<K, V>>) -> Self {
        Self {
            batch_fn,
            batch: true,
            cache: true,
            cache_key_fn: None,
            cache_capacity: None,
            cache_ttl: None,
            unbounded: false,
            cache_map: None,
        }
    }

    /// Enables or disables same-tick batching.
    ///
    /// With batching disabled, every uncached load dispatches immediately as
    /// a batch of one.
    pub fn batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    /// Enables or disables memoization.
    ///
    /// With caching disabled, loads within one open batch still share a
    /// single fetch, but nothing is retained once the batch resolves.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Sets a function that normalizes keys before caching.
    ///
    /// The batch function still receives the original keys.
    pub fn cache_key_fn(mut self, cache_key_fn: impl Fn(&K) -> K + Send + Sync + 'static) -> Self {
        self.cache_key_fn = Some(Arc::new(cache_key_fn));
        self
    }

    /// Sets the bounded cache's capacity.
    ///
    /// Ignored when a custom cache map or the unbounded cache is selected.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Sets a time-to-live for memoized entries.
    ///
    /// Ignored when a custom cache map or the unbounded cache is selected.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Memoizes into a growth-unbounded map instead of the bounded cache.
    pub fn unbounded_cache(mut self) -> Self {
        self.unbounded = true;
        self
    }

    /// Memoizes into a caller-supplied [`CacheMap`] implementation.
    pub fn cache_map(mut self, cache_map: Box<dyn CacheMap<K, LoadFuture<V>>>) -> Self {
        self.cache_map = Some(cache_map);
        self
    }

    /// Builds the configured loader.
    #[must_use]
    pub fn build(self) -> Loader<K, V> {
        let cache_map = self.cache_map.unwrap_or_else(|| {
            if self.unbounded {
                Box::new(UnboundedCache::new())
            } else {
                let mut builder = BoundedCache::builder();
                if let Some(capacity) = self.cache_capacity {
                    builder = builder.capacity(capacity);
                }
                if let Some(ttl) = self.cache_ttl {
                    builder = builder.ttl(ttl);
                }
                Box::new(builder.build())
            }
        });

        Loader {
            inner: Arc::new(Inner {
                batch_fn: self.batch_fn,
                batch: self.batch,
                cache: self.cache,
                cache_key_fn: self.cache_key_fn,
                state: Mutex::new(State { cache: cache_map, open: None }),
            }),
        }
    }
}
