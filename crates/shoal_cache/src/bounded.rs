// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A fixed-capacity cache with least-recently-used eviction.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use crate::CacheMap;

/// The capacity used when none is configured.
const DEFAULT_CAPACITY: usize = 500;

struct Slot<V> {
    value: V,
    stamp: u64,
    expires_at: Option<Instant>,
}

/// A fixed-capacity key/value cache with strict LRU eviction and optional
/// time-to-live.
///
/// When an insertion would exceed capacity, the least-recently-used entry is
/// evicted first; both reads and writes refresh recency. With a TTL
/// configured, an entry read after expiry is treated as absent and purged.
/// Expired entries that are never read again are reclaimed by ordinary LRU
/// eviction.
///
/// Recency is tracked with a monotonically increasing use-stamp per entry
/// and a stamp-ordered index; the entry map and the index always describe
/// the same set of keys.
///
/// # Examples
///
/// ```
/// use shoal_cache::BoundedCache;
/// use std::time::Duration;
///
/// let mut cache = BoundedCache::builder()
///     .capacity(100)
///     .ttl(Duration::from_secs(60))
///     .build();
///
/// cache.insert("key".to_string(), 42);
/// assert_eq!(cache.get(&"key".to_string()), Some(&42));
/// assert!(cache.remove(&"key".to_string()));
/// ```
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Option<Duration>,
    entries: HashMap<K, Slot<V>>,
    recency: BTreeMap<u64, K>,
    next_stamp: u64,
}

impl<V: std::fmt::Debug> std::fmt::Debug for Slot<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("value", &self.value).field("stamp", &self.stamp).finish_non_exhaustive()
    }
}

impl<K, V> Default for BoundedCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates a cache with the default capacity and no expiry.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a cache with the given capacity and no expiry.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Creates a builder for configuring capacity and time-to-live.
    #[must_use]
    pub fn builder() -> BoundedCacheBuilder<K, V> {
        BoundedCacheBuilder::new()
    }

    fn from_builder(builder: &BoundedCacheBuilder<K, V>) -> Self {
        assert!(builder.capacity > 0, "capacity must be at least 1");
        Self {
            capacity: builder.capacity,
            ttl: builder.ttl,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_stamp: 0,
        }
    }

    /// The maximum number of entries the cache will hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The configured time-to-live, if any.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of stored entries.
    ///
    /// Entries past expiry that have not yet been purged are counted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached value for `key`, refreshing its recency.
    ///
    /// An entry read after its expiry is purged and reported absent.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.is_expired(key) {
            self.purge(key);
            return None;
        }

        let stamp = self.bump();
        let slot = self.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut slot.stamp, stamp);
        self.recency.remove(&previous);
        self.recency.insert(stamp, key.clone());

        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// When the insertion would exceed capacity, the least-recently-used
    /// entry is evicted first. Replacing an existing key refreshes its
    /// recency and restarts its expiry.
    pub fn insert(&mut self, key: K, value: V) {
        let stamp = self.bump();
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);

        if let Some(slot) = self.entries.get_mut(&key) {
            let previous = std::mem::replace(&mut slot.stamp, stamp);
            slot.value = value;
            slot.expires_at = expires_at;
            self.recency.remove(&previous);
            self.recency.insert(stamp, key);
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.recency.insert(stamp, key.clone());
        self.entries.insert(key, Slot { value, stamp, expires_at });
    }

    /// Removes the entry for `key`, reporting whether it was present.
    ///
    /// An entry past its expiry is purged but reported absent, matching
    /// what [`get`](Self::get) would have said about it.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(slot) = self.entries.remove(key) else {
            return false;
        };
        self.recency.remove(&slot.stamp);
        !slot.expires_at.is_some_and(|at| at <= Instant::now())
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn bump(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn is_expired(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .and_then(|slot| slot.expires_at)
            .is_some_and(|at| at <= Instant::now())
    }

    fn purge(&mut self, key: &K) {
        if let Some(slot) = self.entries.remove(key) {
            self.recency.remove(&slot.stamp);
        }
    }

    fn evict_lru(&mut self) {
        if let Some((_, key)) = self.recency.pop_first() {
            self.entries.remove(&key);
        }
        debug_assert_eq!(self.entries.len(), self.recency.len());
    }
}

impl<K, V> CacheMap<K, V> for BoundedCache<K, V>
where
    K: Clone + Eq + Hash + Send,
    V: Send,
{
    fn get(&mut self, key: &K) -> Option<&V> {
        Self::get(self, key)
    }

    fn insert(&mut self, key: K, value: V) {
        Self::insert(self, key, value);
    }

    fn remove(&mut self, key: &K) -> bool {
        Self::remove(self, key)
    }

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn len(&self) -> usize {
        Self::len(self)
    }
}

/// Builder for configuring a [`BoundedCache`].
///
/// # Examples
///
/// ```
/// use shoal_cache::BoundedCache;
/// use std::time::Duration;
///
/// let cache = BoundedCache::<String, i32>::builder()
///     .capacity(1000)
///     .ttl(Duration::from_secs(300))
///     .build();
///
/// assert_eq!(cache.capacity(), 1000);
/// ```
#[derive(Debug)]
pub struct BoundedCacheBuilder<K, V> {
    capacity: usize,
    ttl: Option<Duration>,
    _phantom: std::marker::PhantomData<(K, V)>,
}

impl<K, V> Default for BoundedCacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> BoundedCacheBuilder<K, V> {
    /// Creates a builder with the default capacity and no expiry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: None,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Sets the maximum number of entries.
    ///
    /// Must be at least 1; [`build`](Self::build) panics otherwise.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets a uniform time-to-live for every entry.
    ///
    /// An entry read after this duration from its insertion is treated as
    /// absent and purged.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Builds the configured cache.
    ///
    /// # Panics
    ///
    /// Panics if the configured capacity is 0.
    #[must_use]
    pub fn build(self) -> BoundedCache<K, V>
    where
        K: Clone + Eq + Hash,
    {
        BoundedCache::from_builder(&self)
    }
}
