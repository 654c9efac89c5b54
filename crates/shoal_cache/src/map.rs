// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The pluggable cache-map trait and its unbounded implementation.

use std::collections::HashMap;
use std::hash::Hash;

/// A synchronous key/value store a loader memoizes results in.
///
/// Implementations decide their own retention policy; the trait only fixes
/// the contract the loader relies on:
///
/// - [`get`](CacheMap::get) refreshes the entry's recency where the
///   implementation tracks one, and treats expired entries as absent.
/// - [`remove`](CacheMap::remove) reports whether the key was actually
///   present, so callers can branch on it in diagnostics and tests.
///
/// Access is serialized by the caller; implementations take `&mut self` and
/// never lock internally.
pub trait CacheMap<K, V>: Send {
    /// Returns the cached value for `key`, refreshing its recency.
    fn get(&mut self, key: &K) -> Option<&V>;

    /// Inserts or replaces the value for `key`.
    fn insert(&mut self, key: K, value: V);

    /// Removes the value for `key`, reporting whether it was present.
    fn remove(&mut self, key: &K) -> bool;

    /// Drops every entry.
    fn clear(&mut self);

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Returns `true` when no entries are cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A growth-unbounded [`CacheMap`] backed by a hash map.
///
/// Entries persist until explicitly removed or cleared. Use this when the
/// key space is small and bounded by construction; otherwise prefer
/// [`BoundedCache`](crate::BoundedCache).
///
/// # Examples
///
/// ```
/// use shoal_cache::{CacheMap, UnboundedCache};
///
/// let mut cache = UnboundedCache::new();
/// cache.insert("key", 42);
///
/// assert_eq!(cache.get(&"key"), Some(&42));
/// assert!(cache.remove(&"key"));
/// assert!(!cache.remove(&"key"));
/// ```
#[derive(Clone, Debug)]
pub struct UnboundedCache<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for UnboundedCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> UnboundedCache<K, V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<K, V> CacheMap<K, V> for UnboundedCache<K, V>
where
    K: Eq + Hash + Send,
    V: Send,
{
    fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: K, value: V) {
        let _ = self.entries.insert(key, value);
    }

    fn remove(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
