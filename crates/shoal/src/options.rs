// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration for loaders created through an entity.

use std::sync::Arc;
use std::time::Duration;

use shoal_store::Document;

use crate::{Error, Result};

/// Derives the cache key a write selector (or inserted document) affects.
///
/// Returning `None` signals "no deterministic key": the entity falls back to
/// invalidating the loader's entire cache, which is always safe.
pub type SelectorKeyFn = Arc<dyn Fn(&Document) -> Option<String> + Send + Sync>;

/// Configuration for a loader created with
/// [`Entity::create_loader`](crate::Entity::create_loader).
///
/// Extends the loader-level settings (batching, caching, cache sizing) with
/// the invalidation registration the entity maintains: whether the loader is
/// cleared on inserts, on updates, and how a write maps to the cache key it
/// affects. Cache sizing options left unset fall back to the entity's
/// defaults.
///
/// Registering `clear_on_update` without a [`selector_key_fn`] is rejected
/// when the loader is created, before any write occurs.
///
/// [`selector_key_fn`]: LoaderOptions::selector_key_fn
///
/// # Examples
///
/// ```
/// use shoal::LoaderOptions;
/// use shoal_store::string_id;
///
/// let options = LoaderOptions::new()
///     .clear_on_insert(true)
///     .clear_on_update(true)
///     .selector_key_fn(|selector| string_id(selector).map(str::to_owned));
///
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone, Default)]
#[must_use]
pub struct LoaderOptions {
    pub(crate) no_batch: bool,
    pub(crate) no_cache: bool,
    pub(crate) cache_key_fn: Option<Arc<dyn Fn(&String) -> String + Send + Sync>>,
    pub(crate) cache_capacity: Option<usize>,
    pub(crate) cache_ttl: Option<Duration>,
    pub(crate) unbounded_cache: bool,
    pub(crate) clear_on_insert: bool,
    pub(crate) clear_on_update: bool,
    pub(crate) selector_key_fn: Option<SelectorKeyFn>,
}

impl std::fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("batch", &!self.no_batch)
            .field("cache", &!self.no_cache)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl", &self.cache_ttl)
            .field("unbounded_cache", &self.unbounded_cache)
            .field("clear_on_insert", &self.clear_on_insert)
            .field("clear_on_update", &self.clear_on_update)
            .field("selector_key_fn", &self.selector_key_fn.is_some())
            .finish_non_exhaustive()
    }
}

impl LoaderOptions {
    /// Creates options with batching and caching enabled and no
    /// invalidation registration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables same-tick batching.
    pub fn batch(mut self, batch: bool) -> Self {
        self.no_batch = !batch;
        self
    }

    /// Enables or disables memoization.
    pub fn cache(mut self, cache: bool) -> Self {
        self.no_cache = !cache;
        self
    }

    /// Sets a function that normalizes keys before caching.
    pub fn cache_key_fn(mut self, cache_key_fn: impl Fn(&String) -> String + Send + Sync + 'static) -> Self {
        self.cache_key_fn = Some(Arc::new(cache_key_fn));
        self
    }

    /// Sets the bounded cache's capacity for this loader.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Sets a time-to-live for this loader's memoized entries.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Memoizes into a growth-unbounded map instead of the bounded cache.
    pub fn unbounded_cache(mut self) -> Self {
        self.unbounded_cache = true;
        self
    }

    /// Registers the loader for invalidation when documents are inserted or
    /// deleted.
    pub fn clear_on_insert(mut self, clear_on_insert: bool) -> Self {
        self.clear_on_insert = clear_on_insert;
        self
    }

    /// Registers the loader for invalidation when documents are updated.
    ///
    /// Requires a [`selector_key_fn`](LoaderOptions::selector_key_fn);
    /// creating the loader fails otherwise.
    pub fn clear_on_update(mut self, clear_on_update: bool) -> Self {
        self.clear_on_update = clear_on_update;
        self
    }

    /// Sets the function that maps a write to the cache key it affects.
    ///
    /// The function receives the inserted document (for inserts and deletes)
    /// or the write selector (for updates); returning `None` invalidates the
    /// loader's whole cache.
    pub fn selector_key_fn(mut self, selector_key_fn: impl Fn(&Document) -> Option<String> + Send + Sync + 'static) -> Self {
        self.selector_key_fn = Some(Arc::new(selector_key_fn));
        self
    }

    /// Checks that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSelectorKeyFn`] when `clear_on_update` is
    /// requested without a selector key function.
    pub fn validate(&self) -> Result<()> {
        if self.clear_on_update && self.selector_key_fn.is_none() {
            return Err(Error::MissingSelectorKeyFn);
        }
        Ok(())
    }
}
