// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The entity cache manager.
//!
//! An [`Entity`] binds a collection name to a connection provider and owns
//! the loaders that cache reads from that collection: a singleton loader
//! for lookups by identifier, a collection-wide loader, and any custom
//! loaders the caller creates. Writes go through the entity so the loaders
//! registered for the write kind are invalidated first.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shoal_loader::{BatchFn, Loader};
use shoal_store::{
    Collection, ConnectionProvider, Cursor, DeleteResult, Document, FindOptions, InsertManyResult, InsertOneResult,
    Projection, UpdateOptions, UpdateResult, doc, string_id,
};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::{Error, LoaderOptions, Result, SelectorKeyFn};

/// The fixed key the collection-wide loader caches its result under.
const ALL_KEY: &str = "ALL";

/// The invalidation capability an entity holds over each registered loader.
///
/// This is the seam between the entity's watcher lists and the loaders they
/// refer to: the entity never inspects a loader's shape, it only clears.
/// Implemented for every [`Loader`] keyed by `String`.
pub trait LoaderCache: Send + Sync {
    /// Removes one cached key.
    fn clear(&self, key: &str);

    /// Empties the loader's cache.
    fn clear_all(&self);
}

impl<V> LoaderCache for Loader<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clear(&self, key: &str) {
        let _ = Loader::clear(self, &key.to_owned());
    }

    fn clear_all(&self) {
        Loader::clear_all(self);
    }
}

/// One registered (loader, key-derivation) record.
struct Watcher {
    cache: Arc<dyn LoaderCache>,
    selector_key_fn: Option<SelectorKeyFn>,
}

#[derive(Default)]
struct Watchers {
    on_insert: Vec<Watcher>,
    on_update: Vec<Watcher>,
}

#[derive(Clone, Copy, Debug, Default)]
struct CacheDefaults {
    capacity: Option<usize>,
    ttl: Option<Duration>,
    unbounded: bool,
}

/// A cached view of one collection of documents.
///
/// The entity resolves its collection handle lazily, exactly once, and
/// creates its loaders lazily on first cached read. Cached reads are served
/// from the loaders; writes invalidate the loaders registered for the write
/// kind *before* delegating to the collection, so a failed write can only
/// cause a redundant re-fetch, never stale data.
///
/// Identifiers are strings. A write whose selector carries no string `_id`
/// derives no key and falls back to invalidating whole loader caches, which
/// is always safe.
///
/// # Examples
///
/// ```ignore
/// use shoal::{doc, Entity, Projection};
///
/// let entity = Entity::new(provider, "users");
///
/// entity.insert_one(doc! { "_id": "1", "name": "ada", "role": "admin" }).await?;
///
/// // The second read is served from the cache.
/// let user = entity.find_one_cached_by_id("1", None).await?;
/// let user = entity.find_one_cached_by_id("1", None).await?;
///
/// // Updating id "1" invalidates exactly that cache entry.
/// entity.update_one(&doc! { "_id": "1" }, &doc! { "$set": { "role": "user" } }, None).await?;
/// let fresh = entity.find_one_cached_by_id("1", None).await?;
/// ```
pub struct Entity<P: ConnectionProvider> {
    provider: P,
    collection_name: String,
    collection: OnceCell<P::Collection>,
    single: OnceCell<Arc<Loader<String, Option<Document>>>>,
    all: OnceCell<Arc<Loader<String, Vec<Document>>>>,
    watchers: Mutex<Watchers>,
    cache_defaults: CacheDefaults,
}

impl<P: ConnectionProvider> std::fmt::Debug for Entity<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("collection_name", &self.collection_name)
            .field("cache_defaults", &self.cache_defaults)
            .finish_non_exhaustive()
    }
}

impl<P: ConnectionProvider> Entity<P> {
    /// Creates an entity bound to the named collection, with default cache
    /// settings for its loaders.
    pub fn new(provider: P, collection_name: impl Into<String>) -> Self {
        Self::builder(provider, collection_name).build()
    }

    /// Creates a builder for configuring the entity's loader cache defaults.
    pub fn builder(provider: P, collection_name: impl Into<String>) -> EntityBuilder<P> {
        EntityBuilder {
            provider,
            collection_name: collection_name.into(),
            defaults: CacheDefaults::default(),
        }
    }

    /// The name of the collection this entity is bound to.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Resolves the underlying collection handle, connecting on first use.
    ///
    /// The resolution is cached for the entity's lifetime.
    ///
    /// # Errors
    ///
    /// Propagates the provider's connection failure.
    pub async fn collection(&self) -> Result<&P::Collection> {
        self.collection
            .get_or_try_init(|| async {
                debug!(collection = %self.collection_name, "resolving collection handle");
                Ok(self.provider.collection(&self.collection_name).await?)
            })
            .await
    }

    /// Creates a loader and registers it for write invalidation.
    ///
    /// The loader fetches through `fetch` and is cleared on inserts and
    /// deletes when `clear_on_insert` is set, and on updates when
    /// `clear_on_update` is set. Cache sizing options left unset fall back
    /// to the entity's defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSelectorKeyFn`] when `clear_on_update` is
    /// requested without a selector key function. The failure is immediate;
    /// no loader is registered.
    pub fn create_loader<V, F>(&self, fetch: F, options: LoaderOptions) -> Result<Arc<Loader<String, V>>>
    where
        V: Clone + Send + Sync + 'static,
        F: BatchFn<String, V>,
    {
        options.validate()?;

        let mut builder = Loader::builder(fetch).batch(!options.no_batch).cache(!options.no_cache);
        if let Some(cache_key_fn) = &options.cache_key_fn {
            let cache_key_fn = Arc::clone(cache_key_fn);
            builder = builder.cache_key_fn(move |key: &String| cache_key_fn(key));
        }
        if let Some(capacity) = options.cache_capacity.or(self.cache_defaults.capacity) {
            builder = builder.cache_capacity(capacity);
        }
        if let Some(ttl) = options.cache_ttl.or(self.cache_defaults.ttl) {
            builder = builder.cache_ttl(ttl);
        }
        if options.unbounded_cache || self.cache_defaults.unbounded {
            builder = builder.unbounded_cache();
        }
        let loader = Arc::new(builder.build());

        if options.clear_on_insert || options.clear_on_update {
            let cache: Arc<dyn LoaderCache> = loader.clone();
            self.register_loader(cache, options.clear_on_insert, options.clear_on_update, options.selector_key_fn)?;
        }

        Ok(loader)
    }

    /// Registers an externally built loader for write invalidation.
    ///
    /// Use this when a loader needs configuration [`create_loader`] does not
    /// expose, such as a custom cache map: build it with
    /// [`LoaderBuilder`](shoal_loader::LoaderBuilder), then register its
    /// invalidation here.
    ///
    /// [`create_loader`]: Entity::create_loader
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSelectorKeyFn`] when `clear_on_update` is
    /// requested without a selector key function.
    pub fn register_loader(
        &self,
        cache: Arc<dyn LoaderCache>,
        clear_on_insert: bool,
        clear_on_update: bool,
        selector_key_fn: Option<SelectorKeyFn>,
    ) -> Result<()> {
        if clear_on_update && selector_key_fn.is_none() {
            return Err(Error::MissingSelectorKeyFn);
        }

        let mut watchers = self.watchers.lock();
        if clear_on_insert {
            watchers.on_insert.push(Watcher {
                cache: Arc::clone(&cache),
                selector_key_fn: selector_key_fn.clone(),
            });
        }
        if clear_on_update {
            watchers.on_update.push(Watcher { cache, selector_key_fn });
        }
        Ok(())
    }

    /// Returns the first document matching `selector`, bypassing every cache.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures.
    pub async fn find_one(&self, selector: &Document, options: Option<&FindOptions>) -> Result<Option<Document>> {
        Ok(self.collection().await?.find_one(selector, options).await?)
    }

    /// Returns a cursor over every document matching `selector`, bypassing
    /// every cache.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures.
    pub async fn find(&self, selector: &Document, options: Option<&FindOptions>) -> Result<Cursor> {
        Ok(self.collection().await?.find(selector, options).await?)
    }

    /// Loads one document through a caller-supplied loader, applying
    /// `projection` to a found document.
    ///
    /// A memoized absent result is returned as `None` without touching the
    /// projection; filtering an absent document is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the loader's fetch failure.
    pub async fn find_one_cached(
        &self,
        loader: &Loader<String, Option<Document>>,
        key: impl Into<String>,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>> {
        let result = loader.load(key.into()).await?;
        Ok(match (result, projection) {
            (Some(document), Some(projection)) => Some(projection.apply(&document)),
            (result, _) => result,
        })
    }

    /// Loads one document by identifier through the entity's singleton
    /// loader, applying `projection` to a found document.
    ///
    /// The loader is created on first use and registered for invalidation on
    /// inserts, deletes, and updates; an update whose selector carries the
    /// document's `_id` invalidates only that entry. Absent results are
    /// memoized too: repeated lookups of a nonexistent id hit the store once.
    ///
    /// # Errors
    ///
    /// Propagates connection and fetch failures.
    pub async fn find_one_cached_by_id(&self, id: impl Into<String>, projection: Option<&Projection>) -> Result<Option<Document>> {
        let loader = self.single_loader().await?;
        self.find_one_cached(&loader, id, projection).await
    }

    /// Loads a document sequence through a caller-supplied loader, applying
    /// `projection` to each element.
    ///
    /// # Errors
    ///
    /// Propagates the loader's fetch failure.
    pub async fn find_many_cached(
        &self,
        loader: &Loader<String, Vec<Document>>,
        key: impl Into<String>,
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>> {
        let documents = loader.load(key.into()).await?;
        Ok(match projection {
            Some(projection) => documents.iter().map(|document| projection.apply(document)).collect(),
            None => documents,
        })
    }

    /// Loads the whole collection through the entity's collection-wide
    /// loader, applying `projection` to each element.
    ///
    /// The loader caches the full set under a single fixed key and is fully
    /// invalidated by any insert, delete, or update.
    ///
    /// # Errors
    ///
    /// Propagates connection and fetch failures.
    pub async fn find_all_cached(&self, projection: Option<&Projection>) -> Result<Vec<Document>> {
        let loader = self.all_loader().await?;
        self.find_many_cached(&loader, ALL_KEY, projection).await
    }

    /// Stores one document, invalidating insert-registered loaders first.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures. Invalidation is not rolled
    /// back when the write fails.
    pub async fn insert_one(&self, document: Document) -> Result<InsertOneResult> {
        self.clear_insert_caches(std::slice::from_ref(&document));
        Ok(self.collection().await?.insert_one(document).await?)
    }

    /// Stores many documents, invalidating insert-registered loaders first.
    ///
    /// Each loader's key function runs against every inserted document; if
    /// any document yields no key the loader is fully cleared instead.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures.
    pub async fn insert_many(&self, documents: Vec<Document>) -> Result<InsertManyResult> {
        self.clear_insert_caches(&documents);
        Ok(self.collection().await?.insert_many(documents).await?)
    }

    /// Applies `update` to the first document matching `selector`,
    /// invalidating update-registered loaders first.
    ///
    /// Loaders whose key function derives a key from `selector` drop only
    /// that entry; the rest are fully cleared.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures. Invalidation is not rolled
    /// back when the write fails.
    pub async fn update_one(&self, selector: &Document, update: &Document, options: Option<&UpdateOptions>) -> Result<UpdateResult> {
        self.clear_update_caches(selector);
        Ok(self.collection().await?.update_one(selector, update, options).await?)
    }

    /// Applies `update` to every document matching `selector`, invalidating
    /// update-registered loaders first.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures.
    pub async fn update_many(&self, selector: &Document, update: &Document, options: Option<&UpdateOptions>) -> Result<UpdateResult> {
        self.clear_update_caches(selector);
        Ok(self.collection().await?.update_many(selector, update, options).await?)
    }

    /// Removes the first document matching `selector`, invalidating loaders
    /// under the same policy as inserts.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures.
    pub async fn delete_one(&self, selector: &Document) -> Result<DeleteResult> {
        self.clear_insert_caches(std::slice::from_ref(selector));
        Ok(self.collection().await?.delete_one(selector).await?)
    }

    /// Removes every document matching `selector`, invalidating loaders
    /// under the same policy as inserts.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures.
    pub async fn delete_many(&self, selector: &Document) -> Result<DeleteResult> {
        self.clear_insert_caches(std::slice::from_ref(selector));
        Ok(self.collection().await?.delete_many(selector).await?)
    }

    /// Deletes every document in the collection.
    ///
    /// Used as per-test teardown; the entity itself stays usable.
    ///
    /// # Errors
    ///
    /// Propagates connection and store failures.
    pub async fn dispose(&self) -> Result<DeleteResult> {
        self.delete_many(&Document::new()).await
    }

    /// Invalidates every insert-registered loader for the given documents.
    ///
    /// Also used for deletes, which affect the same existence-based lookups.
    pub fn clear_insert_caches(&self, documents: &[Document]) {
        let watchers = self.watchers.lock();
        invalidate(&self.collection_name, &watchers.on_insert, documents);
    }

    /// Invalidates every update-registered loader for the given selector.
    pub fn clear_update_caches(&self, selector: &Document) {
        let watchers = self.watchers.lock();
        invalidate(&self.collection_name, &watchers.on_update, std::slice::from_ref(selector));
    }

    async fn single_loader(&self) -> Result<Arc<Loader<String, Option<Document>>>> {
        let loader = self
            .single
            .get_or_try_init(|| async {
                let collection = self.collection().await?.clone();
                let fetch = move |ids: Vec<String>| {
                    let collection = collection.clone();
                    async move {
                        let lookups = ids.into_iter().map(|id| {
                            let collection = collection.clone();
                            async move {
                                let selector = doc! { "_id": id };
                                collection.find_one(&selector, None).await.map_err(shoal_loader::Error::fetch)
                            }
                        });
                        Ok(futures::future::join_all(lookups).await)
                    }
                };
                self.create_loader(
                    fetch,
                    LoaderOptions::new()
                        .clear_on_insert(true)
                        .clear_on_update(true)
                        .selector_key_fn(|selector| string_id(selector).map(str::to_owned)),
                )
            })
            .await?;
        Ok(Arc::clone(loader))
    }

    async fn all_loader(&self) -> Result<Arc<Loader<String, Vec<Document>>>> {
        let loader = self
            .all
            .get_or_try_init(|| async {
                let collection = self.collection().await?.clone();
                let fetch = move |keys: Vec<String>| {
                    let collection = collection.clone();
                    async move {
                        let mut results = Vec::with_capacity(keys.len());
                        for _ in &keys {
                            let fetched = match collection.find(&Document::new(), None).await {
                                Ok(cursor) => Ok(cursor.to_vec()),
                                Err(error) => Err(shoal_loader::Error::fetch(error)),
                            };
                            results.push(fetched);
                        }
                        Ok(results)
                    }
                };
                // No write selector maps to the ALL key, so every write
                // invalidates the whole loader.
                self.create_loader(
                    fetch,
                    LoaderOptions::new()
                        .clear_on_insert(true)
                        .clear_on_update(true)
                        .selector_key_fn(|_| None),
                )
            })
            .await?;
        Ok(Arc::clone(loader))
    }
}

/// Clears each watcher's affected keys, falling back to a full clear when a
/// key cannot be derived for every subject.
fn invalidate(collection_name: &str, watchers: &[Watcher], subjects: &[Document]) {
    if watchers.is_empty() {
        return;
    }
    trace!(collection = collection_name, watchers = watchers.len(), "invalidating loader caches");

    for watcher in watchers {
        match &watcher.selector_key_fn {
            None => watcher.cache.clear_all(),
            Some(selector_key_fn) => {
                let keys: Option<Vec<String>> = subjects.iter().map(|subject| selector_key_fn(subject)).collect();
                match keys {
                    Some(keys) => {
                        for key in &keys {
                            watcher.cache.clear(key);
                        }
                    }
                    None => watcher.cache.clear_all(),
                }
            }
        }
    }
}

/// Builder for configuring an [`Entity`]'s loader cache defaults.
///
/// The defaults apply to the entity's own loaders and to custom loaders
/// whose [`LoaderOptions`] leave the corresponding setting unset.
///
/// # Examples
///
/// ```ignore
/// use shoal::Entity;
/// use std::time::Duration;
///
/// let entity = Entity::builder(provider, "users")
///     .cache_capacity(1000)
///     .cache_ttl(Duration::from_secs(300))
///     .build();
/// ```
#[derive(Debug)]
#[must_use]
pub struct EntityBuilder<P> {
    provider: P,
    collection_name: String,
    defaults: CacheDefaults,
}

impl<P: ConnectionProvider> EntityBuilder<P> {
    /// Sets the default bounded-cache capacity for the entity's loaders.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.defaults.capacity = Some(capacity);
        self
    }

    /// Sets the default time-to-live for the entity's loaders.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.defaults.ttl = Some(ttl);
        self
    }

    /// Memoizes into growth-unbounded maps by default.
    pub fn unbounded_cache(mut self) -> Self {
        self.defaults.unbounded = true;
        self
    }

    /// Builds the configured entity.
    #[must_use]
    pub fn build(self) -> Entity<P> {
        Entity {
            provider: self.provider,
            collection_name: self.collection_name,
            collection: OnceCell::new(),
            single: OnceCell::new(),
            all: OnceCell::new(),
            watchers: Mutex::new(Watchers::default()),
            cache_defaults: self.defaults,
        }
    }
}
