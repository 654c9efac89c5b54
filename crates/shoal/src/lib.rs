// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entity-level caching over a document store.
//!
//! This crate ties the shoal workspace together: an [`Entity`] fronts one
//! collection of documents with batched, request-coalescing loaders whose
//! cache entries are selectively invalidated when writes occur, plus a
//! validated field [`Projection`] applied to documents after they leave the
//! cache.
//!
//! - Reads (`find_one_cached_by_id`, `find_all_cached`, custom loaders) are
//!   served from per-key caches; a miss triggers one coalesced fetch through
//!   the collection abstraction, and absent results are memoized too.
//! - Writes (`insert_*`, `update_*`, `delete_*`) first invalidate the
//!   loaders registered for that write kind — dropping exactly the affected
//!   key when one can be derived from the write, and whole caches when not —
//!   then delegate to the collection.
//!
//! The collection itself is an external collaborator: anything implementing
//! [`ConnectionProvider`] and [`Collection`] can sit underneath. An
//! in-memory implementation for tests ships in `shoal_store`'s `testing`
//! module behind its `test-util` feature.
//!
//! # Example
//!
//! ```ignore
//! use shoal::{doc, Entity, Projection};
//!
//! let entity = Entity::new(provider, "users");
//! entity.insert_one(doc! { "_id": "1", "name": "ada", "role": "admin" }).await?;
//!
//! // One fetch, then cache hits until a write invalidates the entry.
//! let user = entity.find_one_cached_by_id("1", None).await?;
//! let user = entity.find_one_cached_by_id("1", None).await?;
//!
//! // Projection applies after the cache, never to absent results.
//! let name = Projection::include(["name"])?;
//! let public = entity.find_one_cached_by_id("1", Some(&name)).await?;
//! ```

mod entity;
mod error;
mod options;

#[cfg(any(feature = "test-util", test))]
pub mod testing;

pub use entity::{Entity, EntityBuilder, LoaderCache};
pub use error::{Error, Result};
pub use options::{LoaderOptions, SelectorKeyFn};

pub use shoal_cache::{BoundedCache, CacheMap, UnboundedCache};
pub use shoal_loader::{BatchFn, BatchResults, Error as LoadError, LoadFuture, Loader, LoaderBuilder};
pub use shoal_store::{
    Collection, ConnectionProvider, Cursor, DeleteResult, Document, FindOptions, InsertManyResult, InsertOneResult,
    Projection, ProjectionError, UpdateOptions, UpdateResult, doc, string_id,
};
