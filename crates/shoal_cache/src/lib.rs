// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fixed-capacity key/value caching for loader memoization.
//!
//! This crate provides the storage half of the coalescing loader: a
//! [`CacheMap`] trait for pluggable memoization stores, a growth-unbounded
//! [`UnboundedCache`], and a [`BoundedCache`] with strict least-recently-used
//! eviction and optional time-based expiry.
//!
//! All operations are synchronous; the caller serializes access (the loader
//! keeps its map behind a mutex). Time-based expiry reads
//! [`tokio::time::Instant`], so tests freeze and advance the clock with a
//! paused runtime.
//!
//! # Examples
//!
//! ```
//! use shoal_cache::BoundedCache;
//!
//! let mut cache = BoundedCache::with_capacity(2);
//! cache.insert("a", 1);
//! cache.insert("b", 2);
//!
//! // Reading "a" refreshes its recency, so inserting a third entry
//! // evicts "b" instead.
//! let _ = cache.get(&"a");
//! cache.insert("c", 3);
//!
//! assert!(cache.get(&"a").is_some());
//! assert!(cache.get(&"b").is_none());
//! assert!(cache.get(&"c").is_some());
//! ```

mod bounded;
mod map;

pub use bounded::{BoundedCache, BoundedCacheBuilder};
pub use map::{CacheMap, UnboundedCache};
