// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Batched, memoizing key/value loading with request coalescing.
//!
//! This crate provides [`Loader`], the cache-coherent loading primitive the
//! entity layer is built on. A loader wraps a batch-fetch function and
//! guarantees:
//!
//! - **Same-tick batching**: every `load` issued before the current task
//!   suspends is merged into a single batch-fetch invocation, with at most
//!   one underlying fetch per unique key per tick.
//! - **Duplicate suppression**: concurrent loads for the same uncached key
//!   share a single in-flight fetch — the loader memoizes shared futures,
//!   not just resolved values, so followers join the leader's fetch rather
//!   than issuing their own.
//! - **Memoization with explicit invalidation**: results (including absent
//!   values) are retained in a pluggable [`CacheMap`](shoal_cache::CacheMap)
//!   until cleared or evicted.
//!
//! Failures are broadcast to every coalesced waiter but never memoized, so
//! retry policy stays with the caller.
//!
//! # Example
//!
//! ```
//! use shoal_loader::Loader;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let loader = Loader::builder(|keys: Vec<u32>| async move {
//!     let results = keys.into_iter().map(|key| Ok(key * 2)).collect();
//!     Ok(results)
//! })
//! .build();
//!
//! let doubled = loader.load_many([1, 2, 3]).await.unwrap();
//! assert_eq!(doubled, vec![2, 4, 6]);
//! # });
//! ```

mod batch;
mod error;
mod loader;

pub use batch::{BatchFn, BatchResults};
pub use error::{Error, Result};
pub use loader::{CacheKeyFn, LoadFuture, Loader, LoaderBuilder};
