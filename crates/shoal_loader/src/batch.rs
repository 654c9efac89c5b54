// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The batch-fetch contract loaders are built around.

use futures::future::BoxFuture;

use crate::Result;

/// The per-key outcomes of one batch fetch, in input-key order.
pub type BatchResults<V> = Vec<Result<V>>;

/// A batched fetch: one underlying call resolving many keys at once.
///
/// Implementations must return exactly one result per input key, preserving
/// input order. A per-key [`Err`] rejects only that key's load; an outer
/// [`Err`] rejects every key in the batch. Returning the wrong number of
/// results rejects the whole batch with [`Error::BatchShape`](crate::Error::BatchShape).
///
/// The trait is implemented automatically for closures:
///
/// ```
/// use shoal_loader::{BatchFn, BatchResults, Error};
///
/// fn accepts(_: impl BatchFn<String, usize>) {}
///
/// accepts(|keys: Vec<String>| async move {
///     let results: BatchResults<usize> = keys.into_iter().map(|key| Ok(key.len())).collect();
///     Ok::<_, Error>(results)
/// });
/// ```
pub trait BatchFn<K, V>: Send + Sync + 'static {
    /// Fetches values for `keys`.
    fn fetch(&self, keys: Vec<K>) -> BoxFuture<'static, Result<BatchResults<V>>>;
}

impl<K, V, F, Fut> BatchFn<K, V> for F
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BatchResults<V>>> + Send + 'static,
{
    fn fetch(&self, keys: Vec<K>) -> BoxFuture<'static, Result<BatchResults<V>>> {
        Box::pin(self(keys))
    }
}
