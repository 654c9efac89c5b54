// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for entity cache operations.

use shoal_store::ProjectionError;

/// The result for fallible entity operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error surfaced by an entity cache operation.
///
/// # Examples
///
/// ```
/// use shoal::LoaderOptions;
///
/// // Registering update invalidation with no way to derive the affected
/// // key fails fast, before any write happens.
/// let options = LoaderOptions::new().clear_on_update(true);
/// assert!(options.validate().is_err());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A loader registered for update invalidation has no selector key
    /// function, so the entity cannot decide what to invalidate.
    #[error("loaders cleared on update require a selector key function")]
    MissingSelectorKeyFn,

    /// An invalid projection specification.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// A cached read failed while fetching through a loader.
    #[error(transparent)]
    Load(#[from] shoal_loader::Error),

    /// A direct store operation failed.
    #[error(transparent)]
    Store(#[from] shoal_store::Error),
}
