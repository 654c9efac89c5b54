// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for coalesced loads.

use std::sync::Arc;

/// The result for fallible loader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced while loading a key.
///
/// Loader errors are `Clone` because a single failure is broadcast to every
/// caller coalesced onto the same fetch. Failed loads are never memoized;
/// retry policy belongs to the caller.
///
/// # Examples
///
/// ```
/// use shoal_loader::Error;
///
/// let error = Error::fetch(std::io::Error::other("connection reset"));
/// let shared = error.clone();
/// assert_eq!(error.to_string(), shared.to_string());
/// ```
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The batch fetch failed as a whole, or reported a failure for this key.
    #[error("batch fetch failed: {0}")]
    Fetch(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The batch fetch function broke its contract by returning the wrong
    /// number of results.
    #[error("batch fetch returned {actual} results for {expected} keys")]
    BatchShape {
        /// Number of keys handed to the batch fetch function.
        expected: usize,
        /// Number of results it actually returned.
        actual: usize,
    },

    /// The dispatch task terminated before producing a result.
    #[error("load abandoned before completion")]
    Abandoned,
}

impl Error {
    /// Wraps an underlying fetch failure.
    pub fn fetch(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Fetch(Arc::new(cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_preserves_cause_message() {
        let error = Error::fetch(std::io::Error::other("boom"));
        assert_eq!(error.to_string(), "batch fetch failed: boom");
    }

    #[test]
    fn batch_shape_error_names_both_counts() {
        let error = Error::BatchShape { expected: 3, actual: 1 };
        assert_eq!(error.to_string(), "batch fetch returned 1 results for 3 keys");
    }
}
