// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for store operations.

use std::borrow::Cow;

/// The result for fallible operations against a document store.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from a collection or connection operation.
///
/// Backends wrap their transport and database failures in this type; the
/// caching layer propagates it unchanged. Other than implementing
/// [`std::error::Error`] and [`std::fmt::Debug`], this type currently
/// provides no introspection capabilities.
///
/// # Examples
///
/// ```
/// use shoal_store::Error;
///
/// let error = Error::unsupported("update operator `$rename` is not supported");
/// assert!(error.to_string().contains("$rename"));
/// ```
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

/// The categories of store failure.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A failure reported by the underlying backend or transport.
    #[error("{0}")]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The operation asked the backend for something it cannot express.
    #[error("{0}")]
    Unsupported(Cow<'static, str>),
}

impl Error {
    /// Wraps a backend or transport failure.
    pub fn backend(cause: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self(ErrorKind::Backend(cause.into()))
    }

    /// Creates an error for an operation the backend cannot express.
    pub fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Self(ErrorKind::Unsupported(message.into()))
    }

    #[cfg(test)]
    pub(crate) const fn kind(&self) -> &ErrorKind {
        &self.0
    }
}
