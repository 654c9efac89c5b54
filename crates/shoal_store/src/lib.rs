// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Document store abstractions for the shoal caching library.
//!
//! This crate defines the collaborators the cache layer is built against:
//! - [`Document`], a schemaless JSON-object document, and the [`doc!`] macro
//! - [`Collection`] and [`ConnectionProvider`], the traits a storage backend
//!   implements to serve reads and writes
//! - [`Projection`], a validated field filter applied to documents after
//!   they leave the cache
//!
//! The crate deliberately knows nothing about caching or batching; it is the
//! seam between the loader subsystem and whatever database actually holds
//! the documents. A recording in-memory implementation for tests lives in
//! [`testing`] behind the `test-util` feature.
//!
//! # Examples
//!
//! ```
//! use shoal_store::{doc, Projection};
//!
//! let document = doc! { "_id": "1", "name": "ada", "role": "admin" };
//!
//! let projection = Projection::include(["name"])?;
//! let filtered = projection.apply(&document);
//!
//! assert_eq!(filtered, doc! { "name": "ada" });
//! # Ok::<(), shoal_store::ProjectionError>(())
//! ```

mod collection;
mod document;
mod error;
pub mod projection;

#[cfg(any(feature = "test-util", test))]
pub mod testing;

pub use collection::{
    Collection, ConnectionProvider, Cursor, DeleteResult, FindOptions, InsertManyResult, InsertOneResult, UpdateOptions,
    UpdateResult,
};
pub use document::{Document, string_id};
pub use error::{Error, ErrorKind, Result};
pub use projection::{Projection, ProjectionError};
