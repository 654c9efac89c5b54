// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The collection abstraction the cache layer reads through and writes through.
//!
//! [`Collection`] defines the operations a storage backend must implement.
//! The trait is designed for composition: implement the storage operations,
//! then let the entity layer add coalesced, invalidation-coherent caching
//! on top.

use serde_json::Value;

use crate::{Document, Result};

/// Options recognized by read operations.
///
/// # Examples
///
/// ```
/// use shoal_store::FindOptions;
///
/// let options = FindOptions::new().skip(10).limit(5);
/// assert_eq!(options.limit, Some(5));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Maximum number of documents to produce.
    pub limit: Option<usize>,
    /// Number of matching documents to pass over first.
    pub skip: Option<usize>,
}

impl FindOptions {
    /// Creates options with no limit and no skip.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of documents to produce.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of matching documents to pass over first.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Options recognized by update operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when the selector matches nothing.
    pub upsert: bool,
}

impl UpdateOptions {
    /// Creates options with upsert disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables upsert behavior.
    #[must_use]
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// The outcome of a single-document insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertOneResult {
    /// The identifier of the inserted document.
    pub inserted_id: Value,
}

/// The outcome of a multi-document insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertManyResult {
    /// The identifiers of the inserted documents, in input order.
    pub inserted_ids: Vec<Value>,
}

/// The outcome of an update operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Number of documents the selector matched.
    pub matched_count: u64,
    /// Number of documents actually modified.
    pub modified_count: u64,
    /// The identifier of the document inserted by an upsert, when one was.
    pub upserted_id: Option<Value>,
}

/// The outcome of a delete operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// Number of documents removed.
    pub deleted_count: u64,
}

/// A finite sequence of documents produced by one `find` call.
///
/// Each call to [`Collection::find`] produces a fresh cursor, so a query is
/// restartable by issuing the call again. The cursor can be drained in one
/// step with [`to_vec`](Cursor::to_vec) or consumed as an iterator.
///
/// # Examples
///
/// ```
/// use shoal_store::{Cursor, doc};
///
/// let cursor = Cursor::new(vec![doc! { "_id": "1" }, doc! { "_id": "2" }]);
/// assert_eq!(cursor.len(), 2);
///
/// let documents = cursor.to_vec();
/// assert_eq!(documents.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct Cursor {
    documents: std::vec::IntoIter<Document>,
}

impl Cursor {
    /// Creates a cursor over an already-materialized result set.
    #[must_use]
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into_iter(),
        }
    }

    /// Drains the cursor into a vector of documents.
    #[must_use]
    pub fn to_vec(self) -> Vec<Document> {
        self.documents.collect()
    }

    /// Number of documents remaining in the cursor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` when the cursor has been exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.len() == 0
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.documents.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}

/// A handle to one named collection of documents.
///
/// Handles are cheap to clone and may be held by long-lived loaders, so the
/// trait requires `Clone + Send + Sync + 'static`. Every operation returns
/// its result descriptor or an [`Error`](crate::Error) on backend failure.
///
/// Selectors are equality documents: a stored document matches when every
/// selector field compares equal, and the empty selector matches everything.
pub trait Collection: Clone + Send + Sync + 'static {
    /// Returns the first document matching `selector`, if any.
    fn find_one(&self, selector: &Document, options: Option<&FindOptions>) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Returns a cursor over every document matching `selector`.
    fn find(&self, selector: &Document, options: Option<&FindOptions>) -> impl Future<Output = Result<Cursor>> + Send;

    /// Stores one document.
    fn insert_one(&self, document: Document) -> impl Future<Output = Result<InsertOneResult>> + Send;

    /// Stores many documents, preserving input order.
    fn insert_many(&self, documents: Vec<Document>) -> impl Future<Output = Result<InsertManyResult>> + Send;

    /// Applies `update` to the first document matching `selector`.
    fn update_one(
        &self,
        selector: &Document,
        update: &Document,
        options: Option<&UpdateOptions>,
    ) -> impl Future<Output = Result<UpdateResult>> + Send;

    /// Applies `update` to every document matching `selector`.
    fn update_many(
        &self,
        selector: &Document,
        update: &Document,
        options: Option<&UpdateOptions>,
    ) -> impl Future<Output = Result<UpdateResult>> + Send;

    /// Removes the first document matching `selector`.
    fn delete_one(&self, selector: &Document) -> impl Future<Output = Result<DeleteResult>> + Send;

    /// Removes every document matching `selector`.
    fn delete_many(&self, selector: &Document) -> impl Future<Output = Result<DeleteResult>> + Send;
}

/// A source of collection handles.
///
/// Providers establish any underlying connection lazily; callers resolve a
/// handle once and keep it for the lifetime of the consuming entity.
pub trait ConnectionProvider: Send + Sync {
    /// The handle type this provider yields.
    type Collection: Collection;

    /// Resolves a handle to the named collection.
    fn collection(&self, name: &str) -> impl Future<Output = Result<Self::Collection>> + Send;
}
