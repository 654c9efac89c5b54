// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory store implementation for testing.
//!
//! This module provides [`MemoryConnector`] and [`MemoryCollection`], a
//! multi-collection in-memory store that records every operation and
//! supports failure injection for testing error paths. Handles are cheap
//! clones sharing one state, so a test can hold its own handle to the same
//! collection an entity writes through and count the fetches it performed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    Collection, ConnectionProvider, Cursor, DeleteResult, Document, Error, FindOptions, InsertManyResult, InsertOneResult,
    Result, UpdateOptions, UpdateResult,
};

/// A recorded store operation with its input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// A single-document read was performed with the given selector.
    FindOne(Document),
    /// A multi-document read was performed with the given selector.
    Find(Document),
    /// A document was inserted.
    InsertOne(Document),
    /// A batch of documents was inserted.
    InsertMany(Vec<Document>),
    /// A single-document update was performed.
    UpdateOne {
        /// The selector the update targeted.
        selector: Document,
        /// The update specification.
        update: Document,
    },
    /// A multi-document update was performed.
    UpdateMany {
        /// The selector the update targeted.
        selector: Document,
        /// The update specification.
        update: Document,
    },
    /// A single-document delete was performed.
    DeleteOne(Document),
    /// A multi-document delete was performed.
    DeleteMany(Document),
}

impl StoreOp {
    /// Returns `true` for the read operations that fetch documents.
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::FindOne(_) | Self::Find(_))
    }
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

struct CollectionState {
    documents: Vec<Document>,
    operations: Vec<StoreOp>,
    fail_when: Option<FailPredicate>,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            operations: Vec::new(),
            fail_when: None,
        }
    }
}

/// A handle to one in-memory collection.
///
/// All clones share the same state. Operations are recorded for later
/// verification, and [`fail_when`](MemoryCollection::fail_when) injects
/// failures into matching operations.
///
/// # Examples
///
/// ```
/// use shoal_store::{doc, Collection};
/// use shoal_store::testing::MemoryCollection;
/// # futures::executor::block_on(async {
///
/// let collection = MemoryCollection::new("users");
/// collection.insert_one(doc! { "_id": "1", "name": "ada" }).await?;
///
/// let found = collection.find_one(&doc! { "_id": "1" }, None).await?;
/// assert!(found.is_some());
/// assert_eq!(collection.fetch_count(), 1);
/// # Ok::<(), shoal_store::Error>(())
/// # });
/// ```
#[derive(Clone)]
pub struct MemoryCollection {
    name: String,
    state: Arc<Mutex<CollectionState>>,
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .field("documents", &state.documents.len())
            .field("operations", &state.operations.len())
            .finish_non_exhaustive()
    }
}

impl MemoryCollection {
    /// Creates an empty collection with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(CollectionState::new())),
        }
    }

    /// The collection's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    /// Returns `true` when the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.state.lock().operations.clone()
    }

    /// Number of recorded read operations (`find_one` and `find`).
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state.lock().operations.iter().filter(|op| op.is_fetch()).count()
    }

    /// Clears the recorded operation log.
    pub fn clear_operations(&self) {
        self.state.lock().operations.clear();
    }

    /// Sets a predicate that determines which operations fail.
    ///
    /// A matching operation is still recorded, then returns a backend error
    /// without touching stored documents.
    ///
    /// # Examples
    ///
    /// ```
    /// use shoal_store::testing::{MemoryCollection, StoreOp};
    ///
    /// let collection = MemoryCollection::new("users");
    /// collection.fail_when(|op| matches!(op, StoreOp::UpdateOne { .. }));
    /// ```
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        self.state.lock().fail_when = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        self.state.lock().fail_when = None;
    }

    fn begin(&self, op: StoreOp) -> Result<()> {
        let mut state = self.state.lock();
        let fail = state.fail_when.as_ref().is_some_and(|predicate| predicate(&op));
        state.operations.push(op);
        if fail {
            return Err(Error::backend(format!("injected failure in collection `{}`", self.name)));
        }
        Ok(())
    }
}

fn matches(document: &Document, selector: &Document) -> bool {
    selector.iter().all(|(field, expected)| document.get(field) == Some(expected))
}

/// Generates a 24-hex-character identifier for documents inserted without one.
fn generate_id() -> String {
    format!("{:016x}{:08x}", fastrand::u64(..), fastrand::u32(..))
}

fn ensure_id(document: &mut Document) -> Value {
    if let Some(id) = document.get("_id") {
        return id.clone();
    }
    let id = Value::String(generate_id());
    document.insert("_id".to_owned(), id.clone());
    id
}

fn apply_update(target: &mut Document, update: &Document) -> Result<bool> {
    let has_operators = update.keys().any(|key| key.starts_with('$'));
    let before = target.clone();

    if has_operators {
        for (operator, argument) in update {
            match (operator.as_str(), argument) {
                ("$set", Value::Object(fields)) => {
                    for (field, value) in fields {
                        target.insert(field.clone(), value.clone());
                    }
                }
                ("$unset", Value::Object(fields)) => {
                    for field in fields.keys() {
                        target.remove(field);
                    }
                }
                _ => {
                    return Err(Error::unsupported(format!("update operator `{operator}` is not supported")));
                }
            }
        }
    } else {
        // A replacement document: everything but the identifier is swapped out.
        let id = target.get("_id").cloned();
        target.clear();
        target.extend(update.iter().map(|(field, value)| (field.clone(), value.clone())));
        if let Some(id) = id {
            target.insert("_id".to_owned(), id);
        }
    }

    Ok(*target != before)
}

impl Collection for MemoryCollection {
    async fn find_one(&self, selector: &Document, options: Option<&FindOptions>) -> Result<Option<Document>> {
        self.begin(StoreOp::FindOne(selector.clone()))?;
        let skip = options.and_then(|o| o.skip).unwrap_or(0);
        let state = self.state.lock();
        Ok(state.documents.iter().filter(|d| matches(d, selector)).nth(skip).cloned())
    }

    async fn find(&self, selector: &Document, options: Option<&FindOptions>) -> Result<Cursor> {
        self.begin(StoreOp::Find(selector.clone()))?;
        let skip = options.and_then(|o| o.skip).unwrap_or(0);
        let limit = options.and_then(|o| o.limit).unwrap_or(usize::MAX);
        let state = self.state.lock();
        let documents: Vec<Document> = state
            .documents
            .iter()
            .filter(|d| matches(d, selector))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect();
        Ok(Cursor::new(documents))
    }

    async fn insert_one(&self, mut document: Document) -> Result<InsertOneResult> {
        let inserted_id = ensure_id(&mut document);
        self.begin(StoreOp::InsertOne(document.clone()))?;
        self.state.lock().documents.push(document);
        Ok(InsertOneResult { inserted_id })
    }

    async fn insert_many(&self, documents: Vec<Document>) -> Result<InsertManyResult> {
        let mut prepared = Vec::with_capacity(documents.len());
        let mut inserted_ids = Vec::with_capacity(documents.len());
        for mut document in documents {
            inserted_ids.push(ensure_id(&mut document));
            prepared.push(document);
        }
        self.begin(StoreOp::InsertMany(prepared.clone()))?;
        self.state.lock().documents.extend(prepared);
        Ok(InsertManyResult { inserted_ids })
    }

    async fn update_one(&self, selector: &Document, update: &Document, options: Option<&UpdateOptions>) -> Result<UpdateResult> {
        self.begin(StoreOp::UpdateOne {
            selector: selector.clone(),
            update: update.clone(),
        })?;

        let mut state = self.state.lock();
        if let Some(target) = state.documents.iter_mut().find(|d| matches(d, selector)) {
            let modified = apply_update(target, update)?;
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: u64::from(modified),
                upserted_id: None,
            });
        }

        if options.is_some_and(|o| o.upsert) {
            // Seed the new document from the selector's equality fields.
            let mut document = selector.clone();
            apply_update(&mut document, update)?;
            let upserted_id = ensure_id(&mut document);
            state.documents.push(document);
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_id: Some(upserted_id),
            });
        }

        Ok(UpdateResult::default())
    }

    async fn update_many(&self, selector: &Document, update: &Document, _options: Option<&UpdateOptions>) -> Result<UpdateResult> {
        self.begin(StoreOp::UpdateMany {
            selector: selector.clone(),
            update: update.clone(),
        })?;

        let mut state = self.state.lock();
        let mut matched = 0;
        let mut modified = 0;
        for target in state.documents.iter_mut().filter(|d| matches(d, selector)) {
            matched += 1;
            if apply_update(target, update)? {
                modified += 1;
            }
        }
        Ok(UpdateResult {
            matched_count: matched,
            modified_count: modified,
            upserted_id: None,
        })
    }

    async fn delete_one(&self, selector: &Document) -> Result<DeleteResult> {
        self.begin(StoreOp::DeleteOne(selector.clone()))?;
        let mut state = self.state.lock();
        let Some(index) = state.documents.iter().position(|d| matches(d, selector)) else {
            return Ok(DeleteResult::default());
        };
        let _ = state.documents.remove(index);
        Ok(DeleteResult { deleted_count: 1 })
    }

    async fn delete_many(&self, selector: &Document) -> Result<DeleteResult> {
        self.begin(StoreOp::DeleteMany(selector.clone()))?;
        let mut state = self.state.lock();
        let before = state.documents.len();
        state.documents.retain(|d| !matches(d, selector));
        let deleted = before - state.documents.len();
        Ok(DeleteResult {
            deleted_count: deleted as u64,
        })
    }
}

/// An in-memory connection provider.
///
/// Clones share one set of collections, so a test can hand a clone to the
/// code under test and keep another to inspect what happened.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    collections: Arc<Mutex<HashMap<String, MemoryCollection>>>,
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("collections", &self.collections.lock().len())
            .finish_non_exhaustive()
    }
}

impl MemoryConnector {
    /// Creates a provider with no collections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every collection and its recorded operations.
    pub fn reset(&self) {
        self.collections.lock().clear();
    }
}

impl ConnectionProvider for MemoryConnector {
    type Collection = MemoryCollection;

    async fn collection(&self, name: &str) -> Result<MemoryCollection> {
        let mut collections = self.collections.lock();
        Ok(collections
            .entry(name.to_owned())
            .or_insert_with(|| MemoryCollection::new(name))
            .clone())
    }
}
