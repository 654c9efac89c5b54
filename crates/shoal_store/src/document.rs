// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The schemaless document representation shared across the workspace.

use serde_json::Value;

/// A schemaless document: a map of field names to JSON values.
///
/// Documents are the unit of storage, retrieval, and caching. Selectors and
/// update specifications are documents too; a selector matches a stored
/// document when every one of its fields is equal in the target.
///
/// # Examples
///
/// ```
/// use shoal_store::{doc, Document};
///
/// let document: Document = doc! { "_id": "1", "name": "ada" };
/// assert_eq!(document.get("name").and_then(|v| v.as_str()), Some("ada"));
/// ```
pub type Document = serde_json::Map<String, Value>;

/// Returns the document's `_id` field when it is a string.
///
/// Identifier-keyed loaders use this to derive the cache key a write
/// affects; a missing or non-string `_id` yields `None`, which callers
/// treat as "no deterministic key".
///
/// # Examples
///
/// ```
/// use shoal_store::{doc, string_id};
///
/// assert_eq!(string_id(&doc! { "_id": "1", "name": "ada" }), Some("1"));
/// assert_eq!(string_id(&doc! { "name": "ada" }), None);
/// assert_eq!(string_id(&doc! { "_id": 7 }), None);
/// ```
#[must_use]
pub fn string_id(document: &Document) -> Option<&str> {
    document.get("_id").and_then(Value::as_str)
}

/// Builds a [`Document`] from JSON object-literal syntax.
///
/// This is a thin wrapper over [`serde_json::json!`] that yields the map
/// directly instead of a [`serde_json::Value`].
///
/// # Examples
///
/// ```
/// use shoal_store::doc;
///
/// let selector = doc! { "_id": "1" };
/// let empty = doc! {};
///
/// assert_eq!(selector.len(), 1);
/// assert!(empty.is_empty());
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($body:tt)+) => {
        match ::serde_json::json!({ $($body)+ }) {
            ::serde_json::Value::Object(map) => map,
            _ => ::core::unreachable!("an object literal always produces Value::Object"),
        }
    };
}
