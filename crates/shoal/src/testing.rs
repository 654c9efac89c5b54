// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test harness utilities.
//!
//! [`TestContext`] is an explicitly constructed, explicitly disposed test
//! environment: it owns an in-memory connector and hands out entities bound
//! to uniquely named collections, so tests never share ambient global state.

use std::sync::atomic::{AtomicUsize, Ordering};

use shoal_store::testing::MemoryConnector;

use crate::Entity;

/// An isolated test environment over an in-memory store.
///
/// Each call to [`entity`](TestContext::entity) yields an entity bound to a
/// fresh collection; [`reset`](TestContext::reset) drops everything the
/// context created. Pass the context (or its connector) by reference into
/// test setup instead of reaching for globals.
#[derive(Debug, Default)]
pub struct TestContext {
    connector: MemoryConnector,
    next_collection: AtomicUsize,
}

impl TestContext {
    /// Creates a context with an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The connector backing this context.
    #[must_use]
    pub fn connector(&self) -> &MemoryConnector {
        &self.connector
    }

    /// Creates an entity bound to a fresh, uniquely named collection.
    #[must_use]
    pub fn entity(&self) -> Entity<MemoryConnector> {
        let index = self.next_collection.fetch_add(1, Ordering::Relaxed);
        self.named_entity(&format!("test_{index}"))
    }

    /// Creates an entity bound to the named collection.
    #[must_use]
    pub fn named_entity(&self, name: &str) -> Entity<MemoryConnector> {
        Entity::new(self.connector.clone(), name)
    }

    /// Drops every collection created through this context.
    pub fn reset(&self) {
        self.connector.reset();
    }
}
