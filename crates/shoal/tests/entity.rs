// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the entity cache manager, driven through the
//! recording in-memory store.

use shoal::{Collection, ConnectionProvider, Document, Entity, Error, LoaderOptions, Projection, doc, string_id};
use shoal_store::testing::{MemoryCollection, MemoryConnector, StoreOp};

/// Creates an entity over a fresh store, seeds it, and returns a handle to
/// the same collection with a clean operation log.
async fn seeded_entity(documents: Vec<Document>) -> (Entity<MemoryConnector>, MemoryCollection) {
    let connector = MemoryConnector::new();
    let entity = Entity::new(connector.clone(), "users");
    for document in documents {
        entity.insert_one(document).await.expect("seed insert");
    }
    let collection = connector.collection("users").await.expect("collection handle");
    collection.clear_operations();
    (entity, collection)
}

#[tokio::test]
async fn find_one_cached_by_id_fetches_once() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1", "name": "ada" }]).await;

    let first = entity.find_one_cached_by_id("1", None).await.expect("first read");
    assert_eq!(first, Some(doc! { "_id": "1", "name": "ada" }));

    let second = entity.find_one_cached_by_id("1", None).await.expect("second read");
    assert_eq!(second, first);

    assert_eq!(collection.fetch_count(), 1);
}

#[tokio::test]
async fn a_missing_id_is_cached_as_absent() {
    let (entity, collection) = seeded_entity(Vec::new()).await;

    assert_eq!(entity.find_one_cached_by_id("never", None).await.expect("first read"), None);
    assert_eq!(entity.find_one_cached_by_id("never", None).await.expect("second read"), None);

    assert_eq!(collection.fetch_count(), 1);
}

#[tokio::test]
async fn concurrent_reads_of_one_id_share_a_fetch() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1" }]).await;

    let (a, b) = tokio::join!(entity.find_one_cached_by_id("1", None), entity.find_one_cached_by_id("1", None));

    assert_eq!(a.expect("first waiter"), b.expect("second waiter"));
    assert_eq!(collection.fetch_count(), 1);
}

#[tokio::test]
async fn update_invalidates_only_the_written_id() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1", "role": "admin" }, doc! { "_id": "2", "role": "user" }]).await;

    let _ = entity.find_one_cached_by_id("1", None).await.expect("populate 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("populate 2");
    assert_eq!(collection.fetch_count(), 2);

    entity
        .update_one(&doc! { "_id": "1" }, &doc! { "$set": { "role": "user" } }, None)
        .await
        .expect("update");

    // Id "1" re-fetches and observes the update.
    let one = entity.find_one_cached_by_id("1", None).await.expect("reload 1");
    assert_eq!(one, Some(doc! { "_id": "1", "role": "user" }));
    assert_eq!(collection.fetch_count(), 3);

    // Id "2" is still served from the cache.
    let _ = entity.find_one_cached_by_id("2", None).await.expect("cached 2");
    assert_eq!(collection.fetch_count(), 3);
}

#[tokio::test]
async fn an_unknown_update_selector_invalidates_every_id() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1", "file": "foo" }, doc! { "_id": "2", "file": "bar" }]).await;

    let _ = entity.find_one_cached_by_id("1", None).await.expect("populate 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("populate 2");

    // No `_id` in the selector, so no per-key invalidation is possible.
    entity
        .update_one(&doc! { "file": "foo" }, &doc! { "$set": { "file": "baz" } }, None)
        .await
        .expect("update");

    let _ = entity.find_one_cached_by_id("1", None).await.expect("reload 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("reload 2");
    assert_eq!(collection.fetch_count(), 4);
}

#[tokio::test]
async fn find_all_cached_fetches_once_until_a_write() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1" }]).await;

    let first = entity.find_all_cached(None).await.expect("first read");
    let second = entity.find_all_cached(None).await.expect("second read");
    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
    assert_eq!(collection.fetch_count(), 1);

    entity.insert_one(doc! { "_id": "2" }).await.expect("insert");

    let third = entity.find_all_cached(None).await.expect("read after insert");
    assert_eq!(third.len(), 2);
    assert_eq!(collection.fetch_count(), 2);
}

#[tokio::test]
async fn insert_invalidates_the_singleton_loader_by_id() {
    let (entity, collection) = seeded_entity(Vec::new()).await;

    // A cached absent result for id "1"...
    assert_eq!(entity.find_one_cached_by_id("1", None).await.expect("read missing"), None);

    // ...is dropped when a document with that id arrives.
    entity.insert_one(doc! { "_id": "1", "name": "ada" }).await.expect("insert");

    let found = entity.find_one_cached_by_id("1", None).await.expect("read after insert");
    assert_eq!(found, Some(doc! { "_id": "1", "name": "ada" }));
    assert_eq!(collection.fetch_count(), 2);
}

#[tokio::test]
async fn insert_with_derivable_ids_keeps_other_entries_cached() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1" }, doc! { "_id": "2" }]).await;

    let _ = entity.find_one_cached_by_id("1", None).await.expect("populate 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("populate 2");

    entity.insert_many(vec![doc! { "_id": "3" }, doc! { "_id": "4" }]).await.expect("insert");

    // Ids "1" and "2" were not named by the insert, so they stay cached.
    let _ = entity.find_one_cached_by_id("1", None).await.expect("cached 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("cached 2");
    assert_eq!(collection.fetch_count(), 2);
}

#[tokio::test]
async fn insert_without_an_id_fully_invalidates() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1" }]).await;

    let _ = entity.find_one_cached_by_id("1", None).await.expect("populate 1");

    // The store will generate an id, but the entity cannot derive one from
    // the document it was handed, so it clears the whole loader.
    entity.insert_one(doc! { "name": "anonymous" }).await.expect("insert");

    let _ = entity.find_one_cached_by_id("1", None).await.expect("reload 1");
    assert_eq!(collection.fetch_count(), 2);
}

#[tokio::test]
async fn delete_invalidates_like_insert() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1" }, doc! { "_id": "2" }]).await;

    let _ = entity.find_one_cached_by_id("1", None).await.expect("populate 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("populate 2");

    let result = entity.delete_one(&doc! { "_id": "1" }).await.expect("delete");
    assert_eq!(result.deleted_count, 1);

    // The deleted id re-fetches and is now gone; the other stays cached.
    assert_eq!(entity.find_one_cached_by_id("1", None).await.expect("reload 1"), None);
    let _ = entity.find_one_cached_by_id("2", None).await.expect("cached 2");
    assert_eq!(collection.fetch_count(), 3);
}

#[tokio::test]
async fn projection_applies_after_the_cache() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1", "name": "ada", "secret": "x" }]).await;

    let name_only = Projection::include(["name"]).expect("valid projection");
    let projected = entity.find_one_cached_by_id("1", Some(&name_only)).await.expect("projected read");
    assert_eq!(projected, Some(doc! { "name": "ada" }));

    // The cache holds the unfiltered document.
    let full = entity.find_one_cached_by_id("1", None).await.expect("full read");
    assert_eq!(full, Some(doc! { "_id": "1", "name": "ada", "secret": "x" }));
    assert_eq!(collection.fetch_count(), 1);
}

#[tokio::test]
async fn projecting_an_absent_result_is_a_no_op() {
    let (entity, _collection) = seeded_entity(Vec::new()).await;

    let projection = Projection::include(["name"]).expect("valid projection");
    let result = entity.find_one_cached_by_id("missing", Some(&projection)).await.expect("read");
    assert_eq!(result, None);
}

#[tokio::test]
async fn find_all_cached_projects_each_element() {
    let (entity, _collection) = seeded_entity(vec![
        doc! { "_id": "1", "name": "ada", "secret": "x" },
        doc! { "_id": "2", "name": "grace", "secret": "y" },
    ])
    .await;

    let no_secrets = Projection::exclude(["secret"]).expect("valid projection");
    let documents = entity.find_all_cached(Some(&no_secrets)).await.expect("read");

    assert_eq!(documents, vec![doc! { "_id": "1", "name": "ada" }, doc! { "_id": "2", "name": "grace" }]);
}

#[tokio::test]
async fn create_loader_rejects_update_clearing_without_a_key_fn() {
    let (entity, _collection) = seeded_entity(Vec::new()).await;

    let result = entity.create_loader::<Vec<Document>, _>(
        |keys: Vec<String>| async move { Ok(keys.into_iter().map(|_| Ok(Vec::new())).collect()) },
        LoaderOptions::new().clear_on_update(true),
    );

    assert!(matches!(result.expect_err("must fail fast"), Error::MissingSelectorKeyFn));
}

#[tokio::test]
async fn custom_loaders_invalidate_by_their_own_key() {
    let (entity, collection) = seeded_entity(vec![
        doc! { "_id": "1", "file": "foo" },
        doc! { "_id": "2", "file": "foo" },
        doc! { "_id": "3", "file": "bar" },
    ])
    .await;

    // A loader keyed by the `file` field, fetching all documents per file.
    let fetch_collection = collection.clone();
    let by_file = entity
        .create_loader(
            move |files: Vec<String>| {
                let collection = fetch_collection.clone();
                async move {
                    let mut results = Vec::with_capacity(files.len());
                    for file in files {
                        let fetched = match collection.find(&doc! { "file": file }, None).await {
                            Ok(cursor) => Ok(cursor.to_vec()),
                            Err(error) => Err(shoal::LoadError::fetch(error)),
                        };
                        results.push(fetched);
                    }
                    Ok(results)
                }
            },
            LoaderOptions::new()
                .clear_on_insert(true)
                .clear_on_update(true)
                .selector_key_fn(|selector| selector.get("file").and_then(|v| v.as_str()).map(str::to_owned)),
        )
        .expect("loader registration");

    let foo = entity.find_many_cached(&by_file, "foo", None).await.expect("load foo");
    let bar = entity.find_many_cached(&by_file, "bar", None).await.expect("load bar");
    assert_eq!(foo.len(), 2);
    assert_eq!(bar.len(), 1);
    assert_eq!(collection.fetch_count(), 2);

    // Updating file "foo" drops only that key.
    entity
        .update_many(&doc! { "file": "foo" }, &doc! { "$set": { "reviewed": true } }, None)
        .await
        .expect("update");

    let foo = entity.find_many_cached(&by_file, "foo", None).await.expect("reload foo");
    assert!(foo.iter().all(|d| d.get("reviewed").is_some()));
    let _ = entity.find_many_cached(&by_file, "bar", None).await.expect("cached bar");
    assert_eq!(collection.fetch_count(), 3);
}

#[tokio::test]
async fn a_failed_write_still_invalidates() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1", "role": "admin" }]).await;

    let _ = entity.find_one_cached_by_id("1", None).await.expect("populate");
    assert_eq!(collection.fetch_count(), 1);

    collection.fail_when(|op| matches!(op, StoreOp::UpdateOne { .. }));
    let result = entity.update_one(&doc! { "_id": "1" }, &doc! { "$set": { "role": "user" } }, None).await;
    assert!(result.is_err());
    collection.clear_failures();

    // The entry was dropped before the write failed: the next read is a
    // redundant re-fetch of unchanged data, never stale data.
    let reloaded = entity.find_one_cached_by_id("1", None).await.expect("reload");
    assert_eq!(reloaded, Some(doc! { "_id": "1", "role": "admin" }));
    assert_eq!(collection.fetch_count(), 2);
}

#[tokio::test]
async fn dispose_deletes_every_document() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1" }, doc! { "_id": "2" }]).await;

    let result = entity.dispose().await.expect("dispose");
    assert_eq!(result.deleted_count, 2);
    assert!(collection.is_empty());

    assert_eq!(entity.find_all_cached(None).await.expect("read after dispose"), Vec::new());
}

#[tokio::test]
async fn cache_defaults_bound_the_singleton_loader() {
    let connector = MemoryConnector::new();
    let entity = Entity::builder(connector.clone(), "users").cache_capacity(1).build();
    for id in ["1", "2"] {
        entity.insert_one(doc! { "_id": id }).await.expect("seed insert");
    }
    let collection = connector.collection("users").await.expect("collection handle");
    collection.clear_operations();

    // Capacity 1: loading "2" evicts "1".
    let _ = entity.find_one_cached_by_id("1", None).await.expect("populate 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("populate 2");
    let _ = entity.find_one_cached_by_id("1", None).await.expect("reload 1");

    assert_eq!(collection.fetch_count(), 3);
}

#[tokio::test]
async fn find_one_is_an_uncached_passthrough() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1" }]).await;

    let _ = entity.find_one(&doc! { "_id": "1" }, None).await.expect("first read");
    let _ = entity.find_one(&doc! { "_id": "1" }, None).await.expect("second read");

    assert_eq!(collection.fetch_count(), 2);
}

#[tokio::test]
async fn selector_key_derivation_uses_string_ids_only() {
    let (entity, collection) = seeded_entity(vec![doc! { "_id": "1" }, doc! { "_id": "2" }]).await;

    let _ = entity.find_one_cached_by_id("1", None).await.expect("populate 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("populate 2");

    // A numeric `_id` cannot be mapped onto the string key space; the
    // entity falls back to clearing the whole loader.
    assert_eq!(string_id(&doc! { "_id": 7 }), None);
    entity
        .update_one(&doc! { "_id": 7 }, &doc! { "$set": { "n": 1 } }, None)
        .await
        .expect("update");

    let _ = entity.find_one_cached_by_id("1", None).await.expect("reload 1");
    let _ = entity.find_one_cached_by_id("2", None).await.expect("reload 2");
    assert_eq!(collection.fetch_count(), 4);
}
