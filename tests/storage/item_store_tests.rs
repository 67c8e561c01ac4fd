//! ItemStore interface tests.
//!
//! These tests verify the contract of the ItemStore trait. Every test works
//! in its own fresh partition, so backends may share a table across runs.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use uuid::Uuid;

use profiles::storage::{Item, ItemKey, ItemStore, Projection, Query, StorageError};

fn s(v: &str) -> AttributeValue {
    AttributeValue::S(v.to_string())
}

fn fresh_partition() -> String {
    format!("USER#test_{}", Uuid::new_v4())
}

fn item(pk: &str, sk: &str, attrs: &[(&str, AttributeValue)]) -> Item {
    let mut item = HashMap::from([
        ("pk".to_string(), s(pk)),
        ("sk".to_string(), s(sk)),
    ]);
    for (name, value) in attrs {
        item.insert(name.to_string(), value.clone());
    }
    item
}

fn sort_keys(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .map(|item| match item.get("sk") {
            Some(AttributeValue::S(sk)) => sk.clone(),
            other => panic!("item without string sort key: {:?}", other),
        })
        .collect()
}

// =============================================================================
// ItemStore::get_item tests
// =============================================================================

pub async fn test_get_nonexistent<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    let result = store
        .get_item(&ItemKey::new(pk.clone(), pk), None)
        .await
        .expect("get_item should succeed");
    assert!(result.is_none(), "nonexistent item should be None");
}

pub async fn test_put_and_get<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    let stored = item(
        &pk,
        &pk,
        &[
            ("typ", s("USER")),
            ("tags", AttributeValue::L(vec![s("a"), s("b")])),
            ("ttl", AttributeValue::N("1735689600".to_string())),
        ],
    );
    store
        .put_item(stored.clone())
        .await
        .expect("put_item should succeed");

    let result = store
        .get_item(&ItemKey::new(pk.clone(), pk), None)
        .await
        .expect("get_item should succeed")
        .expect("item should exist");
    assert_eq!(result, stored, "should return the full stored item");
}

pub async fn test_put_replaces<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    store
        .put_item(item(&pk, "SEG#a#1", &[("typ", s("SEG")), ("old", s("x"))]))
        .await
        .unwrap();
    store
        .put_item(item(&pk, "SEG#a#1", &[("typ", s("SEG"))]))
        .await
        .unwrap();

    let result = store
        .get_item(&ItemKey::new(pk, "SEG#a#1"), None)
        .await
        .unwrap()
        .unwrap();
    assert!(
        !result.contains_key("old"),
        "put should replace, not merge, the previous item"
    );
}

// =============================================================================
// Projection tests
// =============================================================================

pub async fn test_get_with_projection<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    store
        .put_item(item(
            &pk,
            &pk,
            &[("typ", s("USER")), ("tags", AttributeValue::L(vec![s("a")]))],
        ))
        .await
        .unwrap();

    let projection = Projection::attributes(["tags", "sk"]);
    let result = store
        .get_item(&ItemKey::new(pk.clone(), pk.clone()), Some(&projection))
        .await
        .unwrap()
        .unwrap();

    let mut names: Vec<&str> = result.keys().map(String::as_str).collect();
    names.sort_unstable();
    assert_eq!(names, ["sk", "tags"], "only projected attributes are read");
}

pub async fn test_get_with_nested_projection<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    let rawdata = AttributeValue::M(HashMap::from([
        ("id".to_string(), s("1")),
        (
            "segments".to_string(),
            AttributeValue::L(vec![AttributeValue::M(HashMap::from([(
                "type".to_string(),
                s("interests"),
            )]))]),
        ),
    ]));
    store
        .put_item(item(&pk, "BLOB#1", &[("typ", s("BLOB")), ("rawdata", rawdata)]))
        .await
        .unwrap();

    let projection = Projection::new().path(["rawdata", "segments"]).path(["sk"]);
    let result = store
        .get_item(&ItemKey::new(pk, "BLOB#1"), Some(&projection))
        .await
        .unwrap()
        .unwrap();

    assert!(!result.contains_key("typ"));
    match result.get("rawdata") {
        Some(AttributeValue::M(raw)) => {
            assert!(raw.contains_key("segments"), "nested path should be kept");
            assert!(!raw.contains_key("id"), "sibling of nested path should be dropped");
        }
        other => panic!("expected projected rawdata map, got {:?}", other),
    }
}

// =============================================================================
// ItemStore::query tests
// =============================================================================

pub async fn test_query_empty_partition<S: ItemStore + ?Sized>(store: &S) {
    let result = store
        .query(&Query::partition(fresh_partition()))
        .await
        .expect("query should succeed");
    assert!(result.is_empty());
}

pub async fn test_query_orders_by_sort_key<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    let other = fresh_partition();
    for sk in ["SEG#b#1", "USER#x", "SEG#a#2", "SEG#a#1"] {
        store.put_item(item(&pk, sk, &[])).await.unwrap();
    }
    store.put_item(item(&other, "SEG#a#1", &[])).await.unwrap();

    let result = store.query(&Query::partition(pk)).await.unwrap();
    assert_eq!(
        sort_keys(&result),
        ["SEG#a#1", "SEG#a#2", "SEG#b#1", "USER#x"],
        "query should stay in its partition, ordered by sort key"
    );
}

pub async fn test_query_begins_with<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    for sk in ["SEG#a#1", "SEG#ab#1", "SEG#a#2", "BLOB#1"] {
        store.put_item(item(&pk, sk, &[])).await.unwrap();
    }

    let result = store
        .query(&Query::begins_with(pk.clone(), "SEG#a#"))
        .await
        .unwrap();
    assert_eq!(sort_keys(&result), ["SEG#a#1", "SEG#a#2"]);

    let result = store
        .query(&Query::begins_with(pk, "SEG#"))
        .await
        .unwrap();
    assert_eq!(result.len(), 3);
}

pub async fn test_query_with_projection<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    store
        .put_item(item(&pk, "SEG#a#1", &[("seg_typ", s("a")), ("cats", s("x"))]))
        .await
        .unwrap();

    let query = Query::begins_with(pk, "SEG#").with_projection(Projection::attributes([
        "seg_typ", "sk",
    ]));
    let result = store.query(&query).await.unwrap();

    assert_eq!(result.len(), 1);
    assert!(result[0].contains_key("seg_typ"));
    assert!(!result[0].contains_key("cats"));
    assert!(!result[0].contains_key("pk"));
}

// =============================================================================
// ItemStore::batch_put tests
// =============================================================================

pub async fn test_batch_put_beyond_single_request<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    let items: Vec<Item> = (0..40)
        .map(|i| item(&pk, &format!("SEG#a#{:03}", i), &[("typ", s("SEG"))]))
        .collect();

    store
        .batch_put(items)
        .await
        .expect("batch_put should succeed");

    let result = store.query(&Query::partition(pk)).await.unwrap();
    assert_eq!(result.len(), 40, "every item of the batch should be written");
}

pub async fn test_batch_put_empty<S: ItemStore + ?Sized>(store: &S) {
    store
        .batch_put(Vec::new())
        .await
        .expect("empty batch_put should succeed");
}

pub async fn test_batch_put_rejects_duplicate_keys<S: ItemStore + ?Sized>(store: &S) {
    let pk = fresh_partition();
    let items = vec![
        item(&pk, "SEG#morning#2024-04-01T07:30:00Z", &[("typ", s("SEG"))]),
        item(&pk, &pk, &[("typ", s("USER"))]),
        item(&pk, "SEG#morning#2024-04-01T07:30:00Z", &[("typ", s("SEG"))]),
    ];

    let result = store.batch_put(items).await;
    assert!(
        matches!(result, Err(StorageError::DuplicateItemKey { .. })),
        "a batch naming one key twice should be rejected, got {:?}",
        result
    );

    let stored = store.query(&Query::partition(pk)).await.unwrap();
    assert!(stored.is_empty(), "a rejected batch should write nothing");
}

/// Run all ItemStore tests against a store implementation.
#[macro_export]
macro_rules! run_item_store_tests {
    ($store:expr) => {
        use $crate::storage::item_store_tests::*;

        // get_item tests
        test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");

        test_put_and_get($store).await;
        println!("  test_put_and_get: PASSED");

        test_put_replaces($store).await;
        println!("  test_put_replaces: PASSED");

        // projection tests
        test_get_with_projection($store).await;
        println!("  test_get_with_projection: PASSED");

        test_get_with_nested_projection($store).await;
        println!("  test_get_with_nested_projection: PASSED");

        // query tests
        test_query_empty_partition($store).await;
        println!("  test_query_empty_partition: PASSED");

        test_query_orders_by_sort_key($store).await;
        println!("  test_query_orders_by_sort_key: PASSED");

        test_query_begins_with($store).await;
        println!("  test_query_begins_with: PASSED");

        test_query_with_projection($store).await;
        println!("  test_query_with_projection: PASSED");

        // batch tests
        test_batch_put_beyond_single_request($store).await;
        println!("  test_batch_put_beyond_single_request: PASSED");

        test_batch_put_empty($store).await;
        println!("  test_batch_put_empty: PASSED");

        test_batch_put_rejects_duplicate_keys($store).await;
        println!("  test_batch_put_rejects_duplicate_keys: PASSED");
    };
}
