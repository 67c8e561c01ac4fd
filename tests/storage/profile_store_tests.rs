//! ProfileStore tests over a real ItemStore backend.
//!
//! These exercise the single-table layout end to end: items written by one
//! operation must be found by the key conditions and projections of the
//! others. Every test uses a fresh profile id.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use profiles::storage::{KeyScope, ProfileStore, StorageError};
use profiles::{Category, Profile, Segment};

fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, day, 7, 30, 0).unwrap()
}

fn segment(segment_type: &str, day: u32, categories: &[(&str, f64)]) -> Segment {
    let categories: Vec<Category> = categories
        .iter()
        .map(|(id, score)| Category::new(*id, *score))
        .collect();
    Segment {
        segment_type: segment_type.to_string(),
        top_categories: profiles::model::top_categories(&categories),
        categories,
        created_at: ts(day),
        updated_at: ts(day),
        expires_at: ts(day + 10),
    }
}

fn profile(segments: Vec<Segment>) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        tags: vec!["sports".to_string(), "music".to_string()],
        segments,
        created_at: ts(1),
        updated_at: ts(2),
        expires_at: ts(28),
    }
}

// =============================================================================
// Profile tests
// =============================================================================

pub async fn test_profile_round_trip(store: &ProfileStore) {
    let stored = profile(vec![
        segment("interests", 3, &[("tech", 0.2), ("news", 0.5), ("ent", 0.9)]),
        segment("purchases", 4, &[("books", 1.0)]),
    ]);
    store
        .upsert_profile(&stored)
        .await
        .expect("upsert_profile should succeed");

    let loaded = store
        .get_profile_by_id(&stored.id.to_string())
        .await
        .expect("profile should exist");
    assert_eq!(loaded, stored, "profile should survive the item mapping");
}

pub async fn test_profile_not_found(store: &ProfileStore) {
    let result = store.get_profile_by_id(&Uuid::new_v4().to_string()).await;
    assert!(matches!(result, Err(StorageError::ProfileNotFound)));
}

pub async fn test_profile_ignores_blob(store: &ProfileStore) {
    let stored = profile(vec![segment("interests", 3, &[("tech", 0.2)])]);
    let id = stored.id.to_string();
    store.upsert_profile(&stored).await.unwrap();
    store
        .upsert_blob(&id, json!({"id": id, "segments": []}).to_string().as_bytes())
        .await
        .unwrap();

    let loaded = store.get_profile_by_id(&id).await.unwrap();
    assert_eq!(loaded.segments.len(), 1);
}

pub async fn test_profile_rejects_duplicate_segment(store: &ProfileStore) {
    let stored = profile(vec![
        segment("interests", 3, &[("tech", 0.2)]),
        segment("interests", 3, &[("news", 0.4)]),
    ]);
    let result = store.upsert_profile(&stored).await;
    assert!(matches!(result, Err(StorageError::DuplicateSegment { .. })));

    let missing = store.get_profile_by_id(&stored.id.to_string()).await;
    assert!(matches!(missing, Err(StorageError::ProfileNotFound)));
}

pub async fn test_user_tags(store: &ProfileStore) {
    let stored = profile(Vec::new());
    store.upsert_profile(&stored).await.unwrap();

    let tags = store.get_user_tags(&stored.id.to_string()).await.unwrap();
    assert_eq!(tags, ["sports", "music"]);

    let missing = store.get_user_tags(&Uuid::new_v4().to_string()).await;
    assert!(matches!(missing, Err(StorageError::ProfileNotFound)));
}

// =============================================================================
// Segment tests
// =============================================================================

pub async fn test_segment_lookup(store: &ProfileStore) {
    let stored = profile(vec![
        segment("interests", 3, &[("tech", 0.2)]),
        segment("interests_extra", 4, &[("news", 0.4)]),
    ]);
    let id = stored.id.to_string();
    store.upsert_profile(&stored).await.unwrap();

    let found = store
        .get_segment(&id, "interests", KeyScope::Prefix)
        .await
        .expect("single segment of the type should be found");
    assert_eq!(found, stored.segments[0]);

    let exact = store
        .get_segment(&id, "interests_extra", KeyScope::Exact(ts(4)))
        .await
        .unwrap();
    assert_eq!(exact, stored.segments[1]);

    let wrong_time = store
        .get_segment(&id, "interests", KeyScope::Exact(ts(5)))
        .await;
    assert!(matches!(wrong_time, Err(e) if e.is_not_found()));

    let unknown = store.get_segment(&id, "other", KeyScope::Prefix).await;
    assert!(matches!(unknown, Err(StorageError::SegmentNotFound { .. })));
}

pub async fn test_segment_ambiguous(store: &ProfileStore) {
    let stored = profile(vec![
        segment("interests", 3, &[("tech", 0.2)]),
        segment("interests", 5, &[("news", 0.4)]),
    ]);
    let id = stored.id.to_string();
    store.upsert_profile(&stored).await.unwrap();

    let result = store.get_segment(&id, "interests", KeyScope::Prefix).await;
    assert!(matches!(
        result,
        Err(StorageError::AmbiguousSegment { count: 2, .. })
    ));
}

pub async fn test_latest_categories(store: &ProfileStore) {
    let stored = profile(vec![
        segment("interests", 3, &[("tech", 0.2)]),
        segment("interests", 6, &[("news", 0.4), ("ent", 0.9)]),
        segment("purchases", 9, &[("books", 1.0)]),
    ]);
    let id = stored.id.to_string();
    store.upsert_profile(&stored).await.unwrap();

    let categories = store.get_categories(&id, "interests").await.unwrap();
    assert_eq!(categories, stored.segments[1].categories);

    let top = store.get_top_categories(&id, "interests").await.unwrap();
    assert_eq!(top, ["ent", "news"]);

    let none = store.get_categories(&id, "unknown").await.unwrap();
    assert!(none.is_empty());

    let missing = store.get_top_categories(&id, "unknown").await;
    assert!(matches!(missing, Err(StorageError::SegmentNotFound { .. })));
}

// =============================================================================
// Blob tests
// =============================================================================

pub async fn test_blob_round_trip(store: &ProfileStore) {
    let id = Uuid::new_v4().to_string();
    let blob = json!({
        "id": id,
        "segments": [{"type": "interests", "labels": ["a", "b"]}],
        "meta": {"source": "import", "active": true}
    });
    store
        .upsert_blob(&id, blob.to_string().as_bytes())
        .await
        .expect("upsert_blob should succeed");

    let raw = store.get_blob(&id).await.unwrap();
    let loaded: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(loaded, blob);

    let raw = store.get_raw_segments_from_blob(&id).await.unwrap();
    let segments: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(segments, blob["segments"]);
}

pub async fn test_blob_missing(store: &ProfileStore) {
    let id = Uuid::new_v4().to_string();
    let result = store.get_blob(&id).await;
    assert!(matches!(result, Err(StorageError::ItemNotFound { .. })));

    store
        .upsert_blob(&id, json!({"id": id}).to_string().as_bytes())
        .await
        .unwrap();
    let result = store.get_raw_segments_from_blob(&id).await;
    assert!(matches!(result, Err(StorageError::NoSegmentsFound)));
}

pub async fn test_blob_rejects_non_json(store: &ProfileStore) {
    let result = store
        .upsert_blob(&Uuid::new_v4().to_string(), b"not json")
        .await;
    assert!(matches!(result, Err(StorageError::InvalidBlob(_))));
}

/// Run all ProfileStore tests against a store built on a backend.
#[macro_export]
macro_rules! run_profile_store_tests {
    ($store:expr) => {
        use $crate::storage::profile_store_tests::*;

        // profile tests
        test_profile_round_trip($store).await;
        println!("  test_profile_round_trip: PASSED");

        test_profile_not_found($store).await;
        println!("  test_profile_not_found: PASSED");

        test_profile_ignores_blob($store).await;
        println!("  test_profile_ignores_blob: PASSED");

        test_profile_rejects_duplicate_segment($store).await;
        println!("  test_profile_rejects_duplicate_segment: PASSED");

        test_user_tags($store).await;
        println!("  test_user_tags: PASSED");

        // segment tests
        test_segment_lookup($store).await;
        println!("  test_segment_lookup: PASSED");

        test_segment_ambiguous($store).await;
        println!("  test_segment_ambiguous: PASSED");

        test_latest_categories($store).await;
        println!("  test_latest_categories: PASSED");

        // blob tests
        test_blob_round_trip($store).await;
        println!("  test_blob_round_trip: PASSED");

        test_blob_missing($store).await;
        println!("  test_blob_missing: PASSED");

        test_blob_rejects_non_json($store).await;
        println!("  test_blob_rejects_non_json: PASSED");
    };
}
