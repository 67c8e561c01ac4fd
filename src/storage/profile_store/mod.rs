//! Profile access layer over an [`ItemStore`].

use std::collections::HashSet;
use std::sync::Arc;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use serde_dynamo::aws_sdk_dynamodb_1::{from_attribute_value, from_item};
use tracing::debug;

use super::items::{
    self, CategoryAttr, SegmentItem, StoredItem, BLOB_SEGMENTS_KEY, CATEGORIES_ATTR, RAW_DATA_ATTR,
    SEGMENT_TYPE_ATTR, TAGS_ATTR, TOP_CATEGORIES_ATTR,
};
use super::keys::{self, KeyScope};
use super::{Item, ItemKey, ItemStore, Projection, Query, Result, StorageError, SORT_KEY_ATTR};
use crate::model::{Category, Profile, Segment};

/// Reads and writes profiles, segments and blobs in the single table.
///
/// Holds the backend behind an `Arc` so one store can be shared by every
/// request handler.
#[derive(Clone)]
pub struct ProfileStore {
    items: Arc<dyn ItemStore>,
}

impl ProfileStore {
    pub fn new(items: Arc<dyn ItemStore>) -> Self {
        Self { items }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Write the user item and every segment item of a profile in one batch.
    ///
    /// The batch is not atomic. If it fails some items may already have been
    /// replaced. Two segments of one type created in the same second share
    /// a key and are rejected before anything is written.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let (user, segments) = items::to_storage_items(profile);

        let mut seen = HashSet::new();
        for (segment, item) in profile.segments.iter().zip(&segments) {
            if !seen.insert(item.sk.as_str()) {
                return Err(StorageError::DuplicateSegment {
                    segment_type: segment.segment_type.clone(),
                    created_at: keys::format_timestamp(segment.created_at),
                });
            }
        }

        let mut batch = Vec::with_capacity(segments.len() + 1);
        batch.push(user.to_item()?);
        for segment in &segments {
            batch.push(segment.to_item()?);
        }

        self.items.batch_put(batch).await?;
        debug!(
            profile_id = %profile.id,
            segments = segments.len(),
            "Upserted profile"
        );
        Ok(())
    }

    /// Replace the blob of a profile with a raw JSON document.
    pub async fn upsert_blob(&self, profile_id: &str, data: &[u8]) -> Result<()> {
        let blob = items::to_storage_blob(profile_id, data, Utc::now())?;
        self.items.put_item(blob.to_item()?).await?;
        debug!(profile_id = %profile_id, bytes = data.len(), "Upserted blob");
        Ok(())
    }

    // ========================================================================
    // Profile
    // ========================================================================

    /// Assemble a profile from every item in its partition.
    ///
    /// Blob items are skipped. An item of unknown type fails the read, and
    /// a partition without a user item is not a profile even if it holds
    /// segments.
    pub async fn get_profile_by_id(&self, profile_id: &str) -> Result<Profile> {
        let partition = self
            .items
            .query(&Query::partition(keys::partition_key(profile_id)))
            .await?;

        let mut user = None;
        let mut segments = Vec::new();
        for item in partition {
            match StoredItem::decode(item)? {
                StoredItem::User(u) => user = Some(u),
                StoredItem::Segment(s) => segments.push(s),
                StoredItem::Blob(_) => {}
            }
        }

        let user = user.ok_or(StorageError::ProfileNotFound)?;
        items::to_canonical_profile(user, segments)
    }

    /// Project the tags of a profile's user item.
    pub async fn get_user_tags(&self, profile_id: &str) -> Result<Vec<String>> {
        let key = ItemKey::new(
            keys::partition_key(profile_id),
            keys::user_sort_key(profile_id),
        );
        let mut item = self
            .items
            .get_item(&key, Some(&Projection::attributes([TAGS_ATTR, SORT_KEY_ATTR])))
            .await?
            .ok_or(StorageError::ProfileNotFound)?;

        item.remove(TAGS_ATTR)
            .and_then(string_list)
            .ok_or(StorageError::InvalidTags)
    }

    // ========================================================================
    // Segments
    // ========================================================================

    /// Fetch one segment.
    ///
    /// With [`KeyScope::Exact`] this is a point read of the segment created
    /// at that instant. With [`KeyScope::Prefix`] every segment of the type
    /// is read and exactly one must exist.
    pub async fn get_segment(
        &self,
        profile_id: &str,
        segment_type: &str,
        scope: KeyScope,
    ) -> Result<Segment> {
        let partition_key = keys::partition_key(profile_id);
        let sort_key = keys::segment_sort_key(segment_type, scope);

        match scope {
            KeyScope::Exact(_) => {
                let key = ItemKey::new(partition_key, sort_key);
                let item = self.items.get_item(&key, None).await?.ok_or_else(|| {
                    StorageError::ItemNotFound {
                        partition_key: key.partition_key.clone(),
                        sort_key: key.sort_key.clone(),
                    }
                })?;
                from_item::<SegmentItem>(item)?.to_canonical_segment()
            }
            KeyScope::Prefix => {
                let mut matches = Vec::new();
                for item in self
                    .items
                    .query(&Query::begins_with(partition_key, sort_key))
                    .await?
                {
                    let segment: SegmentItem = from_item(item)?;
                    // A type containing '#' can share this prefix.
                    if segment.seg_typ == segment_type {
                        matches.push(segment);
                    }
                }

                match matches.len() {
                    0 => Err(StorageError::SegmentNotFound {
                        segment_type: segment_type.to_string(),
                    }),
                    1 => matches.remove(0).to_canonical_segment(),
                    count => Err(StorageError::AmbiguousSegment {
                        segment_type: segment_type.to_string(),
                        count,
                    }),
                }
            }
        }
    }

    /// Project the categories of the most recent segment of a type.
    ///
    /// Empty when the profile has no such segment.
    pub async fn get_categories(&self, profile_id: &str, segment_type: &str) -> Result<Vec<Category>> {
        let Some(mut item) = self
            .latest_segment_attribute(profile_id, segment_type, CATEGORIES_ATTR)
            .await?
        else {
            return Ok(Vec::new());
        };

        match item.remove(CATEGORIES_ATTR) {
            Some(value) => {
                let cats: Vec<CategoryAttr> = from_attribute_value(value)?;
                Ok(cats.into_iter().map(Category::from).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Project the top category ids of the most recent segment of a type.
    pub async fn get_top_categories(
        &self,
        profile_id: &str,
        segment_type: &str,
    ) -> Result<Vec<String>> {
        let mut item = self
            .latest_segment_attribute(profile_id, segment_type, TOP_CATEGORIES_ATTR)
            .await?
            .ok_or_else(|| StorageError::SegmentNotFound {
                segment_type: segment_type.to_string(),
            })?;

        item.remove(TOP_CATEGORIES_ATTR)
            .and_then(string_list)
            .ok_or(StorageError::InvalidTopCategories)
    }

    /// Read one attribute of every segment of a type and keep the one with
    /// the greatest sort key, i.e. the latest creation time.
    async fn latest_segment_attribute(
        &self,
        profile_id: &str,
        segment_type: &str,
        attribute: &str,
    ) -> Result<Option<Item>> {
        let query = Query::begins_with(
            keys::partition_key(profile_id),
            keys::segment_sort_key(segment_type, KeyScope::Prefix),
        )
        .with_projection(Projection::attributes([
            attribute,
            SEGMENT_TYPE_ATTR,
            SORT_KEY_ATTR,
        ]));

        let latest = self
            .items
            .query(&query)
            .await?
            .into_iter()
            .filter(|item| {
                matches!(item.get(SEGMENT_TYPE_ATTR), Some(AttributeValue::S(t)) if t == segment_type)
            })
            .max_by(|a, b| sort_key_of(a).cmp(sort_key_of(b)));
        Ok(latest)
    }

    // ========================================================================
    // Blobs
    // ========================================================================

    /// Read a profile's blob back as JSON bytes.
    pub async fn get_blob(&self, profile_id: &str) -> Result<Vec<u8>> {
        let mut item = self
            .get_blob_projection(
                profile_id,
                Projection::attributes([RAW_DATA_ATTR, SORT_KEY_ATTR]),
            )
            .await?;

        let raw = item
            .remove(RAW_DATA_ATTR)
            .ok_or(StorageError::MissingAttribute(RAW_DATA_ATTR))?;
        let value: serde_json::Value = from_attribute_value(raw)?;
        Ok(serde_json::to_vec(&value)?)
    }

    /// Read only the `segments` field of a profile's blob as JSON bytes.
    pub async fn get_raw_segments_from_blob(&self, profile_id: &str) -> Result<Vec<u8>> {
        let mut item = self
            .get_blob_projection(
                profile_id,
                Projection::new()
                    .path([RAW_DATA_ATTR, BLOB_SEGMENTS_KEY])
                    .path([SORT_KEY_ATTR]),
            )
            .await?;

        let segments = match item.remove(RAW_DATA_ATTR) {
            Some(AttributeValue::M(mut raw)) => raw.remove(BLOB_SEGMENTS_KEY),
            _ => None,
        }
        .ok_or(StorageError::NoSegmentsFound)?;

        let value: serde_json::Value = from_attribute_value(segments)?;
        Ok(serde_json::to_vec(&value)?)
    }

    /// Projected read of the blob item. The sort key is always projected
    /// alongside so an existing blob never comes back as no item.
    async fn get_blob_projection(&self, profile_id: &str, projection: Projection) -> Result<Item> {
        let key = ItemKey::new(
            keys::partition_key(profile_id),
            keys::blob_sort_key(profile_id),
        );
        self.items
            .get_item(&key, Some(&projection))
            .await?
            .ok_or(StorageError::ItemNotFound {
                partition_key: key.partition_key,
                sort_key: key.sort_key,
            })
    }
}

fn sort_key_of(item: &Item) -> &str {
    match item.get(SORT_KEY_ATTR) {
        Some(AttributeValue::S(sk)) => sk,
        _ => "",
    }
}

/// Read a list (or string set) attribute holding only strings.
fn string_list(value: AttributeValue) -> Option<Vec<String>> {
    match value {
        AttributeValue::Ss(set) => Some(set),
        AttributeValue::L(list) => list
            .into_iter()
            .map(|v| match v {
                AttributeValue::S(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}
