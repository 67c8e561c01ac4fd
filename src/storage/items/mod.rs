//! Storage items and their conversion to and from the canonical model.
//!
//! Attribute names are kept short since they count against read and write
//! capacity. Items are (de)serialized with `serde_dynamo`:
//!
//! | item    | attributes                                                     |
//! |---------|----------------------------------------------------------------|
//! | user    | pk, sk, typ, id, tags, created_at, updated_at, ttl            |
//! | segment | pk, sk, typ, seg_typ, cats, top_cats, created_at, updated_at, ttl |
//! | blob    | pk, sk, typ, id, ttl, rawdata                                  |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};
use uuid::Uuid;

use super::keys::{self, ItemKind, KeyScope};
use super::{Item, Result, StorageError, ITEM_TYPE_ATTR};
use crate::model::{Category, Profile, Segment};
use crate::validation::months_from;

/// Lifetime of a blob item, counted from its write.
pub const BLOB_TTL_MONTHS: u32 = 12;

/// Attribute holding a segment's categories.
pub const CATEGORIES_ATTR: &str = "cats";
/// Attribute holding a segment's top category ids.
pub const TOP_CATEGORIES_ATTR: &str = "top_cats";
/// Attribute holding a segment's type.
pub const SEGMENT_TYPE_ATTR: &str = "seg_typ";
/// Attribute holding a user's tags.
pub const TAGS_ATTR: &str = "tags";
/// Attribute holding a blob's JSON document.
pub const RAW_DATA_ATTR: &str = "rawdata";
/// Key of the segments list inside a blob document.
pub const BLOB_SEGMENTS_KEY: &str = "segments";

// ============================================================================
// Item types
// ============================================================================

/// The user item of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserItem {
    pub pk: String,
    pub sk: String,
    pub typ: String,
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl: i64,
}

/// One segment of a profile, keyed by type and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentItem {
    pub pk: String,
    pub sk: String,
    pub typ: String,
    pub seg_typ: String,
    #[serde(default)]
    pub cats: Vec<CategoryAttr>,
    #[serde(default)]
    pub top_cats: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl: i64,
}

/// A category as stored inside a segment item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAttr {
    pub id: String,
    pub score: f64,
}

/// A raw JSON document attached to a profile.
///
/// `rawdata` is stored as a native map rather than a string so nested
/// fields can be projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobItem {
    pub pk: String,
    pub sk: String,
    pub typ: String,
    pub id: String,
    pub ttl: i64,
    pub rawdata: serde_json::Value,
}

impl From<&Category> for CategoryAttr {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id.clone(),
            score: c.score,
        }
    }
}

impl From<CategoryAttr> for Category {
    fn from(c: CategoryAttr) -> Self {
        Category::new(c.id, c.score)
    }
}

impl UserItem {
    pub fn from_profile(profile: &Profile) -> Self {
        let id = profile.id.to_string();
        Self {
            pk: keys::partition_key(&id),
            sk: keys::user_sort_key(&id),
            typ: ItemKind::User.prefix().to_string(),
            tags: profile.tags.clone(),
            created_at: profile.created_at,
            updated_at: profile.updated_at,
            ttl: profile.expires_at.timestamp(),
            id,
        }
    }

    pub fn to_item(&self) -> Result<Item> {
        Ok(to_item(self)?)
    }
}

impl SegmentItem {
    /// Build the item of one segment, keyed by its own creation time.
    pub fn from_segment(profile_id: &str, segment: &Segment) -> Self {
        Self {
            pk: keys::partition_key(profile_id),
            sk: keys::segment_sort_key(
                &segment.segment_type,
                KeyScope::Exact(segment.created_at),
            ),
            typ: ItemKind::Segment.prefix().to_string(),
            seg_typ: segment.segment_type.clone(),
            cats: segment.categories.iter().map(CategoryAttr::from).collect(),
            top_cats: segment.top_categories.clone(),
            created_at: segment.created_at,
            updated_at: segment.updated_at,
            ttl: segment.expires_at.timestamp(),
        }
    }

    pub fn to_canonical_segment(self) -> Result<Segment> {
        Ok(Segment {
            segment_type: self.seg_typ,
            categories: self.cats.into_iter().map(Category::from).collect(),
            top_categories: self.top_cats,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: from_ttl(self.ttl)?,
        })
    }

    pub fn to_item(&self) -> Result<Item> {
        Ok(to_item(self)?)
    }
}

impl BlobItem {
    pub fn to_item(&self) -> Result<Item> {
        Ok(to_item(self)?)
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Split a profile into its user item and one item per segment.
pub fn to_storage_items(profile: &Profile) -> (UserItem, Vec<SegmentItem>) {
    let id = profile.id.to_string();
    let segments = profile
        .segments
        .iter()
        .map(|s| SegmentItem::from_segment(&id, s))
        .collect();
    (UserItem::from_profile(profile), segments)
}

/// Assemble a profile from its user item and segment items.
///
/// `expires_at` comes from the user item's TTL and so has whole-second
/// precision.
pub fn to_canonical_profile(user: UserItem, segments: Vec<SegmentItem>) -> Result<Profile> {
    let id = Uuid::parse_str(&user.id)?;
    let segments = segments
        .into_iter()
        .map(SegmentItem::to_canonical_segment)
        .collect::<Result<Vec<_>>>()?;

    Ok(Profile {
        id,
        tags: user.tags,
        segments,
        created_at: user.created_at,
        updated_at: user.updated_at,
        expires_at: from_ttl(user.ttl)?,
    })
}

/// Build the blob item of a profile from raw JSON bytes.
///
/// Any valid JSON is accepted. The TTL is always [`BLOB_TTL_MONTHS`] from
/// `now`.
pub fn to_storage_blob(profile_id: &str, data: &[u8], now: DateTime<Utc>) -> Result<BlobItem> {
    let rawdata: serde_json::Value =
        serde_json::from_slice(data).map_err(StorageError::InvalidBlob)?;

    Ok(BlobItem {
        pk: keys::partition_key(profile_id),
        sk: keys::blob_sort_key(profile_id),
        typ: ItemKind::Blob.prefix().to_string(),
        id: profile_id.to_string(),
        ttl: months_from(now, BLOB_TTL_MONTHS).timestamp(),
        rawdata,
    })
}

fn from_ttl(ttl: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ttl, 0).ok_or(StorageError::InvalidTtl(ttl))
}

// ============================================================================
// Tagged decode
// ============================================================================

/// A raw item decoded according to its `typ` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredItem {
    User(UserItem),
    Segment(SegmentItem),
    Blob(BlobItem),
}

impl StoredItem {
    /// Read the item type first, then decode the matching variant.
    ///
    /// Items without a string `typ` or with an unknown one are rejected.
    pub fn decode(item: Item) -> Result<Self> {
        let kind = match item.get(ITEM_TYPE_ATTR) {
            Some(aws_sdk_dynamodb::types::AttributeValue::S(typ)) => {
                ItemKind::classify(typ).ok_or_else(|| StorageError::UnknownItemType(typ.clone()))?
            }
            _ => return Err(StorageError::MissingItemType),
        };

        let stored = match kind {
            ItemKind::User => StoredItem::User(from_item(item)?),
            ItemKind::Segment => StoredItem::Segment(from_item(item)?),
            ItemKind::Blob => StoredItem::Blob(from_item(item)?),
        };
        stored.check_key()?;
        Ok(stored)
    }

    /// Verify the keys are well formed and that the sort key prefix agrees
    /// with `typ`.
    fn check_key(&self) -> Result<()> {
        let (pk, sk) = match self {
            StoredItem::User(item) => (&item.pk, &item.sk),
            StoredItem::Segment(item) => (&item.pk, &item.sk),
            StoredItem::Blob(item) => (&item.pk, &item.sk),
        };
        let sort_kind = keys::parse_sort_key(sk).map(|key| key.kind);
        if keys::parse_partition_key(pk).is_none() || sort_kind != Some(self.kind()) {
            return Err(StorageError::InvalidItemKey {
                item_type: self.kind(),
                partition_key: pk.clone(),
                sort_key: sk.clone(),
            });
        }
        Ok(())
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            StoredItem::User(_) => ItemKind::User,
            StoredItem::Segment(_) => ItemKind::Segment,
            StoredItem::Blob(_) => ItemKind::Blob,
        }
    }
}
