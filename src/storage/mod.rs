//! Single-table storage for profiles.
//!
//! Every item belonging to one profile shares the partition key
//! `USER#<profile id>`; the sort key and the `typ` attribute tell the item
//! kinds apart (see [`keys`]). [`ProfileStore`] is the access layer the API
//! talks to. It is written against the [`ItemStore`] trait so the DynamoDB
//! backend and the in-memory mock are interchangeable.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

pub mod dynamo;
pub mod items;
pub mod keys;
pub mod mock;
pub mod profile_store;

pub use dynamo::DynamoItemStore;
pub use keys::{ItemKind, KeyScope};
pub use mock::MockItemStore;
pub use profile_store::ProfileStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A raw stored item: attribute name to DynamoDB attribute value.
pub type Item = HashMap<String, AttributeValue>;

/// Partition key attribute name.
pub const PARTITION_KEY_ATTR: &str = "pk";
/// Sort key attribute name.
pub const SORT_KEY_ATTR: &str = "sk";
/// Item kind discriminator attribute name.
pub const ITEM_TYPE_ATTR: &str = "typ";
/// Expiry attribute name, Unix seconds.
pub const TTL_ATTR: &str = "ttl";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no profile found")]
    ProfileNotFound,

    #[error("no segment found: type={segment_type}")]
    SegmentNotFound { segment_type: String },

    #[error("item not found: pk={partition_key}, sk={sort_key}")]
    ItemNotFound {
        partition_key: String,
        sort_key: String,
    },

    #[error("no segments found")]
    NoSegmentsFound,

    #[error("expected one segment of type {segment_type}, found {count}")]
    AmbiguousSegment { segment_type: String, count: usize },

    #[error("invalid tags")]
    InvalidTags,

    #[error("invalid top categories")]
    InvalidTopCategories,

    #[error("item is missing attribute {0}")]
    MissingAttribute(&'static str),

    #[error("item has no item type attribute")]
    MissingItemType,

    #[error("key of {item_type} item is malformed: pk={partition_key}, sk={sort_key}")]
    InvalidItemKey {
        item_type: ItemKind,
        partition_key: String,
        sort_key: String,
    },

    #[error("duplicate segment: type={segment_type}, created_at={created_at}")]
    DuplicateSegment {
        segment_type: String,
        created_at: String,
    },

    #[error("batch contains duplicate key: pk={partition_key}, sk={sort_key}")]
    DuplicateItemKey {
        partition_key: String,
        sort_key: String,
    },

    #[error("unknown item type: {0}")]
    UnknownItemType(String),

    #[error("ttl out of range: {0}")]
    InvalidTtl(i64),

    #[error("invalid profile id: {0}")]
    InvalidProfileId(#[from] uuid::Error),

    #[error("invalid blob: {0}")]
    InvalidBlob(#[source] serde_json::Error),

    #[error("JSON encoding error: {0}")]
    JsonEncoding(#[from] serde_json::Error),

    #[error("item serialization error: {0}")]
    Serialization(#[from] serde_dynamo::Error),

    #[error("batch write left {count} unprocessed items")]
    UnprocessedItems { count: usize },

    #[error("DynamoDB error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether this error means the requested resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ProfileNotFound
                | StorageError::SegmentNotFound { .. }
                | StorageError::ItemNotFound { .. }
                | StorageError::NoSegmentsFound
        )
    }

    /// Whether this error was caused by caller-supplied data.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidBlob(_) | StorageError::DuplicateSegment { .. }
        )
    }
}

// ============================================================================
// Keys, projections and queries
// ============================================================================

/// Composite primary key of a stored item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub partition_key: String,
    pub sort_key: String,
}

impl ItemKey {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

/// Sort key condition of a partition query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    Equals(String),
    BeginsWith(String),
}

impl SortKeyCondition {
    /// Whether a sort key satisfies this condition.
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            SortKeyCondition::Equals(sk) => sort_key == sk,
            SortKeyCondition::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
        }
    }
}

/// Attribute paths to read instead of the whole item.
///
/// Each path is a list of map keys from the top of the item down, so
/// `["rawdata", "segments"]` selects only the `segments` entry of the
/// `rawdata` map. Projected items keep the nesting of the paths they
/// selected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    paths: Vec<Vec<String>>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project a set of top-level attributes.
    pub fn attributes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(Self::new(), |projection, name| projection.path([name]))
    }

    /// Add a (possibly nested) attribute path.
    pub fn path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if !path.is_empty() {
            self.paths.push(path);
        }
        self
    }

    pub fn paths(&self) -> &[Vec<String>] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// A query over one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub partition_key: String,
    pub sort_key: Option<SortKeyCondition>,
    pub projection: Option<Projection>,
}

impl Query {
    /// Every item in a partition.
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
            projection: None,
        }
    }

    /// Items whose sort key starts with `prefix`.
    pub fn begins_with(partition_key: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(SortKeyCondition::BeginsWith(prefix.into())),
            projection: None,
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

// ============================================================================
// ItemStore
// ============================================================================

/// Key-value backend holding the single table.
///
/// Implementations must support point reads, begins-with range queries on
/// the sort key within a partition, attribute projection including nested
/// map paths, and batched puts. Results of [`ItemStore::query`] are ordered
/// by ascending sort key.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Read one item. `None` when no item has this key.
    ///
    /// With a projection, an existing item that holds none of the projected
    /// attributes is returned as an empty map.
    async fn get_item(&self, key: &ItemKey, projection: Option<&Projection>)
        -> Result<Option<Item>>;

    /// Read every item of a partition matching the query, following
    /// pagination to the end.
    async fn query(&self, query: &Query) -> Result<Vec<Item>>;

    /// Write one item, replacing any item with the same key.
    async fn put_item(&self, item: Item) -> Result<()>;

    /// Write several items. Not atomic: on failure some items may have
    /// been written. A batch naming one key twice fails with
    /// [`StorageError::DuplicateItemKey`] and writes nothing.
    async fn batch_put(&self, items: Vec<Item>) -> Result<()>;
}

/// First key that occurs more than once in a batch of items.
///
/// DynamoDB rejects a batch write that names the same key twice, so every
/// backend refuses such a batch before writing anything.
pub fn duplicate_key(items: &[Item]) -> Option<ItemKey> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(item_key)
        .find(|key| !seen.insert(key.clone()))
}

/// Extract the primary key of a raw item.
pub fn item_key(item: &Item) -> Option<ItemKey> {
    match (item.get(PARTITION_KEY_ATTR), item.get(SORT_KEY_ATTR)) {
        (Some(AttributeValue::S(pk)), Some(AttributeValue::S(sk))) => {
            Some(ItemKey::new(pk.clone(), sk.clone()))
        }
        _ => None,
    }
}
