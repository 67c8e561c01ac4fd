//! Composite key codec.
//!
//! Key layout:
//! - partition key: `USER#{profile_id}` for every item of a profile
//! - user item sort key: `USER#{profile_id}`
//! - segment item sort key: `SEG#{segment_type}#{created_at}` (RFC3339, UTC, seconds)
//! - blob item sort key: `BLOB#{profile_id}`

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// Separator between key components.
pub const KEY_SEPARATOR: char = '#';

/// Kind of a stored item. Also the prefix of its sort key and the value of
/// its `typ` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    User,
    Segment,
    Blob,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::User, ItemKind::Segment, ItemKind::Blob];

    pub fn prefix(self) -> &'static str {
        match self {
            ItemKind::User => "USER",
            ItemKind::Segment => "SEG",
            ItemKind::Blob => "BLOB",
        }
    }

    /// Classify an item type attribute by its prefix.
    pub fn classify(item_type: &str) -> Option<ItemKind> {
        Self::ALL
            .into_iter()
            .find(|kind| item_type.starts_with(kind.prefix()))
    }

    fn from_prefix(prefix: &str) -> Option<ItemKind> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Which segment items of a given type a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// The one segment created at this instant.
    Exact(DateTime<Utc>),
    /// Every segment of the type, whatever its creation time.
    Prefix,
}

impl From<Option<DateTime<Utc>>> for KeyScope {
    fn from(created_at: Option<DateTime<Utc>>) -> Self {
        created_at.map_or(KeyScope::Prefix, KeyScope::Exact)
    }
}

/// A parsed sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub kind: ItemKind,
    pub discriminator: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Build the partition key shared by every item of a profile.
pub fn partition_key(profile_id: &str) -> String {
    format!("{}{}{}", ItemKind::User.prefix(), KEY_SEPARATOR, profile_id)
}

/// Build an untimestamped sort key.
pub fn sort_key(kind: ItemKind, discriminator: &str) -> String {
    format!("{}{}{}", kind.prefix(), KEY_SEPARATOR, discriminator)
}

/// Build a sort key carrying a timestamp component.
pub fn timestamped_sort_key(kind: ItemKind, discriminator: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        sort_key(kind, discriminator),
        KEY_SEPARATOR,
        format_timestamp(timestamp)
    )
}

/// Build the range-query prefix matching every timestamped key of a
/// discriminator.
///
/// The prefix ends with the separator, so the prefix for `morning` does not
/// match keys of a `morningside` discriminator.
pub fn sort_key_prefix(kind: ItemKind, discriminator: &str) -> String {
    format!("{}{}", sort_key(kind, discriminator), KEY_SEPARATOR)
}

/// Build the sort key (or key prefix) of a segment item.
pub fn segment_sort_key(segment_type: &str, scope: KeyScope) -> String {
    match scope {
        KeyScope::Exact(created_at) => {
            timestamped_sort_key(ItemKind::Segment, segment_type, created_at)
        }
        KeyScope::Prefix => sort_key_prefix(ItemKind::Segment, segment_type),
    }
}

/// Sort key of the user item.
pub fn user_sort_key(profile_id: &str) -> String {
    sort_key(ItemKind::User, profile_id)
}

/// Sort key of the blob item.
pub fn blob_sort_key(profile_id: &str) -> String {
    sort_key(ItemKind::Blob, profile_id)
}

/// Render a key timestamp: RFC3339, UTC, whole seconds.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Extract the profile id from a partition key.
pub fn parse_partition_key(key: &str) -> Option<&str> {
    let (prefix, id) = key.split_once(KEY_SEPARATOR)?;
    (prefix == ItemKind::User.prefix() && !id.is_empty()).then_some(id)
}

/// Parse a sort key back into its components.
///
/// User and blob keys carry no timestamp. For segment keys the timestamp
/// follows the last separator, so segment types may themselves contain `#`.
pub fn parse_sort_key(key: &str) -> Option<SortKey> {
    let (prefix, rest) = key.split_once(KEY_SEPARATOR)?;
    let kind = ItemKind::from_prefix(prefix)?;

    match kind {
        ItemKind::Segment => {
            let (discriminator, ts) = rest.rsplit_once(KEY_SEPARATOR)?;
            let timestamp = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
            Some(SortKey {
                kind,
                discriminator: discriminator.to_string(),
                timestamp: Some(timestamp),
            })
        }
        ItemKind::User | ItemKind::Blob => Some(SortKey {
            kind,
            discriminator: rest.to_string(),
            timestamp: None,
        }),
    }
}
