//! Normalization of inbound profiles.
//!
//! Profiles arriving over the API may leave out their id, timestamps and
//! expiries. [`normalize_profile`] fills those in before anything is
//! persisted. It is a default-filler, not a validator: beyond what JSON
//! decoding enforces, nothing is rejected.
//!
//! A field counts as unset when it is absent, `null`, or holds its zero
//! value: the nil UUID, or the zero instant `0001-01-01T00:00:00Z`.

use chrono::{DateTime, Months, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::model::{top_categories, Category, Profile, Segment};

/// Default lifetime of a profile with no explicit expiry.
pub const PROFILE_TTL_MONTHS: u32 = 12;
/// Default lifetime of a segment with no explicit expiry.
pub const SEGMENT_TTL_MONTHS: u32 = 6;

/// A profile as submitted by a client, before defaults are applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileInput {
    pub id: Option<Uuid>,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub segments: Vec<SegmentInput>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A segment as submitted by a client, before defaults are applied.
///
/// Submitted `top_categories` are accepted but discarded; they are always
/// recomputed from `categories`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SegmentInput {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub segment_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub categories: Vec<Category>,
    #[serde(deserialize_with = "null_as_default")]
    pub top_categories: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Profile> for ProfileInput {
    fn from(profile: Profile) -> Self {
        Self {
            id: Some(profile.id),
            tags: profile.tags,
            segments: profile.segments.into_iter().map(SegmentInput::from).collect(),
            created_at: Some(profile.created_at),
            updated_at: Some(profile.updated_at),
            expires_at: Some(profile.expires_at),
        }
    }
}

impl From<Segment> for SegmentInput {
    fn from(segment: Segment) -> Self {
        Self {
            segment_type: segment.segment_type,
            categories: segment.categories,
            top_categories: segment.top_categories,
            created_at: Some(segment.created_at),
            updated_at: Some(segment.updated_at),
            expires_at: Some(segment.expires_at),
        }
    }
}

/// Fill every unset field of an inbound profile.
///
/// - a missing or nil id gets a fresh v4 UUID
/// - unset `created_at` / `updated_at` default to `now`
/// - an unset profile expiry defaults to [`PROFILE_TTL_MONTHS`] from `now`
/// - each segment defaults independently, with [`SEGMENT_TTL_MONTHS`] expiry
///
/// `now` and every expiry are truncated to whole seconds, the precision the
/// store keeps, so the result reads back unchanged.
///
/// Idempotent: normalizing an already complete profile returns it unchanged.
pub fn normalize_profile(input: ProfileInput, now: DateTime<Utc>) -> Profile {
    let now = now.trunc_subsecs(0);
    let id = match input.id {
        Some(id) if !id.is_nil() => id,
        _ => Uuid::new_v4(),
    };

    Profile {
        id,
        tags: input.tags,
        segments: input
            .segments
            .into_iter()
            .map(|s| normalize_segment(s, now))
            .collect(),
        created_at: set_or(input.created_at, now),
        updated_at: set_or(input.updated_at, now),
        expires_at: set_or(input.expires_at, months_from(now, PROFILE_TTL_MONTHS))
            .trunc_subsecs(0),
    }
}

/// Fill every unset field of an inbound segment.
pub fn normalize_segment(input: SegmentInput, now: DateTime<Utc>) -> Segment {
    let now = now.trunc_subsecs(0);
    Segment {
        top_categories: top_categories(&input.categories),
        segment_type: input.segment_type,
        categories: input.categories,
        created_at: set_or(input.created_at, now),
        updated_at: set_or(input.updated_at, now),
        expires_at: set_or(input.expires_at, months_from(now, SEGMENT_TTL_MONTHS))
            .trunc_subsecs(0),
    }
}

/// Whether a timestamp is the zero instant, `0001-01-01T00:00:00Z`.
pub fn is_zero_instant(timestamp: DateTime<Utc>) -> bool {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).single() == Some(timestamp)
}

fn set_or(timestamp: Option<DateTime<Utc>>, default: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .filter(|ts| !is_zero_instant(*ts))
        .unwrap_or(default)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Calendar months after `from`, clamped to the end of shorter months.
pub fn months_from(from: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    from.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
