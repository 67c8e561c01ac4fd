//! Canonical profile model.
//!
//! These are the types the REST API speaks and the access layer converts
//! to and from storage items. Wire names are snake_case; timestamps are
//! RFC3339.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of category ids kept in a segment's top categories.
pub const TOP_CATEGORY_COUNT: usize = 3;

/// A user profile and the segments it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    /// Free-form tags. Order carries no meaning.
    pub tags: Vec<String>,
    pub segments: Vec<Segment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A named, timestamped group of scored categories.
///
/// A profile may hold several segments of the same type as long as their
/// `created_at` differ; each one is stored as its own item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub segment_type: String,
    pub categories: Vec<Category>,
    /// Ids of the highest scoring categories, see [`top_categories`].
    pub top_categories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A content category with its affinity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub score: f64,
}

impl Category {
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Derive the top category ids of a segment.
///
/// Returns at most [`TOP_CATEGORY_COUNT`] ids ordered by descending score.
/// The sort is stable, so categories with equal scores keep their incoming
/// order.
pub fn top_categories(categories: &[Category]) -> Vec<String> {
    let mut ranked: Vec<&Category> = categories.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
        .into_iter()
        .take(TOP_CATEGORY_COUNT)
        .map(|c| c.id.clone())
        .collect()
}
