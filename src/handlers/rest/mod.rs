//! REST API for profiles.
//!
//! Endpoints:
//! - `GET /health` - liveness check
//! - `PUT /api/v1/profile` - upsert a profile, defaults filled server side
//! - `PUT /api/v1/blob` - upsert the raw JSON blob of a profile
//! - `GET /api/v1/profile/{id}` - full profile
//! - `GET /api/v1/profile/{id}/tags` - profile tags
//! - `GET /api/v1/profile/{id}/segment/{segmentType}?createdAt=` - one segment
//! - `GET /api/v1/profile/{id}/segment/{segmentType}/categories` - latest categories
//! - `GET /api/v1/profile/{id}/segment/{segmentType}/topcategories` - latest top categories
//! - `GET /api/v1/blob/{id}` - blob bytes, as a base64 JSON string
//! - `GET /api/v1/blob/{id}/segments` - the blob's `segments` field

mod error;

pub use error::ApiError;

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{Category, Profile, Segment};
use crate::storage::{KeyScope, ProfileStore};
use crate::validation::{normalize_profile, ProfileInput};

/// Base path of every API route.
pub const API_BASE_PATH: &str = "/api/v1";

/// Shared state for axum handlers.
type AppState = Arc<ProfileStore>;

/// Start the REST server on `addr` and run until `shutdown` resolves.
///
/// When the port is 0, the OS assigns an ephemeral port. The actual bound
/// address is always logged so it can be discovered.
pub async fn serve<F>(
    store: Arc<ProfileStore>,
    addr: &str,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(address = %local, "profiles REST API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("profiles REST API stopped");
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(store: Arc<ProfileStore>) -> Router {
    let api = Router::new()
        .route("/profile", put(upsert_profile))
        .route("/profile/:id", get(get_profile))
        .route("/profile/:id/tags", get(get_tags))
        .route("/profile/:id/segment/:segment_type", get(get_segment))
        .route(
            "/profile/:id/segment/:segment_type/categories",
            get(get_categories),
        )
        .route(
            "/profile/:id/segment/:segment_type/topcategories",
            get(get_top_categories),
        )
        .route("/blob", put(upsert_blob))
        .route("/blob/:id", get(get_blob))
        .route("/blob/:id/segments", get(get_blob_segments));

    Router::new()
        .route("/health", get(health))
        .nest(API_BASE_PATH, api)
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn upsert_profile(
    State(store): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let input: ProfileInput = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("error decoding profile", e.to_string()))?;

    let profile = normalize_profile(input, Utc::now());
    store
        .upsert_profile(&profile)
        .await
        .map_err(|e| ApiError::from_storage("error upserting profile", e))?;

    debug!(profile_id = %profile.id, "profile upserted");
    Ok((StatusCode::CREATED, Json(profile)))
}

/// The only field a blob must carry.
#[derive(Deserialize)]
struct BlobEnvelope {
    id: Uuid,
}

async fn upsert_blob(
    State(store): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let envelope: BlobEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("error decoding blob", e.to_string()))?;

    let profile_id = envelope.id.to_string();
    store
        .upsert_blob(&profile_id, &body)
        .await
        .map_err(|e| ApiError::from_storage("error upserting blob", e))?;

    debug!(profile_id = %profile_id, bytes = body.len(), "blob upserted");
    Ok(StatusCode::CREATED)
}

async fn get_profile(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    let id = required("id", id)?;
    let profile = store
        .get_profile_by_id(&id)
        .await
        .map_err(|e| ApiError::from_storage("error getting profile", e))?;
    Ok(Json(profile))
}

async fn get_tags(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let id = required("id", id)?;
    let tags = store
        .get_user_tags(&id)
        .await
        .map_err(|e| ApiError::from_storage("error getting tags", e))?;
    Ok(Json(tags))
}

#[derive(Debug, Deserialize)]
struct SegmentParams {
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
}

async fn get_segment(
    State(store): State<AppState>,
    Path((id, segment_type)): Path<(String, String)>,
    Query(params): Query<SegmentParams>,
) -> Result<Json<Segment>, ApiError> {
    let id = required("id", id)?;
    let segment_type = required("segmentType", segment_type)?;

    let scope = match params.created_at.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => {
            let created_at = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                ApiError::bad_request(
                    "failed parsing created at timestamp",
                    format!("invalid createdAt '{}': {}", raw, e),
                )
            })?;
            KeyScope::Exact(created_at.with_timezone(&Utc))
        }
        None => KeyScope::Prefix,
    };

    let segment = store
        .get_segment(&id, &segment_type, scope)
        .await
        .map_err(|e| ApiError::from_storage("error getting segment", e))?;
    Ok(Json(segment))
}

async fn get_categories(
    State(store): State<AppState>,
    Path((id, segment_type)): Path<(String, String)>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let id = required("id", id)?;
    let segment_type = required("segmentType", segment_type)?;
    let categories = store
        .get_categories(&id, &segment_type)
        .await
        .map_err(|e| ApiError::from_storage("error getting categories", e))?;
    Ok(Json(categories))
}

async fn get_top_categories(
    State(store): State<AppState>,
    Path((id, segment_type)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, ApiError> {
    let id = required("id", id)?;
    let segment_type = required("segmentType", segment_type)?;
    let top = store
        .get_top_categories(&id, &segment_type)
        .await
        .map_err(|e| ApiError::from_storage("error getting top categories", e))?;
    Ok(Json(top))
}

async fn get_blob(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<String>, ApiError> {
    let id = required("id", id)?;
    let blob = store
        .get_blob(&id)
        .await
        .map_err(|e| ApiError::from_storage("error getting blob", e))?;
    Ok(Json(BASE64.encode(blob)))
}

async fn get_blob_segments(
    State(store): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = required("id", id)?;
    let segments = store
        .get_raw_segments_from_blob(&id)
        .await
        .map_err(|e| ApiError::from_storage("error getting segments from blob", e))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], segments))
}

fn required(name: &str, value: String) -> Result<String, ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(
            "missing path parameter",
            format!("{} is required", name),
        ));
    }
    Ok(value)
}
