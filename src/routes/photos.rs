use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderName, StatusCode};
use axum::Json;
use garde::Validate;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::models::photo::TimelinePhoto;
use crate::models::window::FetchWindow;
use crate::services::photoprism::FetchError;

const DEFAULT_START_DATE: &str = "1970-01-01";

/// Set to "false" when PhotoPrism paging stopped before running dry.
pub const PHOTOS_COMPLETE_HEADER: &str = "x-photos-complete";

#[derive(Debug, Deserialize, Validate)]
pub struct PhotosQuery {
    #[garde(length(min = 1, max = 512))]
    pub api_key: String,

    #[garde(skip)]
    pub start_date: Option<String>,

    #[garde(skip)]
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ThumbnailQuery {
    #[garde(length(min = 1, max = 512))]
    pub api_key: String,
}

/// Compare keys without exiting at the first differing byte. Only the
/// length is observable through timing.
fn keys_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn authorize(state: &AppState, api_key: &str) -> Result<(), StatusCode> {
    if keys_match(api_key, &state.api_key) {
        Ok(())
    } else {
        tracing::warn!("Rejected request with invalid api_key");
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn status_for(error: &FetchError) -> StatusCode {
    match error {
        FetchError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FetchError::InvalidPhotoId(_) => StatusCode::BAD_REQUEST,
        FetchError::NoThumbnail(_) => StatusCode::NOT_FOUND,
        FetchError::Status(status) if *status == StatusCode::NOT_FOUND => StatusCode::NOT_FOUND,
        FetchError::Http(_) | FetchError::Decode(_) | FetchError::Status(_) => StatusCode::BAD_GATEWAY,
    }
}

/// GET /api/v1/photos: photos captured inside the requested window.
pub async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<PhotosQuery>,
) -> Result<([(&'static str, &'static str); 1], Json<Vec<TimelinePhoto>>), StatusCode> {
    query.validate().map_err(|e| {
        tracing::warn!(error = %e, "Invalid photos query");
        StatusCode::BAD_REQUEST
    })?;
    authorize(&state, &query.api_key)?;

    metrics::counter!("photo_timeline_requests_total").increment(1);

    let window = FetchWindow::parse(
        query.start_date.as_deref().unwrap_or(DEFAULT_START_DATE),
        query.end_date.as_deref(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Invalid photo window");
        StatusCode::BAD_REQUEST
    })?;

    let outcome = state.photos.fetch(&window).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch photos from PhotoPrism");
        status_for(&e)
    })?;

    let complete = if outcome.is_complete() { "true" } else { "false" };
    let photos = outcome.records.iter().map(TimelinePhoto::from).collect();

    Ok(([(PHOTOS_COMPLETE_HEADER, complete)], Json(photos)))
}

/// GET /api/v1/photos/{id}/thumbnail.jpg: proxied PhotoPrism preview.
pub async fn thumbnail(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    Query(query): Query<ThumbnailQuery>,
) -> Result<([(HeaderName, &'static str); 2], Vec<u8>), StatusCode> {
    query.validate().map_err(|_| StatusCode::BAD_REQUEST)?;
    authorize(&state, &query.api_key)?;

    let bytes = state.photos.thumbnail(&photo_id).await.map_err(|e| {
        tracing::warn!(photo_id = %photo_id, error = %e, "Failed to load thumbnail");
        status_for(&e)
    })?;

    Ok((
        [
            (CONTENT_TYPE, "image/jpeg"),
            (CACHE_CONTROL, "private, max-age=86400"),
        ],
        bytes,
    ))
}
