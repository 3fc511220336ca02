use axum::routing::get;
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod photos;

/// API routes served by the timeline backend.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/photos", get(photos::list_photos))
        .route("/api/v1/photos/{id}/thumbnail.jpg", get(photos::thumbnail))
        .with_state(state)
}
