use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::clock::SystemClock;
use crate::services::photoprism::{build_http_client, RemotePhotoFetcher};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub photos: Arc<RemotePhotoFetcher>,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(photos: RemotePhotoFetcher, api_key: &str) -> Self {
        Self {
            photos: Arc::new(photos),
            api_key: Arc::from(api_key),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = build_http_client(config.http_timeout_secs)?;
        let photos = RemotePhotoFetcher::new(
            http,
            config.photoprism_url.clone(),
            config.photoprism_api_key.clone(),
            Arc::new(SystemClock),
        )
        .with_preview_token(config.photoprism_preview_token.clone())
        .with_max_records(config.max_records);

        Ok(Self::new(photos, &config.api_key))
    }
}
