//! Client side of the photo timeline endpoint: the main photo fetch and
//! thumbnail preloading.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use crate::models::photo::{PhotoRecord, TimelinePhoto};

/// Per-user display settings carried with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSettings {
    /// Base of the Immich instance popups link into, if any.
    pub immich_url: Option<String>,
}

/// Parameters of one orchestration run. Reused unchanged by every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineParams {
    pub api_key: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub user_settings: UserSettings,
}

#[derive(Serialize)]
struct TimelineQuery<'a> {
    api_key: &'a str,
    start_date: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<&'a str>,
}

/// Where the orchestrator gets its photo list from.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch_photos(&self, params: &TimelineParams) -> Result<Vec<PhotoRecord>, TransportError>;
}

/// Fetches a thumbnail ahead of marker creation.
#[async_trait]
pub trait ThumbnailLoader: Send + Sync {
    async fn preload(&self, url: &str) -> Result<(), ThumbnailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    Status(StatusCode),

    #[error("Failed to decode photo list: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Thumbnail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Thumbnail returned HTTP {0}")]
    Status(StatusCode),

    #[error("Thumbnail is not a recognised image")]
    NotAnImage,
}

/// HTTP client for the timeline backend's `GET /api/v1/photos`.
pub struct TimelineClient {
    http: reqwest::Client,
    backend_url: String,
}

impl TimelineClient {
    pub fn new(http: reqwest::Client, backend_url: &str) -> Self {
        Self {
            http,
            backend_url: backend_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PhotoSource for TimelineClient {
    async fn fetch_photos(&self, params: &TimelineParams) -> Result<Vec<PhotoRecord>, TransportError> {
        let query = TimelineQuery {
            api_key: &params.api_key,
            start_date: &params.start_date,
            end_date: params.end_date.as_deref(),
        };

        let response = self
            .http
            .get(format!("{}/api/v1/photos", self.backend_url))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status()));
        }

        let body = response.bytes().await?;
        let photos: Vec<TimelinePhoto> = serde_json::from_slice(&body)?;
        let total = photos.len();

        let records: Vec<PhotoRecord> = photos
            .into_iter()
            .filter_map(|photo| {
                let id = photo.id.clone();
                let record = photo.into_record();
                if record.is_none() {
                    tracing::warn!(photo_id = %id, "Skipping photo with unparseable localDateTime");
                }
                record
            })
            .collect();

        tracing::debug!(total, usable = records.len(), "Fetched photo timeline");
        Ok(records)
    }
}

/// Loads thumbnails over HTTP and checks the body is an image.
pub struct HttpThumbnailLoader {
    http: reqwest::Client,
}

impl HttpThumbnailLoader {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ThumbnailLoader for HttpThumbnailLoader {
    async fn preload(&self, url: &str) -> Result<(), ThumbnailError> {
        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ThumbnailError::Status(response.status()));
        }

        let bytes = response.bytes().await?;
        image::guess_format(&bytes).map_err(|_| ThumbnailError::NotAnImage)?;
        Ok(())
    }
}
