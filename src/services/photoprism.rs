//! PhotoPrism client
//!
//! Pages through `GET {base}/api/v1/photos` and narrows the result to a
//! [`FetchWindow`]. Paging is strictly sequential: each request's offset
//! assumes the previous page has been consumed.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::models::photo::{paired_coordinates, MediaType, PhotoRecord};
use crate::models::window::{parse_local_timestamp, FetchWindow, PageCursor};
use crate::services::clock::Clock;
use crate::services::markers::is_path_safe_id;

/// Records requested per page.
pub const PAGE_SIZE: usize = 1000;

/// Offset at which paging stops even if the service keeps returning data.
pub const DEFAULT_MAX_RECORDS: usize = 1_000_000;

/// Thumbnail size requested from PhotoPrism.
const THUMBNAIL_SIZE: &str = "tile_224";

/// Why paging ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStop {
    /// The service returned an empty page.
    Exhausted,
    /// The offset reached the safety cap.
    SafetyCap,
    /// The service answered with a non-success status.
    Status(StatusCode),
}

/// Raw photo entry from PhotoPrism's search API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhotoprismPhoto {
    #[serde(rename = "UID")]
    pub uid: String,
    pub taken_at_local: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub place_city: Option<String>,
    pub place_state: Option<String>,
    pub place_country: Option<String>,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    pub original_name: Option<String>,
    pub file_name: Option<String>,
    pub hash: Option<String>,
}

impl PhotoprismPhoto {
    /// Normalise into a [`PhotoRecord`]. `None` when `TakenAtLocal` is unusable.
    pub fn to_record(&self) -> Option<PhotoRecord> {
        let captured_at = parse_local_timestamp(&self.taken_at_local)?;

        // PhotoPrism reports 0/0 for photos without a location
        let (latitude, longitude) = match paired_coordinates(self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat == 0.0 && lng == 0.0 => (None, None),
            pair => pair,
        };

        let media_type = self
            .kind
            .as_deref()
            .and_then(|kind| MediaType::from_str(kind).ok())
            .unwrap_or(MediaType::Image);

        let original_file_name = non_empty(&self.original_name)
            .or_else(|| non_empty(&self.file_name))
            .unwrap_or(self.uid.as_str())
            .to_string();

        Some(PhotoRecord {
            id: self.uid.clone(),
            captured_at,
            latitude,
            longitude,
            city: known_place(&self.place_city),
            state: known_place(&self.place_state),
            country: known_place(&self.place_country),
            media_type,
            original_file_name,
            thumbnail_ref: non_empty(&self.hash).unwrap_or(self.uid.as_str()).to_string(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn known_place(value: &Option<String>) -> Option<String> {
    non_empty(value)
        .filter(|v| !v.eq_ignore_ascii_case("unknown") && !v.eq_ignore_ascii_case("zz"))
        .map(str::to_string)
}

/// Everything the service returned, before window filtering.
#[derive(Debug)]
pub struct RawFetch {
    pub photos: Vec<PhotoprismPhoto>,
    pub pages: usize,
    pub stop: PageStop,
}

/// Window-filtered records plus how paging ended.
#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<PhotoRecord>,
    pub stop: PageStop,
    /// Raw entries dropped for an unparseable capture timestamp.
    pub unparseable: usize,
}

impl FetchOutcome {
    /// True only when paging ran until the service had nothing more.
    pub fn is_complete(&self) -> bool {
        self.stop == PageStop::Exhausted
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Configuration error: {0}")]
    Configuration(&'static str),

    #[error("HTTP request to PhotoPrism failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode PhotoPrism response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("PhotoPrism returned HTTP {0}")]
    Status(StatusCode),

    #[error("Photo {0} has no thumbnail")]
    NoThumbnail(String),

    #[error("Photo id {0:?} is not a usable path segment")]
    InvalidPhotoId(String),
}

#[derive(Deserialize)]
struct PhotoDetail {
    #[serde(rename = "Hash")]
    hash: Option<String>,
    #[serde(rename = "Files", default)]
    files: Vec<PhotoFile>,
}

#[derive(Deserialize)]
struct PhotoFile {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Primary", default)]
    primary: bool,
}

impl PhotoDetail {
    fn thumbnail_hash(self) -> Option<String> {
        let mut files = self.files;
        let primary = files.iter().position(|file| file.primary).unwrap_or(0);
        if primary < files.len() {
            return Some(files.swap_remove(primary).hash);
        }
        self.hash.filter(|hash| !hash.is_empty())
    }
}

/// Build the shared HTTP client for outbound PhotoPrism calls.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("photo-timeline-map/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// Client for one user's PhotoPrism instance.
pub struct RemotePhotoFetcher {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    preview_token: String,
    max_records: usize,
    clock: Arc<dyn Clock>,
}

impl RemotePhotoFetcher {
    pub fn new(
        http: reqwest::Client,
        base_url: Option<String>,
        api_key: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            preview_token: "public".to_string(),
            max_records: DEFAULT_MAX_RECORDS,
            clock,
        }
    }

    pub fn with_preview_token(mut self, token: impl Into<String>) -> Self {
        self.preview_token = token.into();
        self
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    /// Returns `(base_url, api_key)`, or the first missing piece.
    fn credentials(&self) -> Result<(&str, &str), FetchError> {
        let api_key = non_empty(&self.api_key)
            .ok_or(FetchError::Configuration("PhotoPrism API key is missing"))?;
        let base_url = non_empty(&self.base_url)
            .ok_or(FetchError::Configuration("PhotoPrism URL is missing"))?;
        Ok((base_url.trim_end_matches('/'), api_key))
    }

    /// Fetch photos and keep those captured inside `window`.
    ///
    /// An open-ended window is evaluated against the clock once, after all
    /// pages have arrived.
    pub async fn fetch(&self, window: &FetchWindow) -> Result<FetchOutcome, FetchError> {
        let raw = self.retrieve(window).await?;
        let now = self.clock.now_local();
        let (records, unparseable) = filter_window(&raw.photos, window, now);

        if unparseable > 0 {
            tracing::warn!(unparseable, "Dropped photos with unparseable TakenAtLocal");
        }

        tracing::info!(
            raw = raw.photos.len(),
            kept = records.len(),
            pages = raw.pages,
            stop = ?raw.stop,
            "PhotoPrism fetch complete"
        );

        Ok(FetchOutcome {
            records,
            stop: raw.stop,
            unparseable,
        })
    }

    /// Page through the service until it runs dry, errors, or hits the cap.
    pub async fn retrieve(&self, window: &FetchWindow) -> Result<RawFetch, FetchError> {
        let (base_url, api_key) = self.credentials()?;
        let url = endpoint(base_url, &["api", "v1", "photos"])?;

        let mut cursor = PageCursor::new(PAGE_SIZE, self.max_records);
        let mut photos = Vec::new();
        let mut pages = 0;

        let stop = loop {
            if cursor.is_exhausted() {
                tracing::warn!(offset = cursor.offset(), "PhotoPrism paging hit the safety cap");
                break PageStop::SafetyCap;
            }

            let response = self
                .http
                .get(url.clone())
                .bearer_auth(api_key)
                .header(ACCEPT, "application/json")
                .query(&page_params(window, &cursor))
                .send()
                .await?;
            pages += 1;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(
                    offset = cursor.offset(),
                    status = %status,
                    "PhotoPrism page request failed, returning partial results"
                );
                metrics::counter!("photoprism_fetch_truncated_total").increment(1);
                break PageStop::Status(status);
            }

            let body = response.bytes().await?;
            let page: Vec<PhotoprismPhoto> = serde_json::from_slice(&body)?;

            metrics::counter!("photoprism_pages_fetched_total").increment(1);
            metrics::counter!("photoprism_records_fetched_total").increment(page.len() as u64);
            tracing::debug!(offset = cursor.offset(), count = page.len(), "Fetched PhotoPrism page");

            if page.is_empty() {
                break PageStop::Exhausted;
            }

            photos.extend(page);
            cursor.advance();
        };

        Ok(RawFetch {
            photos,
            pages,
            stop,
        })
    }

    /// Check PhotoPrism is reachable with the configured credentials.
    pub async fn health_check(&self) -> Result<(), FetchError> {
        let (base_url, api_key) = self.credentials()?;

        let response = self
            .http
            .get(endpoint(base_url, &["api", "v1", "status"])?)
            .bearer_auth(api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        Ok(())
    }

    /// Download the small JPEG preview for one photo.
    pub async fn thumbnail(&self, photo_id: &str) -> Result<Vec<u8>, FetchError> {
        let (base_url, api_key) = self.credentials()?;
        if !is_path_safe_id(photo_id) {
            return Err(FetchError::InvalidPhotoId(photo_id.to_string()));
        }

        let response = self
            .http
            .get(endpoint(base_url, &["api", "v1", "photos", photo_id])?)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let detail: PhotoDetail = serde_json::from_slice(&response.bytes().await?)?;
        let hash = detail
            .thumbnail_hash()
            .ok_or_else(|| FetchError::NoThumbnail(photo_id.to_string()))?;

        let response = self
            .http
            .get(endpoint(
                base_url,
                &["api", "v1", "t", hash.as_str(), self.preview_token.as_str(), THUMBNAIL_SIZE],
            )?)
            .bearer_auth(api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// `base_url` with `segments` appended, each encoded as one path segment.
fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, FetchError> {
    let mut url = Url::parse(base_url)
        .map_err(|_| FetchError::Configuration("PhotoPrism URL is invalid"))?;
    url.path_segments_mut()
        .map_err(|()| FetchError::Configuration("PhotoPrism URL is invalid"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn page_params(window: &FetchWindow, cursor: &PageCursor) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", String::new()),
        ("public", "true".to_string()),
        ("quality", "3".to_string()),
        ("after", window.after_param()),
    ];

    if let Some(offset) = cursor.query_offset() {
        params.push(("offset", offset.to_string()));
    }
    params.push(("count", cursor.page_size().to_string()));

    if let Some(before) = window.before_param() {
        params.push(("before", before));
    }

    params
}

/// Keep photos captured inside the inclusive window.
///
/// Returns the kept records and how many entries had no usable timestamp.
pub fn filter_window(
    photos: &[PhotoprismPhoto],
    window: &FetchWindow,
    now: chrono::NaiveDateTime,
) -> (Vec<PhotoRecord>, usize) {
    let mut unparseable = 0;
    let records = photos
        .iter()
        .filter_map(|photo| {
            let record = photo.to_record();
            if record.is_none() {
                unparseable += 1;
            }
            record
        })
        .filter(|record| window.contains(record.captured_at, now))
        .collect();

    (records, unparseable)
}
