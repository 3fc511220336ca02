//! Shared test helpers: an in-process fake PhotoPrism and recording fakes
//! for the orchestrator seams.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDateTime;
use serde_json::{json, Value};

use photo_timeline_map::models::photo::{MediaType, PhotoRecord};
use photo_timeline_map::models::window::parse_local_timestamp;
use photo_timeline_map::services::map::{MessageKind, Notifier};
use photo_timeline_map::services::timeline::{
    PhotoSource, ThumbnailError, ThumbnailLoader, TimelineParams, TransportError,
};

/// Smallest byte prefix `image::guess_format` recognises as JPEG.
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

/// Bind a router to an ephemeral port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Test server error");
    });

    format!("http://{}", addr)
}

pub fn local(raw: &str) -> NaiveDateTime {
    parse_local_timestamp(raw).expect("valid test timestamp")
}

/// PhotoPrism search entry as the real API returns it.
pub fn photoprism_photo(uid: &str, taken_at_local: &str) -> Value {
    json!({
        "UID": uid,
        "Type": "image",
        "TakenAtLocal": taken_at_local,
        "Lat": 52.3676,
        "Lng": 4.9041,
        "PlaceCity": "Amsterdam",
        "PlaceState": "North Holland",
        "PlaceCountry": "nl",
        "OriginalName": format!("{}.jpg", uid),
        "FileName": format!("2024/01/{}.jpg", uid),
        "Hash": format!("hash-{}", uid),
    })
}

/// A full page of photos captured on the given day.
pub fn full_page(prefix: &str, day: &str, size: usize) -> Vec<Value> {
    (0..size)
        .map(|i| photoprism_photo(&format!("{}{}", prefix, i), &format!("{}T12:00:00Z", day)))
        .collect()
}

pub enum PageReply {
    Photos(Vec<Value>),
    Status(StatusCode),
}

type PageFn = dyn Fn(usize) -> PageReply + Send + Sync;

/// Scripted PhotoPrism. Pages are chosen by offset.
pub struct FakePhotoprism {
    pub requests: Mutex<Vec<HashMap<String, String>>>,
    pub headers: Mutex<Vec<HeaderMap>>,
    /// Photo ids requested through the detail route, decoded.
    pub details: Mutex<Vec<String>>,
    page_for: Box<PageFn>,
}

impl FakePhotoprism {
    pub fn new(page_for: impl Fn(usize) -> PageReply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            headers: Mutex::new(Vec::new()),
            details: Mutex::new(Vec::new()),
            page_for: Box::new(page_for),
        })
    }

    /// Serve `pages` in order, then empty pages.
    pub fn with_pages(pages: Vec<Vec<Value>>) -> Arc<Self> {
        Self::new(move |offset| {
            let index = offset / 1000;
            PageReply::Photos(pages.get(index).cloned().unwrap_or_default())
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/api/v1/photos", get(search))
            .route("/api/v1/photos/{uid}", get(detail))
            .route("/api/v1/t/{hash}/{token}/{size}", get(thumb))
            .route("/api/v1/status", get(|| async { Json(json!({"status": "operational"})) }))
            .with_state(Arc::clone(self))
    }

    pub async fn spawn(self: &Arc<Self>) -> String {
        spawn_server(self.router()).await
    }
}

async fn search(
    State(fake): State<Arc<FakePhotoprism>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let offset = params
        .get("offset")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    fake.requests.lock().unwrap().push(params);
    fake.headers.lock().unwrap().push(headers);

    match (fake.page_for)(offset) {
        PageReply::Photos(photos) => Json(photos).into_response(),
        PageReply::Status(status) => status.into_response(),
    }
}

async fn detail(State(fake): State<Arc<FakePhotoprism>>, Path(uid): Path<String>) -> Response {
    fake.details.lock().unwrap().push(uid.clone());
    if uid == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "UID": uid,
        "Files": [{ "Hash": format!("hash-{}", uid), "Primary": true }],
    }))
    .into_response()
}

async fn thumb(Path((hash, _token, _size)): Path<(String, String, String)>) -> Response {
    if hash.starts_with("hash-") {
        ([(axum::http::header::CONTENT_TYPE, "image/jpeg")], JPEG_BYTES.to_vec()).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Photo record with a location in Amsterdam.
pub fn record(id: &str) -> PhotoRecord {
    PhotoRecord {
        id: id.to_string(),
        captured_at: local("2024-01-15T12:00:00"),
        latitude: Some(52.3676),
        longitude: Some(4.9041),
        city: Some("Amsterdam".to_string()),
        state: None,
        country: Some("Netherlands".to_string()),
        media_type: MediaType::Image,
        original_file_name: format!("{}.jpg", id),
        thumbnail_ref: id.to_string(),
    }
}

pub fn params() -> TimelineParams {
    TimelineParams {
        api_key: "test-key".to_string(),
        start_date: "2024-01-01".to_string(),
        end_date: Some("2024-01-31".to_string()),
        user_settings: photo_timeline_map::services::timeline::UserSettings {
            immich_url: Some("https://immich.example".to_string()),
        },
    }
}

/// Photo source replaying scripted replies; the last reply repeats.
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Result<Vec<PhotoRecord>, StatusCode>>>,
    pub calls: Mutex<Vec<(tokio::time::Instant, TimelineParams)>>,
}

impl ScriptedSource {
    pub fn new(replies: Vec<Result<Vec<PhotoRecord>, StatusCode>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }
}

#[async_trait]
impl PhotoSource for ScriptedSource {
    async fn fetch_photos(&self, params: &TimelineParams) -> Result<Vec<PhotoRecord>, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((tokio::time::Instant::now(), params.clone()));

        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front().expect("non-empty")
        } else {
            replies.front().cloned().expect("at least one scripted reply")
        };

        reply.map_err(TransportError::Status)
    }
}

/// Thumbnail loader failing for URLs of the given photo ids.
#[derive(Default)]
pub struct FakeLoader {
    failing: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub loaded: AtomicUsize,
}

impl FakeLoader {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ThumbnailLoader for FakeLoader {
    async fn preload(&self, url: &str) -> Result<(), ThumbnailError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failed = self
            .failing
            .iter()
            .any(|id| url.contains(&format!("/photos/{}/", id)));
        if failed {
            return Err(ThumbnailError::NotAnImage);
        }

        self.loaded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(MessageKind, String)>>,
}

impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn show_message(&self, kind: MessageKind, text: &str) {
        self.messages.lock().unwrap().push((kind, text.to_string()));
    }
}
