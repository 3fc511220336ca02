//! Photo map orchestration
//!
//! One run fetches the timeline, preloads every thumbnail, waits for all
//! preloads to settle, then attaches the markers as a single layer. Failed
//! fetches are retried as a whole after a fixed delay. The loading
//! indicator is attached when the run starts and removed exactly once when
//! it ends, whatever the outcome.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::sleep;

use crate::models::photo::PhotoRecord;
use crate::services::map::{LoadingIndicator, MapWidget, MarkerLayer, MessageKind, Notifier};
use crate::services::markers::{MarkerError, MarkerFactory, ViewerZone};
use crate::services::timeline::{PhotoSource, ThumbnailLoader, TimelineParams, TransportError};

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(3000);
/// How long the "done" checkmark stays up before the indicator goes away.
pub const DONE_DWELL: Duration = Duration::from_millis(1000);

const FETCH_FAILED: &str = "Failed to fetch photos";
const FETCH_EXHAUSTED: &str = "Failed to fetch photos after multiple attempts";

/// Cap on concurrent thumbnail preloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    #[default]
    Unlimited,
    Limited(usize),
}

impl Concurrency {
    fn limit(self, jobs: usize) -> usize {
        match self {
            Concurrency::Unlimited => jobs.max(1),
            Concurrency::Limited(limit) => limit.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub done_dwell: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: RETRY_DELAY,
            done_dwell: DONE_DWELL,
        }
    }
}

/// Retry bookkeeping for one run. Dropped when the run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_retries: u32,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
        }
    }

    /// Zero-based index of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }

    pub fn advance(&mut self) {
        self.attempt += 1;
    }
}

/// What a successful run rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub photos: usize,
    pub markers: usize,
    pub failed_thumbnails: usize,
    pub without_location: usize,
    pub attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Failed to fetch photos after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Marker(#[from] MarkerError),
}

/// Drives fetch, thumbnail preload, marker render and retries for a map.
pub struct PhotoMapOrchestrator<S, L> {
    source: S,
    loader: L,
    backend_url: String,
    zone: ViewerZone,
    policy: RetryPolicy,
    concurrency: Concurrency,
}

impl<S: PhotoSource, L: ThumbnailLoader> PhotoMapOrchestrator<S, L> {
    pub fn new(source: S, loader: L, backend_url: &str, zone: ViewerZone) -> Self {
        Self {
            source,
            loader,
            backend_url: backend_url.to_string(),
            zone,
            policy: RetryPolicy::default(),
            concurrency: Concurrency::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Render the photos for `params` onto `map` through `layer`.
    ///
    /// Holding `&mut` on both the map and the layer keeps a second run off
    /// the same map for as long as this one, retries included, is alive.
    pub async fn run<M, N>(
        &self,
        map: &mut M,
        layer: &mut MarkerLayer,
        notifier: &N,
        params: &TimelineParams,
    ) -> Result<RenderSummary, OrchestrationError>
    where
        M: MapWidget + ?Sized,
        N: Notifier + ?Sized,
    {
        let factory = MarkerFactory::new(
            &self.backend_url,
            &params.api_key,
            params.user_settings.immich_url.as_deref(),
            self.zone,
        )?;

        let mut indicator = LoadingIndicator::attach(map);
        let mut retry = RetryState::new(self.policy.max_retries);

        let outcome = loop {
            match self.attempt(map, layer, &factory, params).await {
                Ok(mut summary) => {
                    summary.attempts = retry.attempt() + 1;
                    break Ok(summary);
                }
                Err(error) => {
                    tracing::error!(attempt = retry.attempt(), error = %error, "Error fetching photos");
                    notifier.show_message(MessageKind::Error, FETCH_FAILED);

                    if !retry.can_retry() {
                        notifier.show_message(MessageKind::Error, FETCH_EXHAUSTED);
                        break Err(OrchestrationError::ExhaustedRetries {
                            attempts: retry.attempt() + 1,
                            source: error,
                        });
                    }

                    retry.advance();
                    tracing::warn!(
                        "Retrying in {} seconds... (Attempt {}/{})",
                        self.policy.delay.as_secs(),
                        retry.attempt(),
                        self.policy.max_retries
                    );
                    sleep(self.policy.delay).await;
                }
            }
        };

        if let Ok(summary) = &outcome {
            tracing::info!(
                markers = summary.markers,
                failed_thumbnails = summary.failed_thumbnails,
                without_location = summary.without_location,
                attempts = summary.attempts,
                "Photo markers rendered"
            );
            indicator.mark_done(map);
            sleep(self.policy.done_dwell).await;
        }

        indicator.remove(map);
        outcome
    }

    async fn attempt<M>(
        &self,
        map: &mut M,
        layer: &mut MarkerLayer,
        factory: &MarkerFactory,
        params: &TimelineParams,
    ) -> Result<RenderSummary, TransportError>
    where
        M: MapWidget + ?Sized,
    {
        let photos = self.source.fetch_photos(params).await?;
        layer.clear_layers();

        let total = photos.len();
        let loaded = self.preload_all(photos, factory).await;
        let failed_thumbnails = total - loaded.len();

        let mut without_location = 0;
        for record in &loaded {
            match factory.build(record) {
                Some(marker) => layer.add_layer(marker),
                None => without_location += 1,
            }
        }

        if !map.has_layer(layer.id()) {
            layer.add_to(map);
        }

        Ok(RenderSummary {
            photos: total,
            markers: layer.len(),
            failed_thumbnails,
            without_location,
            attempts: 0,
        })
    }

    /// Preload every thumbnail and wait for all of them to settle.
    ///
    /// Returns the records whose thumbnail loaded, in input order. A failed
    /// preload is logged and its record dropped; it never fails the batch.
    async fn preload_all(&self, photos: Vec<PhotoRecord>, factory: &MarkerFactory) -> Vec<PhotoRecord> {
        let limit = self.concurrency.limit(photos.len());
        let loader = &self.loader;

        stream::iter(photos)
            .map(|record| async move {
                let Some(url) = factory.thumbnail_url(&record) else {
                    tracing::error!(photo_id = %record.id, "Failed to load photo: bad thumbnail URL");
                    return None;
                };

                match loader.preload(url.as_str()).await {
                    Ok(()) => Some(record),
                    Err(error) => {
                        tracing::error!(photo_id = %record.id, error = %error, "Failed to load photo");
                        None
                    }
                }
            })
            .buffered(limit)
            .filter_map(|loaded| async move { loaded })
            .collect()
            .await
    }
}
