use chrono::FixedOffset;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::services::markers::ViewerZone;
use crate::services::orchestrator::Concurrency;
use crate::services::photoprism::DEFAULT_MAX_RECORDS;

/// Server configuration for the photo timeline endpoint.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Key callers must present as the `api_key` query parameter
    pub api_key: String,

    /// PhotoPrism base URL. Checked per request, not at startup.
    pub photoprism_url: Option<String>,

    /// PhotoPrism API token
    pub photoprism_api_key: Option<String>,

    /// Preview token used in PhotoPrism thumbnail URLs
    #[serde(default = "default_preview_token")]
    pub photoprism_preview_token: String,

    /// Pagination safety cap
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_preview_token() -> String {
    "public".to_string()
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

/// Configuration for the `map_client` binary, read from `MAP_*` variables.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Timeline backend base URL (e.g., "http://localhost:3000")
    pub backend_url: String,

    pub api_key: String,

    #[serde(default = "default_start_date")]
    pub start_date: String,

    pub end_date: Option<String>,

    /// Immich instance the popup deep-links point at. Without it popups
    /// carry no link.
    pub immich_url: Option<String>,

    /// Cap on concurrent thumbnail preloads. Absent means unlimited.
    pub thumbnail_concurrency: Option<usize>,

    /// Viewer time zone as an IANA name (e.g., "Europe/Amsterdam").
    pub timezone: Option<String>,

    /// Fixed viewer UTC offset as `+HH:MM`, used when no zone name is set.
    /// Without either, the host's zone applies.
    pub utc_offset: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    #[error("Unknown time zone {0:?}")]
    UnknownTimezone(String),

    #[error("Invalid UTC offset {raw:?}: {source}")]
    InvalidOffset {
        raw: String,
        #[source]
        source: chrono::ParseError,
    },
}

fn default_start_date() -> String {
    "1970-01-01".to_string()
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("MAP_").from_env()
    }

    pub fn concurrency(&self) -> Concurrency {
        match self.thumbnail_concurrency {
            Some(limit) if limit > 0 => Concurrency::Limited(limit),
            _ => Concurrency::Unlimited,
        }
    }

    /// Zone used for Immich day ranges: `timezone`, then `utc_offset`,
    /// then the host's zone.
    pub fn zone(&self) -> Result<ViewerZone, ZoneError> {
        if let Some(raw) = self.timezone.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            return raw
                .parse::<Tz>()
                .map(ViewerZone::Named)
                .map_err(|_| ZoneError::UnknownTimezone(raw.to_string()));
        }

        match self.utc_offset.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => raw
                .parse::<FixedOffset>()
                .map(ViewerZone::Fixed)
                .map_err(|source| ZoneError::InvalidOffset {
                    raw: raw.to_string(),
                    source,
                }),
            None => Ok(ViewerZone::Local),
        }
    }
}
