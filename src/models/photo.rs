use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::window::parse_local_timestamp;

/// Kind of media item. Only affects the popup label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    #[strum(to_string = "IMAGE", serialize = "PHOTO")]
    Image,
    #[strum(to_string = "VIDEO", serialize = "LIVE")]
    Video,
}

/// One geotagged media item from the remote photo service.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: String,
    pub captured_at: NaiveDateTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub media_type: MediaType,
    pub original_file_name: String,
    pub thumbnail_ref: String,
}

impl PhotoRecord {
    /// Coordinates, only when both halves are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// "City, State, Country" from whichever parts exist.
    pub fn location_label(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Enforces the both-or-neither coordinate invariant.
pub(crate) fn paired_coordinates(lat: Option<f64>, lon: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (lat, lon) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => (None, None),
    }
}

/// Location block of a timeline photo on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExifInfo {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Photo object served by `GET /api/v1/photos` on the timeline backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePhoto {
    pub id: String,
    #[serde(default)]
    pub exif_info: ExifInfo,
    pub local_date_time: String,
    pub original_file_name: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

impl From<&PhotoRecord> for TimelinePhoto {
    fn from(record: &PhotoRecord) -> Self {
        Self {
            id: record.id.clone(),
            exif_info: ExifInfo {
                latitude: record.latitude,
                longitude: record.longitude,
                city: record.city.clone(),
                state: record.state.clone(),
                country: record.country.clone(),
            },
            local_date_time: record.captured_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            original_file_name: record.original_file_name.clone(),
            media_type: record.media_type,
        }
    }
}

impl TimelinePhoto {
    /// Convert to a record. Returns `None` when the timestamp is unusable.
    ///
    /// Thumbnails are addressed by photo id on the backend, so the id
    /// doubles as the thumbnail reference.
    pub fn into_record(self) -> Option<PhotoRecord> {
        let captured_at = parse_local_timestamp(&self.local_date_time)?;
        let (latitude, longitude) =
            paired_coordinates(self.exif_info.latitude, self.exif_info.longitude);

        Some(PhotoRecord {
            thumbnail_ref: self.id.clone(),
            id: self.id,
            captured_at,
            latitude,
            longitude,
            city: self.exif_info.city,
            state: self.exif_info.state,
            country: self.exif_info.country,
            media_type: self.media_type,
            original_file_name: self.original_file_name,
        })
    }
}
