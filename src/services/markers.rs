use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Url;

use crate::models::marker::{Marker, MarkerIcon, Popup};
use crate::models::photo::{MediaType, PhotoRecord};

const ICON_SIZE: u32 = 48;
const ICON_CLASS: &str = "photo-marker";

/// The viewer's time zone, used to turn a capture day into a UTC range.
///
/// Capture times are wall-clock local, so each day boundary is resolved
/// with the zone rules in force on that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerZone {
    Fixed(FixedOffset),
    Named(Tz),
    /// The host's zone.
    Local,
}

#[derive(Debug, Clone, Copy)]
enum DayEdge {
    Start,
    End,
}

impl ViewerZone {
    fn to_utc(&self, local: NaiveDateTime, edge: DayEdge) -> Option<DateTime<Utc>> {
        match self {
            ViewerZone::Fixed(offset) => resolve(offset, local, edge),
            ViewerZone::Named(tz) => resolve(tz, local, edge),
            ViewerZone::Local => resolve(&Local, local, edge),
        }
    }
}

/// Map a wall-clock time to an instant. A repeated hour resolves to the
/// outer instant of the day; a skipped hour moves to the edge of the gap.
fn resolve<Z: TimeZone>(zone: &Z, local: NaiveDateTime, edge: DayEdge) -> Option<DateTime<Utc>> {
    let resolved = match edge {
        DayEdge::Start => zone
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| zone.from_local_datetime(&(local + TimeDelta::hours(1))).earliest()),
        DayEdge::End => zone
            .from_local_datetime(&local)
            .latest()
            .or_else(|| zone.from_local_datetime(&(local - TimeDelta::hours(1))).latest()),
    };
    resolved.map(|at| at.with_timezone(&Utc))
}

/// Builds map markers and popups for photo records.
///
/// The factory never touches map state; the orchestrator decides what gets
/// attached.
#[derive(Debug, Clone)]
pub struct MarkerFactory {
    backend_url: String,
    api_key: String,
    immich_url: Option<Url>,
    zone: ViewerZone,
}

#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("Invalid {name} URL {url:?}: {reason}")]
    InvalidUrl {
        name: &'static str,
        url: String,
        reason: String,
    },
}

impl MarkerFactory {
    /// Only the backend URL is required. A blank or unusable Immich URL
    /// leaves popups without a deep link.
    pub fn new(
        backend_url: &str,
        api_key: &str,
        immich_url: Option<&str>,
        zone: ViewerZone,
    ) -> Result<Self, MarkerError> {
        Url::parse(backend_url).map_err(|e| MarkerError::InvalidUrl {
            name: "backend",
            url: backend_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            immich_url: immich_base(immich_url),
            zone,
        })
    }

    pub fn thumbnail_url(&self, record: &PhotoRecord) -> Option<Url> {
        thumbnail_url(&self.backend_url, &record.thumbnail_ref, &self.api_key)
    }

    /// Build the marker for one record, or `None` when it has no complete
    /// coordinate pair.
    pub fn build(&self, record: &PhotoRecord) -> Option<Marker> {
        let (latitude, longitude) = record.coordinates()?;
        let thumbnail_url = self.thumbnail_url(record)?.to_string();
        let deep_link = self.deep_link(record.captured_at);

        let title = record.original_file_name.clone();
        let taken_label = record.captured_at.format("%d/%m/%Y, %H:%M:%S").to_string();
        let location_label = record.location_label();
        let media_label = media_label(record.media_type).to_string();

        let icon = MarkerIcon {
            class_name: ICON_CLASS.to_string(),
            html: format!(
                r#"<img src="{}" style="width: {size}px; height: {size}px;">"#,
                escape_html(&thumbnail_url),
                size = ICON_SIZE
            ),
            size: [ICON_SIZE, ICON_SIZE],
        };

        let html = popup_html(
            deep_link.as_deref(),
            &thumbnail_url,
            &title,
            &taken_label,
            location_label.as_deref(),
            &media_label,
        );

        Some(Marker {
            photo_id: record.id.clone(),
            latitude,
            longitude,
            thumbnail_url,
            icon,
            popup: Popup {
                deep_link,
                title,
                taken_label,
                location_label,
                media_label,
                html,
            },
        })
    }

    /// Immich search link covering the whole local day of the capture.
    pub fn deep_link(&self, captured_at: NaiveDateTime) -> Option<String> {
        let base = self.immich_url.as_ref()?;

        let day = captured_at.date();
        let start = self.zone.to_utc(day.and_time(NaiveTime::MIN), DayEdge::Start)?;
        let end = self
            .zone
            .to_utc(day.and_hms_milli_opt(23, 59, 59, 999)?, DayEdge::End)?;

        let query = serde_json::json!({
            "takenAfter": utc_iso(start),
            "takenBefore": utc_iso(end),
        })
        .to_string();

        let mut url = base.clone();
        url.path_segments_mut().ok()?.pop_if_empty().push("search");
        url.query_pairs_mut().append_pair("query", &query);
        Some(url.into())
    }
}

fn immich_base(raw: Option<&str>) -> Option<Url> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    match Url::parse(raw) {
        Ok(url) if !url.cannot_be_a_base() => Some(url),
        Ok(_) => {
            tracing::warn!(immich_url = raw, "Immich URL cannot carry a path, popups get no link");
            None
        }
        Err(e) => {
            tracing::warn!(immich_url = raw, error = %e, "Invalid Immich URL, popups get no link");
            None
        }
    }
}

fn utc_iso(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Whether `photo_id` can stand as a single URL path segment.
pub fn is_path_safe_id(photo_id: &str) -> bool {
    !matches!(photo_id, "" | "." | "..")
}

/// Backend thumbnail URL for a photo id. The id is encoded as one path
/// segment.
pub fn thumbnail_url(backend_url: &str, photo_id: &str, api_key: &str) -> Option<Url> {
    if !is_path_safe_id(photo_id) {
        return None;
    }

    let mut url = Url::parse(backend_url).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(["api", "v1", "photos", photo_id, "thumbnail.jpg"]);
    url.query_pairs_mut().append_pair("api_key", api_key);
    Some(url)
}

fn media_label(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Video => "🎥 Video",
        MediaType::Image => "📷 Photo",
    }
}

fn popup_html(
    deep_link: Option<&str>,
    thumbnail_url: &str,
    title: &str,
    taken_label: &str,
    location_label: Option<&str>,
    media_label: &str,
) -> String {
    let location = location_label
        .map(|label| format!("\n  <p>Location: {}</p>", escape_html(label)))
        .unwrap_or_default();

    let image = format!(
        r#"<img src="{}" class="mb-2 rounded" alt="{}">"#,
        escape_html(thumbnail_url),
        escape_html(title)
    );
    let image = match deep_link {
        Some(link) => format!(
            "<a href=\"{}\" target=\"_blank\">\n    {}\n  </a>",
            escape_html(link),
            image
        ),
        None => image,
    };

    format!(
        r#"<div class="max-w-xs">
  {image}
  <h3 class="font-bold">{title}</h3>
  <p>Taken: {taken}</p>{location}
  {media}
</div>"#,
        image = image,
        title = escape_html(title),
        taken = escape_html(taken_label),
        location = location,
        media = media_label,
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::window::parse_local_timestamp;

    fn factory_in(zone: ViewerZone) -> MarkerFactory {
        MarkerFactory::new(
            "http://localhost:3000/",
            "secret key",
            Some("https://immich.example"),
            zone,
        )
        .unwrap()
    }

    fn factory() -> MarkerFactory {
        factory_in(ViewerZone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap()))
    }

    fn taken_range(link: &str) -> serde_json::Value {
        let url = Url::parse(link).unwrap();
        assert_eq!(url.path(), "/search");
        let (_, query) = url.query_pairs().find(|(key, _)| key == "query").unwrap();
        serde_json::from_str(&query).unwrap()
    }

    fn record() -> PhotoRecord {
        PhotoRecord {
            id: "pq1".to_string(),
            captured_at: parse_local_timestamp("2024-07-14T16:20:05").unwrap(),
            latitude: Some(48.8584),
            longitude: Some(2.2945),
            city: Some("Paris".to_string()),
            state: None,
            country: Some("France".to_string()),
            media_type: MediaType::Image,
            original_file_name: "IMG_<1>.jpg".to_string(),
            thumbnail_ref: "pq1".to_string(),
        }
    }

    #[test]
    fn test_marker_carries_position_and_thumbnail() {
        let marker = factory().build(&record()).unwrap();

        assert_eq!(marker.latitude, 48.8584);
        assert_eq!(marker.longitude, 2.2945);
        assert_eq!(
            marker.thumbnail_url,
            "http://localhost:3000/api/v1/photos/pq1/thumbnail.jpg?api_key=secret+key"
        );
        assert_eq!(marker.icon.size, [48, 48]);
        assert_eq!(marker.icon.class_name, "photo-marker");
    }

    #[test]
    fn test_popup_fields() {
        let marker = factory().build(&record()).unwrap();
        let popup = &marker.popup;

        assert_eq!(popup.title, "IMG_<1>.jpg");
        assert_eq!(popup.taken_label, "14/07/2024, 16:20:05");
        assert_eq!(popup.location_label.as_deref(), Some("Paris, France"));
        assert_eq!(popup.media_label, "📷 Photo");
        assert!(popup.html.contains("IMG_&lt;1&gt;.jpg"));
        assert!(!popup.html.contains("IMG_<1>"));
    }

    #[test]
    fn test_missing_location_parts_omit_line() {
        let mut record = record();
        record.city = None;
        record.country = None;
        record.media_type = MediaType::Video;

        let marker = factory().build(&record).unwrap();

        assert_eq!(marker.popup.location_label, None);
        assert!(!marker.popup.html.contains("Location:"));
        assert_eq!(marker.popup.media_label, "🎥 Video");
        assert_eq!(marker.latitude, 48.8584);
    }

    #[test]
    fn test_no_marker_without_coordinate_pair() {
        let factory = factory();

        let mut only_lat = record();
        only_lat.longitude = None;
        assert!(factory.build(&only_lat).is_none());

        let mut only_lon = record();
        only_lon.latitude = None;
        assert!(factory.build(&only_lon).is_none());

        let mut neither = record();
        neither.latitude = None;
        neither.longitude = None;
        assert!(factory.build(&neither).is_none());
    }

    #[test]
    fn test_deep_link_spans_local_day_in_utc() {
        let link = factory().deep_link(record().captured_at).unwrap();
        let range = taken_range(&link);

        assert_eq!(range["takenAfter"], "2024-07-13T22:00:00.000Z");
        assert_eq!(range["takenBefore"], "2024-07-14T21:59:59.999Z");
    }

    #[test]
    fn test_deep_link_follows_daylight_saving_of_capture_date() {
        let factory = factory_in(ViewerZone::Named(chrono_tz::Europe::Amsterdam));

        let winter = factory
            .deep_link(parse_local_timestamp("2024-01-15T10:00:00").unwrap())
            .unwrap();
        let range = taken_range(&winter);
        assert_eq!(range["takenAfter"], "2024-01-14T23:00:00.000Z");
        assert_eq!(range["takenBefore"], "2024-01-15T22:59:59.999Z");

        let summer = factory
            .deep_link(parse_local_timestamp("2024-07-14T16:20:05").unwrap())
            .unwrap();
        let range = taken_range(&summer);
        assert_eq!(range["takenAfter"], "2024-07-13T22:00:00.000Z");
        assert_eq!(range["takenBefore"], "2024-07-14T21:59:59.999Z");

        // Clocks go forward on 2024-03-31, a 23 hour day
        let short_day = factory
            .deep_link(parse_local_timestamp("2024-03-31T12:00:00").unwrap())
            .unwrap();
        let range = taken_range(&short_day);
        assert_eq!(range["takenAfter"], "2024-03-30T23:00:00.000Z");
        assert_eq!(range["takenBefore"], "2024-03-31T21:59:59.999Z");
    }

    #[test]
    fn test_day_starting_in_a_gap_begins_after_the_jump() {
        // Sao Paulo skipped 00:00-01:00 on 2018-11-04
        let factory = factory_in(ViewerZone::Named(chrono_tz::America::Sao_Paulo));
        let link = factory
            .deep_link(parse_local_timestamp("2018-11-04T09:00:00").unwrap())
            .unwrap();

        let range = taken_range(&link);
        assert_eq!(range["takenAfter"], "2018-11-04T03:00:00.000Z");
        assert_eq!(range["takenBefore"], "2018-11-05T01:59:59.999Z");
    }

    #[test]
    fn test_missing_immich_url_still_builds_marker() {
        for immich_url in [None, Some(""), Some("   "), Some("not a url")] {
            let factory = MarkerFactory::new(
                "http://localhost:3000",
                "k",
                immich_url,
                ViewerZone::Fixed(FixedOffset::east_opt(0).unwrap()),
            )
            .unwrap();

            let marker = factory.build(&record()).unwrap();
            assert_eq!(marker.popup.deep_link, None);
            assert!(!marker.popup.html.contains("<a "));
            assert!(marker.popup.html.contains("<img src=\"http://localhost:3000/api/v1/photos/pq1/"));
        }
    }

    #[test]
    fn test_immich_url_with_path_keeps_prefix() {
        let factory = MarkerFactory::new(
            "http://localhost:3000",
            "k",
            Some("https://example.org/immich/"),
            ViewerZone::Fixed(FixedOffset::east_opt(0).unwrap()),
        )
        .unwrap();

        let link = factory.deep_link(record().captured_at).unwrap();
        assert!(link.starts_with("https://example.org/immich/search?query="));
    }

    #[test]
    fn test_invalid_backend_url_rejected() {
        let err = MarkerFactory::new(
            "not a url",
            "k",
            Some("https://immich.example"),
            ViewerZone::Local,
        )
        .unwrap_err();

        assert!(matches!(err, MarkerError::InvalidUrl { name: "backend", .. }));
    }

    #[test]
    fn test_thumbnail_url_encodes_id_as_one_segment() {
        let url = thumbnail_url("http://localhost:3000", "a/b?c#d", "k").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/v1/photos/a%2Fb%3Fc%23d/thumbnail.jpg?api_key=k"
        );

        assert!(thumbnail_url("http://localhost:3000", "..", "k").is_none());
        assert!(thumbnail_url("http://localhost:3000", "", "k").is_none());
    }
}
