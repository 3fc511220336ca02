use serde::Serialize;

/// Thumbnail-bearing div icon for a photo marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerIcon {
    pub class_name: String,
    pub html: String,
    pub size: [u32; 2],
}

/// Popup bound to a photo marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    /// Immich day search. Absent when no Immich instance is configured.
    pub deep_link: Option<String>,
    pub title: String,
    pub taken_label: String,
    pub location_label: Option<String>,
    pub media_label: String,
    pub html: String,
}

/// One map marker for one photo. Built by the marker factory, attached by
/// the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub photo_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub thumbnail_url: String,
    pub icon: MarkerIcon,
    pub popup: Popup,
}

impl Marker {
    /// GeoJSON feature for export. GeoJSON orders coordinates lon, lat.
    pub fn to_feature(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [self.longitude, self.latitude],
            },
            "properties": {
                "photo_id": self.photo_id,
                "thumbnail_url": self.thumbnail_url,
                "icon": self.icon,
                "popup": self.popup,
            },
        })
    }
}
