//! Map-side collaborators of the orchestrator: the map widget, the
//! notification sink, the marker layer and the loading indicator.

use std::sync::atomic::{AtomicU64, Ordering};

use strum::Display;

use crate::models::marker::Marker;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlId(u64);

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Error,
    Notice,
}

/// User-visible notifications (flash messages).
pub trait Notifier {
    fn show_message(&self, kind: MessageKind, text: &str);
}

/// The map widget the orchestrator renders into.
pub trait MapWidget {
    fn add_control(&mut self, indicator: &LoadingIndicator);

    /// Called after the indicator changed state so the widget can redraw it.
    fn refresh_control(&mut self, indicator: &LoadingIndicator);

    fn remove_control(&mut self, indicator: &LoadingIndicator);

    fn has_layer(&self, layer: LayerId) -> bool;

    fn add_layer(&mut self, layer: &MarkerLayer);
}

/// Group of photo markers attached to the map as one layer.
#[derive(Debug)]
pub struct MarkerLayer {
    id: LayerId,
    markers: Vec<Marker>,
}

impl Default for MarkerLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self {
            id: LayerId(next_id()),
            markers: Vec::new(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn clear_layers(&mut self) {
        self.markers.clear();
    }

    pub fn add_layer(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    pub fn add_to<M: MapWidget + ?Sized>(&self, map: &mut M) {
        map.add_layer(self);
    }

    /// The layer as a GeoJSON FeatureCollection.
    pub fn to_geojson(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "FeatureCollection",
            "features": self.markers.iter().map(Marker::to_feature).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Attached,
    Done,
    Removed,
}

/// Spinner shown while an orchestration run is in flight.
///
/// Owned by the run. `remove` consumes it, so it can only be detached once.
#[derive(Debug)]
pub struct LoadingIndicator {
    id: ControlId,
    state: IndicatorState,
}

impl LoadingIndicator {
    pub fn attach<M: MapWidget + ?Sized>(map: &mut M) -> Self {
        let indicator = Self {
            id: ControlId(next_id()),
            state: IndicatorState::Attached,
        };
        map.add_control(&indicator);
        indicator
    }

    pub fn id(&self) -> ControlId {
        self.id
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    /// Switch the spinner to its checkmark.
    pub fn mark_done<M: MapWidget + ?Sized>(&mut self, map: &mut M) {
        self.state = IndicatorState::Done;
        map.refresh_control(self);
    }

    pub fn remove<M: MapWidget + ?Sized>(mut self, map: &mut M) {
        self.state = IndicatorState::Removed;
        map.remove_control(&self);
    }
}

/// Something that happened to a [`HeadlessMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    ControlAdded(ControlId),
    ControlChanged(ControlId, IndicatorState),
    ControlRemoved(ControlId),
    LayerAdded(LayerId),
}

/// Map widget without a display. Records what was done to it.
#[derive(Debug, Default)]
pub struct HeadlessMap {
    layers: Vec<LayerId>,
    controls: Vec<ControlId>,
    events: Vec<MapEvent>,
}

impl HeadlessMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[MapEvent] {
        &self.events
    }

    pub fn controls(&self) -> &[ControlId] {
        &self.controls
    }
}

impl MapWidget for HeadlessMap {
    fn add_control(&mut self, indicator: &LoadingIndicator) {
        tracing::debug!(control = ?indicator.id(), "Loading indicator attached");
        self.controls.push(indicator.id());
        self.events.push(MapEvent::ControlAdded(indicator.id()));
    }

    fn refresh_control(&mut self, indicator: &LoadingIndicator) {
        self.events
            .push(MapEvent::ControlChanged(indicator.id(), indicator.state()));
    }

    fn remove_control(&mut self, indicator: &LoadingIndicator) {
        tracing::debug!(control = ?indicator.id(), "Loading indicator removed");
        self.controls.retain(|id| *id != indicator.id());
        self.events.push(MapEvent::ControlRemoved(indicator.id()));
    }

    fn has_layer(&self, layer: LayerId) -> bool {
        self.layers.contains(&layer)
    }

    fn add_layer(&mut self, layer: &MarkerLayer) {
        self.layers.push(layer.id());
        self.events.push(MapEvent::LayerAdded(layer.id()));
    }
}

/// Notifier that writes flash messages to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_message(&self, kind: MessageKind, text: &str) {
        match kind {
            MessageKind::Error => tracing::error!(kind = %kind, "{}", text),
            MessageKind::Notice => tracing::info!(kind = %kind, "{}", text),
        }
    }
}
