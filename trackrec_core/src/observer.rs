//! Change notifications emitted by the track store.

use crate::GeoPoint;

/// Something that happened to the track or the recording session
#[derive(Clone, Debug, PartialEq)]
pub enum TrackEvent {
    RecordingStarted,
    RecordingStopped,
    PointAdded {
        point: GeoPoint,
        point_count: usize,
        total_distance_km: f64,
    },
    Cleared,
    Loaded {
        point_count: usize,
        total_distance_km: f64,
    },
}

/// Registered with the store to follow its changes (UI, notifications, ...)
pub trait TrackObserver {
    fn on_event(&mut self, event: &TrackEvent);
}

impl<F: FnMut(&TrackEvent)> TrackObserver for F {
    fn on_event(&mut self, event: &TrackEvent) {
        self(event)
    }
}
