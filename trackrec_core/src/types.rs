//! Core domain types for the track recorder.
//!
//! - `GeoPoint`: a single latitude/longitude fix
//! - `Track`: the ordered path plus its accumulated distance
//! - `RecordingMode`: the recording state machine's states

use crate::distance::distance;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Geographic Point
// ============================================================================

/// A geographic position in decimal degrees
///
/// Serialized positionally as `[latitude, longitude]` to match the stored
/// track record format.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point without range checks (samples from a source are trusted)
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a point, rejecting non-finite or out-of-range coordinates
    pub fn checked(latitude: f64, longitude: f64) -> Result<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        if valid {
            Ok(Self::new(latitude, longitude))
        } else {
            Err(Error::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

impl From<GeoPoint> for (f64, f64) {
    fn from(point: GeoPoint) -> Self {
        (point.latitude, point.longitude)
    }
}

// ============================================================================
// Track
// ============================================================================

/// An ordered path of recorded points and the distance traveled along it
///
/// `total_distance_km` is maintained incrementally by [`Track::append`]; the
/// fields are private so no other code path can break that fold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Track {
    points: Vec<GeoPoint>,
    total_distance_km: f64,
}

impl Track {
    /// An empty track
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a track from stored parts, trusting the stored distance
    ///
    /// No attempt is made to reconcile `total_distance_km` with `points`.
    pub fn from_record(points: Vec<GeoPoint>, total_distance_km: f64) -> Self {
        Self {
            points,
            total_distance_km,
        }
    }

    /// Build a track from points, folding the distance from scratch
    pub fn from_points(points: impl IntoIterator<Item = GeoPoint>) -> Self {
        let mut track = Self::new();
        for point in points {
            track.append(point);
        }
        track
    }

    /// Append a point and fold the leg from the previous last point
    ///
    /// Both effects happen here so observers never see one without the other.
    pub fn append(&mut self, point: GeoPoint) {
        if let Some(last) = self.points.last() {
            self.total_distance_km += distance(*last, point);
        }
        self.points.push(point);
    }

    /// Drop all points and reset the distance
    pub fn clear(&mut self) {
        self.points.clear();
        self.total_distance_km = 0.0;
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_km
    }

    pub fn last_point(&self) -> Option<GeoPoint> {
        self.points.last().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of leg distances computed from the points alone
    ///
    /// Differs from [`Track::total_distance_km`] only for tracks restored from
    /// a record whose stored distance disagrees with its points.
    pub fn recomputed_distance(&self) -> f64 {
        self.points
            .windows(2)
            .map(|leg| distance(leg[0], leg[1]))
            .sum()
    }
}

// ============================================================================
// Recording State
// ============================================================================

/// State of the recording session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RecordingMode {
    #[default]
    Idle,
    Recording,
}
