//! Stored form of a track and its JSON codec.
//!
//! The record is `{"points": [[lat, lon], ...], "distance": km}` kept under
//! a single key. Missing fields decode to defaults; anything that is not a
//! JSON object of that shape is reported as corrupt so the caller can throw
//! it away.

use crate::slot::KeyValueSlot;
use crate::{DecodeError, GeoPoint, Result, Track};
use serde::{Deserialize, Serialize};

/// Key the track record is stored under
pub const TRACK_RECORD_KEY: &str = "gpsTrack";

/// Durable projection of a [`Track`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedTrackRecord {
    pub points: Vec<GeoPoint>,
    pub distance: f64,
}

impl PersistedTrackRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn into_track(self) -> Track {
        Track::from_record(self.points, self.distance)
    }
}

/// Lenient wire shape: absent or `null` fields fall back to defaults
#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    points: Option<Vec<GeoPoint>>,
    #[serde(default)]
    distance: Option<f64>,
}

pub fn encode(track: &Track) -> PersistedTrackRecord {
    PersistedTrackRecord {
        points: track.points().to_vec(),
        distance: track.total_distance_km(),
    }
}

pub fn decode_record(raw: &str) -> std::result::Result<PersistedTrackRecord, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::Corrupt(e.to_string()))?;

    if !value.is_object() {
        return Err(DecodeError::Corrupt(format!(
            "expected a JSON object, found {}",
            json_kind(&value)
        )));
    }

    let raw: RawRecord =
        serde_json::from_value(value).map_err(|e| DecodeError::Corrupt(e.to_string()))?;

    Ok(PersistedTrackRecord {
        points: raw.points.unwrap_or_default(),
        distance: raw.distance.unwrap_or(0.0),
    })
}

pub fn decode(raw: &str) -> std::result::Result<Track, DecodeError> {
    decode_record(raw).map(PersistedTrackRecord::into_track)
}

/// Read the stored track at startup
///
/// Never fails: an absent record gives an empty track, and a corrupt one is
/// removed from the slot before returning an empty track.
pub fn restore<K: KeyValueSlot + ?Sized>(slot: &mut K, key: &str) -> PersistedTrackRecord {
    let empty = || encode(&Track::new());

    let raw = match slot.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::info!("No stored track under {:?}, starting empty", key);
            return empty();
        }
        Err(e) => {
            tracing::warn!("Unable to read stored track {:?}: {}. Starting empty.", key, e);
            return empty();
        }
    };

    match decode_record(&raw) {
        Ok(record) => {
            tracing::info!(
                "Restored track with {} points ({:.2} km)",
                record.points.len(),
                record.distance
            );
            record
        }
        Err(e) => {
            tracing::warn!("Discarding stored track {:?}: {}", key, e);
            if let Err(e) = slot.remove(key) {
                tracing::warn!("Failed to remove corrupt track record {:?}: {}", key, e);
            }
            empty()
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
