//! GPX 1.1 export of a recorded track.
//!
//! The track model keeps no per-point capture time, so every trackpoint is
//! stamped with the moment of export.

use crate::{Error, Result, Track};
use chrono::{DateTime, SecondsFormat, Utc};
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Time, TrackSegment, Waypoint};
use std::time::SystemTime;
use time::OffsetDateTime;

pub const DEFAULT_CREATOR: &str = "trackrec";
pub const DEFAULT_TRACK_NAME: &str = "GPS Track";

/// Document-level fields of the exported GPX
#[derive(Clone, Debug, PartialEq)]
pub struct ExportOptions {
    pub creator: String,
    pub track_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            creator: DEFAULT_CREATOR.into(),
            track_name: DEFAULT_TRACK_NAME.into(),
        }
    }
}

/// Build a single-track, single-segment GPX document
///
/// Fails with [`Error::EmptyExport`] when the track has no points.
pub fn build_gpx(track: &Track, exported_at: DateTime<Utc>, options: &ExportOptions) -> Result<Gpx> {
    if track.is_empty() {
        return Err(Error::EmptyExport);
    }

    let stamp: OffsetDateTime = SystemTime::from(exported_at).into();

    let mut segment = TrackSegment::new();
    for point in track.points() {
        let mut waypoint = Waypoint::new(Point::new(point.longitude, point.latitude));
        waypoint.time = Some(Time::from(stamp));
        segment.points.push(waypoint);
    }

    let mut gpx_track = gpx::Track::new();
    gpx_track.name = Some(options.track_name.clone());
    gpx_track.segments.push(segment);

    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some(options.creator.clone());
    gpx.tracks.push(gpx_track);

    Ok(gpx)
}

/// Render the track as GPX XML text
pub fn render_gpx(
    track: &Track,
    exported_at: DateTime<Utc>,
    options: &ExportOptions,
) -> Result<String> {
    let gpx = build_gpx(track, exported_at, options)?;

    let mut buf = Vec::new();
    gpx::write(&gpx, &mut buf)?;
    let document = String::from_utf8(buf)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    tracing::debug!(
        "Rendered GPX with {} trackpoints ({} bytes)",
        track.len(),
        document.len()
    );
    Ok(document)
}

/// `track_<ISO-8601>.gpx` with `:` replaced so the name is valid everywhere
pub fn export_file_name(exported_at: DateTime<Utc>) -> String {
    let stamp = exported_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    format!("track_{}.gpx", stamp)
}
