//! Error types for the trackrec_core library.

use std::io;
use std::path::PathBuf;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for trackrec_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV error while reading replay input
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// GPX document could not be written
    #[error("GPX error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordinate outside the valid latitude/longitude ranges
    #[error("Invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// The sample source failed or refused the subscription
    #[error("Location source error: {0}")]
    Source(#[from] SourceError),

    /// The persisted track record could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Export requested for a track without points
    #[error("Track is empty, nothing to export")]
    EmptyExport,

    /// Writing an exported document failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// `start` called while a recording session is active
    #[error("Recording is already in progress")]
    AlreadyRecording,

    /// `load` called after recording was started in this process
    #[error("A stored track can only be loaded before recording starts")]
    LoadAfterStart,

    /// Durable key-value slot error
    #[error("Storage error: {0}")]
    Slot(String),
}

/// Failures reported by a GeoSample source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location source unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for a position fix")]
    Timeout,

    #[error("malformed sample: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Whether the subscription cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::PermissionDenied | SourceError::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Stored record is not well-formed; callers discard it
    #[error("corrupt track record: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification service unavailable: {0}")]
    Unavailable(String),
}
