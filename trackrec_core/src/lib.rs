#![forbid(unsafe_code)]

//! Track recording engine for the trackrec GPS recorder.
//!
//! This crate provides:
//! - Domain types (points, tracks, recording mode)
//! - Haversine distance
//! - The track store and its recording state machine
//! - Persistence (record codec, key-value slots, write-through writers)
//! - GPX export and file sinks
//! - Source, notification and observer contracts

pub mod types;
pub mod error;
pub mod distance;
pub mod config;
pub mod logging;
pub mod source;
pub mod slot;
pub mod persistence;
pub mod writer;
pub mod observer;
pub mod notify;
pub mod export;
pub mod sink;
pub mod store;

// Re-export commonly used types
pub use error::{DecodeError, Error, NotifyError, Result, SinkError, SourceError};
pub use types::*;
pub use config::Config;
pub use distance::distance;
pub use source::{GeoSampleSource, ReplaySource, SampleEvent, SourceEvent, SubscriptionHandle, WatchOptions};
pub use slot::{FileSlot, KeyValueSlot, MemorySlot};
pub use persistence::{PersistedTrackRecord, TRACK_RECORD_KEY};
pub use writer::{BackgroundWriter, RecordWriter, SlotWriter};
pub use observer::{TrackEvent, TrackObserver};
pub use notify::{LogNotifier, Notifier, RecordingNotifier};
pub use export::{export_file_name, render_gpx, ExportOptions};
pub use sink::{DirectorySink, FileSink};
pub use store::TrackStore;
