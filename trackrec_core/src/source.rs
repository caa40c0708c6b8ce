//! GeoSample source contract and a replaying implementation.
//!
//! Sources never call into the track store directly. A subscription is given
//! a channel sender and pushes [`SampleEvent`]s tagged with its handle; the
//! store drains the channel on its own thread and drops events whose handle
//! is no longer the active subscription.

use crate::{GeoPoint, Result, SourceError};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// Opaque identifier of an active subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options passed to the source when subscribing
#[derive(Clone, Debug, PartialEq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

/// What a subscription reports
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    Sample(GeoPoint),
    Error(SourceError),
    /// The source has no more samples for this subscription
    Ended,
}

/// A source event tagged with the subscription that produced it
#[derive(Clone, Debug, PartialEq)]
pub struct SampleEvent {
    pub handle: SubscriptionHandle,
    pub event: SourceEvent,
}

/// Supplier of position fixes
pub trait GeoSampleSource {
    /// Start delivering events for a new subscription into `events`
    fn subscribe(
        &mut self,
        options: &WatchOptions,
        events: Sender<SampleEvent>,
    ) -> std::result::Result<SubscriptionHandle, SourceError>;

    /// Stop delivering events for `handle`
    ///
    /// Events already queued may still arrive afterwards.
    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> std::result::Result<(), SourceError>;
}

impl<S: GeoSampleSource + ?Sized> GeoSampleSource for Box<S> {
    fn subscribe(
        &mut self,
        options: &WatchOptions,
        events: Sender<SampleEvent>,
    ) -> std::result::Result<SubscriptionHandle, SourceError> {
        (**self).subscribe(options, events)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> std::result::Result<(), SourceError> {
        (**self).unsubscribe(handle)
    }
}

// ============================================================================
// Replay Source
// ============================================================================

struct ActiveReplay {
    handle: SubscriptionHandle,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Replays a fixed list of samples, then reports `Ended`
///
/// With no interval every event is queued during `subscribe`; with an
/// interval a worker thread paces delivery and stops early on unsubscribe.
pub struct ReplaySource {
    samples: Vec<std::result::Result<GeoPoint, SourceError>>,
    interval: Option<Duration>,
    active: Option<ActiveReplay>,
}

impl ReplaySource {
    pub fn new(samples: Vec<std::result::Result<GeoPoint, SourceError>>) -> Self {
        Self {
            samples,
            interval: None,
            active: None,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = GeoPoint>) -> Self {
        Self::new(points.into_iter().map(Ok).collect())
    }

    /// Pace delivery, one sample per `interval`
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval).filter(|d| !d.is_zero());
        self
    }

    /// Load samples from a `lat,lon` CSV file
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let samples = read_samples_csv(file)?;
        tracing::info!("Loaded {} replay samples from {:?}", samples.len(), path);
        Ok(Self::new(samples))
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl GeoSampleSource for ReplaySource {
    fn subscribe(
        &mut self,
        options: &WatchOptions,
        events: Sender<SampleEvent>,
    ) -> std::result::Result<SubscriptionHandle, SourceError> {
        if self.active.is_some() {
            return Err(SourceError::Unavailable(
                "replay source supports one subscription at a time".into(),
            ));
        }

        let handle = SubscriptionHandle::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        tracing::debug!(
            "Replay subscription {} (high accuracy: {}, timeout: {:?})",
            handle,
            options.enable_high_accuracy,
            options.timeout
        );

        let samples = self.samples.clone();
        let worker = match self.interval {
            None => {
                deliver(handle, samples, None, &cancelled, &events);
                None
            }
            Some(interval) => {
                let cancelled = Arc::clone(&cancelled);
                Some(thread::spawn(move || {
                    deliver(handle, samples, Some(interval), &cancelled, &events)
                }))
            }
        };

        self.active = Some(ActiveReplay {
            handle,
            cancelled,
            worker,
        });
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> std::result::Result<(), SourceError> {
        match self.active.take() {
            Some(mut active) if active.handle == handle => {
                active.cancelled.store(true, Ordering::SeqCst);
                if let Some(worker) = active.worker.take() {
                    if worker.join().is_err() {
                        tracing::warn!("Replay worker for {} panicked", handle);
                    }
                }
                Ok(())
            }
            other => {
                self.active = other;
                Err(SourceError::Unavailable(format!(
                    "unknown subscription {}",
                    handle
                )))
            }
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

fn deliver(
    handle: SubscriptionHandle,
    samples: Vec<std::result::Result<GeoPoint, SourceError>>,
    interval: Option<Duration>,
    cancelled: &AtomicBool,
    events: &Sender<SampleEvent>,
) {
    for sample in samples {
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        let event = match sample {
            Ok(point) => SourceEvent::Sample(point),
            Err(e) => SourceEvent::Error(e),
        };
        if events.send(SampleEvent { handle, event }).is_err() {
            // Receiver gone, nobody is listening anymore
            return;
        }
        if let Some(interval) = interval {
            thread::sleep(interval);
        }
    }

    if !cancelled.load(Ordering::SeqCst) {
        let _ = events.send(SampleEvent {
            handle,
            event: SourceEvent::Ended,
        });
    }
}

/// Parse `lat,lon` rows; a first row with no numeric field is a header
///
/// Rows that fail to parse become `Malformed` samples rather than aborting
/// the whole file.
pub fn read_samples_csv<R: Read>(
    reader: R,
) -> Result<Vec<std::result::Result<GeoPoint, SourceError>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut samples = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        let line = idx + 1;

        let lat = record.get(0).unwrap_or_default();
        let lon = record.get(1).unwrap_or_default();
        let parsed = match (lat.parse::<f64>(), lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => GeoPoint::checked(lat, lon)
                .map_err(|e| SourceError::Malformed(format!("row {}: {}", line, e))),
            (Err(_), Err(_)) if idx == 0 => {
                tracing::debug!("Skipping header row {:?}", record);
                continue;
            }
            _ => Err(SourceError::Malformed(format!(
                "row {}: expected `lat,lon`, got {:?}",
                line,
                record.iter().collect::<Vec<_>>()
            ))),
        };
        samples.push(parsed);
    }

    Ok(samples)
}
