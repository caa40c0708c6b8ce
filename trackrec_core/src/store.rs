//! Track store and recording state machine.
//!
//! The store owns the track, the recording session, the sample source and
//! the record writer. It is driven from a single thread: sources push
//! [`SampleEvent`]s into the store's channel and the owner drains it with
//! [`TrackStore::process_pending`] or [`TrackStore::run_until_idle`].
//!
//! Every `start` opens a fresh channel and hands the only sender to the
//! source, so a source that goes away disconnects the channel.
//!
//! ```text
//!            start() ok
//!   Idle ───────────────▶ Recording ──┐ on_sample(p): append + fold
//!    ▲                        │  ◀────┘
//!    └────────────────────────┘
//!      stop() / clear() / fatal source error / source ended
//! ```

use crate::observer::{TrackEvent, TrackObserver};
use crate::persistence::{encode, PersistedTrackRecord};
use crate::source::{GeoSampleSource, SampleEvent, SourceEvent, SubscriptionHandle, WatchOptions};
use crate::writer::RecordWriter;
use crate::{Error, GeoPoint, RecordingMode, Result, Track};
use std::sync::mpsc::{self, Receiver};

pub struct TrackStore<S, W> {
    track: Track,
    mode: RecordingMode,
    subscription: Option<SubscriptionHandle>,
    /// Set by the first successful `start`; `load` is refused afterwards
    has_started: bool,
    source: S,
    writer: W,
    watch_options: WatchOptions,
    events: Option<Receiver<SampleEvent>>,
    observers: Vec<Box<dyn TrackObserver>>,
}

impl<S: GeoSampleSource, W: RecordWriter> TrackStore<S, W> {
    pub fn new(source: S, writer: W) -> Self {
        Self {
            track: Track::new(),
            mode: RecordingMode::Idle,
            subscription: None,
            has_started: false,
            source,
            writer,
            watch_options: WatchOptions::default(),
            events: None,
            observers: Vec::new(),
        }
    }

    pub fn with_watch_options(mut self, options: WatchOptions) -> Self {
        self.watch_options = options;
        self
    }

    pub fn subscribe_observer(&mut self, observer: Box<dyn TrackObserver>) {
        self.observers.push(observer);
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn mode(&self) -> RecordingMode {
        self.mode
    }

    pub fn is_recording(&self) -> bool {
        self.mode == RecordingMode::Recording
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Replace the track with a stored record
    ///
    /// Only allowed before recording has ever started in this store. The
    /// stored distance is taken as-is even if it disagrees with the points.
    pub fn load(&mut self, record: PersistedTrackRecord) -> Result<()> {
        if self.has_started {
            return Err(Error::LoadAfterStart);
        }

        self.track = record.into_track();
        tracing::debug!("Loaded track with {} points", self.track.len());
        self.emit(TrackEvent::Loaded {
            point_count: self.track.len(),
            total_distance_km: self.track.total_distance_km(),
        });
        Ok(())
    }

    /// Subscribe to the source and begin recording
    ///
    /// The caller is responsible for any permission checks beforehand.
    pub fn start(&mut self) -> Result<()> {
        if self.is_recording() {
            return Err(Error::AlreadyRecording);
        }

        let (events_tx, events_rx) = mpsc::channel();
        let handle = self
            .source
            .subscribe(&self.watch_options, events_tx)
            .map_err(|e| {
                tracing::warn!("Could not start recording: {}", e);
                Error::Source(e)
            })?;

        self.events = Some(events_rx);
        self.subscription = Some(handle);
        self.mode = RecordingMode::Recording;
        self.has_started = true;
        tracing::info!("Recording started (subscription {})", handle);
        self.emit(TrackEvent::RecordingStarted);
        Ok(())
    }

    /// Unsubscribe and return to idle; a no-op when already idle
    pub fn stop(&mut self) {
        let Some(handle) = self.subscription.take() else {
            return;
        };

        if let Err(e) = self.source.unsubscribe(handle) {
            tracing::warn!("Error while unsubscribing {}: {}", handle, e);
        }
        self.mode = RecordingMode::Idle;
        tracing::info!(
            "Recording stopped: {} points, {:.2} km",
            self.track.len(),
            self.track.total_distance_km()
        );
        self.emit(TrackEvent::RecordingStopped);
    }

    /// Stop if needed, then drop every point and erase the stored record
    pub fn clear(&mut self) {
        // Unsubscribing first retires the handle, so samples already queued
        // for it are dropped by `dispatch` instead of landing in the new track
        self.stop();
        self.track.clear();
        self.writer.erase();
        tracing::info!("Track cleared");
        self.emit(TrackEvent::Cleared);
    }

    /// Record one sample; ignored unless recording
    ///
    /// Returns whether the point was recorded. The distance update is O(1),
    /// but the write-through snapshots every point, so each call costs O(n)
    /// in the track length.
    pub fn on_sample(&mut self, point: GeoPoint) -> bool {
        if !self.is_recording() {
            tracing::debug!("Ignoring sample {:?} while idle", point);
            return false;
        }

        self.track.append(point);
        self.writer.write(encode(&self.track));
        self.emit(TrackEvent::PointAdded {
            point,
            point_count: self.track.len(),
            total_distance_km: self.track.total_distance_km(),
        });
        true
    }

    /// Route one event from the source channel
    pub fn dispatch(&mut self, event: SampleEvent) {
        if self.subscription != Some(event.handle) {
            tracing::debug!("Dropping event from retired subscription {}", event.handle);
            return;
        }

        match event.event {
            SourceEvent::Sample(point) => {
                self.on_sample(point);
            }
            SourceEvent::Error(e) if e.is_fatal() => {
                tracing::error!("Location source failed: {}", e);
                self.stop();
            }
            SourceEvent::Error(e) => {
                tracing::warn!("Location error: {}", e);
            }
            SourceEvent::Ended => {
                tracing::info!("Location source finished");
                self.stop();
            }
        }
    }

    /// Handle every event already queued, without blocking
    ///
    /// Returns the number of events taken off the channel.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(events) = &self.events else {
                break;
            };
            let Ok(event) = events.try_recv() else {
                break;
            };
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Block on the source channel until the session returns to idle
    ///
    /// A source that drops its sender without reporting `Ended` also ends
    /// the session.
    pub fn run_until_idle(&mut self) {
        while self.is_recording() {
            let Some(events) = &self.events else {
                break;
            };
            match events.recv() {
                Ok(event) => self.dispatch(event),
                Err(_) => {
                    tracing::warn!("Location source disconnected without ending");
                    self.stop();
                }
            }
        }
    }

    /// Wait for submitted persistence writes to land
    pub fn flush(&mut self) {
        self.writer.flush();
    }

    fn emit(&mut self, event: TrackEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{decode, TRACK_RECORD_KEY};
    use crate::slot::{KeyValueSlot, MemorySlot};
    use crate::source::ReplaySource;
    use crate::writer::SlotWriter;
    use crate::SourceError;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc::Sender;

    /// Source driven by the test: it hands out handles and lets the test
    /// push events through the sender it was given
    #[derive(Default)]
    struct ManualSource {
        sender: Option<Sender<SampleEvent>>,
        handle: Option<SubscriptionHandle>,
        subscribe_calls: usize,
        unsubscribe_calls: usize,
        refuse_with: Option<SourceError>,
        fail_unsubscribe: bool,
    }

    impl ManualSource {
        fn push(&self, event: SourceEvent) {
            let sender = self.sender.as_ref().expect("never subscribed");
            let handle = self.handle.expect("never subscribed");
            sender.send(SampleEvent { handle, event }).unwrap();
        }

        fn push_point(&self, lat: f64, lon: f64) {
            self.push(SourceEvent::Sample(GeoPoint::new(lat, lon)));
        }
    }

    impl GeoSampleSource for ManualSource {
        fn subscribe(
            &mut self,
            _options: &WatchOptions,
            events: Sender<SampleEvent>,
        ) -> std::result::Result<SubscriptionHandle, SourceError> {
            self.subscribe_calls += 1;
            if let Some(e) = self.refuse_with.clone() {
                return Err(e);
            }
            let handle = SubscriptionHandle::new();
            self.sender = Some(events);
            self.handle = Some(handle);
            Ok(handle)
        }

        fn unsubscribe(
            &mut self,
            _handle: SubscriptionHandle,
        ) -> std::result::Result<(), SourceError> {
            self.unsubscribe_calls += 1;
            if self.fail_unsubscribe {
                return Err(SourceError::Unavailable("gone".into()));
            }
            Ok(())
        }
    }

    /// Source whose worker sends its samples and exits without `Ended`
    #[derive(Default)]
    struct VanishingSource {
        points: Vec<GeoPoint>,
        worker: Option<std::thread::JoinHandle<()>>,
    }

    impl GeoSampleSource for VanishingSource {
        fn subscribe(
            &mut self,
            _options: &WatchOptions,
            events: Sender<SampleEvent>,
        ) -> std::result::Result<SubscriptionHandle, SourceError> {
            let handle = SubscriptionHandle::new();
            let points = self.points.clone();
            self.worker = Some(std::thread::spawn(move || {
                for point in points {
                    let _ = events.send(SampleEvent {
                        handle,
                        event: SourceEvent::Sample(point),
                    });
                }
            }));
            Ok(handle)
        }

        fn unsubscribe(
            &mut self,
            _handle: SubscriptionHandle,
        ) -> std::result::Result<(), SourceError> {
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
            Ok(())
        }
    }

    type TestStore = TrackStore<ManualSource, SlotWriter<MemorySlot>>;

    fn store_with(source: ManualSource) -> (TestStore, MemorySlot) {
        let slot = MemorySlot::new();
        let writer = SlotWriter::new(slot.clone(), TRACK_RECORD_KEY);
        (TrackStore::new(source, writer), slot)
    }

    fn stored_track(slot: &MemorySlot) -> Option<Track> {
        slot.get(TRACK_RECORD_KEY)
            .unwrap()
            .map(|raw| decode(&raw).unwrap())
    }

    #[test]
    fn test_starts_idle() {
        let (store, slot) = store_with(ManualSource::default());
        assert_eq!(store.mode(), RecordingMode::Idle);
        assert!(store.track().is_empty());
        assert!(stored_track(&slot).is_none());
    }

    #[test]
    fn test_record_stop_clear_sequence() {
        let (mut store, slot) = store_with(ManualSource::default());

        store.start().unwrap();
        assert!(store.on_sample(GeoPoint::new(10.0, 10.0)));
        assert!(store.on_sample(GeoPoint::new(10.001, 10.001)));
        store.stop();

        assert_eq!(store.track().len(), 2);
        assert!(store.track().total_distance_km() > 0.15);
        assert_eq!(stored_track(&slot).as_ref(), Some(store.track()));

        store.clear();

        assert!(store.track().is_empty());
        assert_eq!(store.track().total_distance_km(), 0.0);
        assert!(stored_track(&slot).is_none());
    }

    #[test]
    fn test_every_sample_is_written_through() {
        let (mut store, slot) = store_with(ManualSource::default());
        store.start().unwrap();

        for i in 0..5 {
            store.on_sample(GeoPoint::new(55.0 + i as f64 * 0.01, 37.0));
            let stored = stored_track(&slot).unwrap();
            assert_eq!(&stored, store.track());
            assert!((stored.total_distance_km() - stored.recomputed_distance()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_channel_samples_are_recorded() {
        let (mut store, _slot) = store_with(ManualSource::default());
        store.start().unwrap();

        store.source().push_point(1.0, 1.0);
        store.source().push_point(1.0, 1.001);
        assert_eq!(store.process_pending(), 2);

        assert_eq!(store.track().len(), 2);
    }

    #[test]
    fn test_sample_after_stop_is_ignored() {
        let (mut store, _slot) = store_with(ManualSource::default());
        store.start().unwrap();
        store.on_sample(GeoPoint::new(1.0, 1.0));
        store.stop();

        // Late delivery through the channel and a direct call
        store.source().push_point(2.0, 2.0);
        store.process_pending();
        assert!(!store.on_sample(GeoPoint::new(3.0, 3.0)));

        assert_eq!(store.track().points(), &[GeoPoint::new(1.0, 1.0)]);
    }

    #[test]
    fn test_in_flight_sample_does_not_survive_clear() {
        let (mut store, slot) = store_with(ManualSource::default());
        store.start().unwrap();
        store.source().push_point(1.0, 1.0);
        store.process_pending();

        // Queued before the clear, delivered after it
        store.source().push_point(1.5, 1.5);
        store.clear();
        store.process_pending();

        assert!(store.track().is_empty());
        assert!(stored_track(&slot).is_none());
    }

    #[test]
    fn test_stale_handle_after_restart_is_dropped() {
        let (mut store, _slot) = store_with(ManualSource::default());
        store.start().unwrap();
        let old_handle = store.source().handle.unwrap();
        store.stop();
        store.start().unwrap();

        store.dispatch(SampleEvent {
            handle: old_handle,
            event: SourceEvent::Sample(GeoPoint::new(9.0, 9.0)),
        });
        assert!(store.track().is_empty());
    }

    #[test]
    fn test_start_while_recording_is_rejected() {
        let (mut store, _slot) = store_with(ManualSource::default());
        store.start().unwrap();

        assert!(matches!(store.start(), Err(Error::AlreadyRecording)));
        assert_eq!(store.source().subscribe_calls, 1);
        assert!(store.is_recording());
    }

    #[test]
    fn test_subscribe_failure_leaves_idle() {
        let source = ManualSource {
            refuse_with: Some(SourceError::PermissionDenied),
            ..Default::default()
        };
        let (mut store, _slot) = store_with(source);

        let result = store.start();

        assert!(matches!(
            result,
            Err(Error::Source(SourceError::PermissionDenied))
        ));
        assert_eq!(store.mode(), RecordingMode::Idle);
        // A refused start does not count as having started
        assert!(store.load(encode(&Track::new())).is_ok());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut store, _slot) = store_with(ManualSource::default());
        store.stop();
        store.start().unwrap();
        store.stop();
        store.stop();

        assert_eq!(store.source().unsubscribe_calls, 1);
        assert_eq!(store.mode(), RecordingMode::Idle);
    }

    #[test]
    fn test_unsubscribe_error_still_stops() {
        let source = ManualSource {
            fail_unsubscribe: true,
            ..Default::default()
        };
        let (mut store, _slot) = store_with(source);
        store.start().unwrap();
        store.stop();
        assert_eq!(store.mode(), RecordingMode::Idle);
    }

    #[test]
    fn test_fatal_source_error_stops_recording() {
        let (mut store, _slot) = store_with(ManualSource::default());
        store.start().unwrap();

        store.source().push(SourceEvent::Error(SourceError::Timeout));
        store.process_pending();
        assert!(store.is_recording());

        store
            .source()
            .push(SourceEvent::Error(SourceError::Unavailable("gps off".into())));
        store.process_pending();
        assert!(!store.is_recording());
    }

    #[test]
    fn test_load_before_start() {
        let (mut store, _slot) = store_with(ManualSource::default());
        let record = PersistedTrackRecord {
            points: vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0)],
            distance: 3.0,
        };

        store.load(record).unwrap();

        assert_eq!(store.track().len(), 2);
        assert_eq!(store.track().total_distance_km(), 3.0);
    }

    #[test]
    fn test_load_after_start_is_rejected() {
        let (mut store, _slot) = store_with(ManualSource::default());
        store.start().unwrap();
        store.stop();

        let record = PersistedTrackRecord {
            points: vec![GeoPoint::new(0.0, 0.0)],
            distance: 0.0,
        };
        assert!(matches!(store.load(record), Err(Error::LoadAfterStart)));
        assert!(store.track().is_empty());
    }

    #[test]
    fn test_recording_continues_restored_track() {
        let (mut store, _slot) = store_with(ManualSource::default());
        store
            .load(PersistedTrackRecord {
                points: vec![GeoPoint::new(0.0, 0.0)],
                distance: 0.0,
            })
            .unwrap();

        store.start().unwrap();
        store.on_sample(GeoPoint::new(0.0, 1.0));

        assert_eq!(store.track().len(), 2);
        assert!((store.track().total_distance_km() - 111.195).abs() < 0.001);
    }

    #[test]
    fn test_observers_see_events_in_order() {
        let (mut store, _slot) = store_with(ManualSource::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.subscribe_observer(Box::new(move |event: &TrackEvent| {
            sink.borrow_mut().push(event.clone())
        }));

        store.start().unwrap();
        store.on_sample(GeoPoint::new(1.0, 1.0));
        store.clear();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], TrackEvent::RecordingStarted);
        assert!(matches!(
            seen[1],
            TrackEvent::PointAdded { point_count: 1, .. }
        ));
        assert_eq!(seen[2], TrackEvent::RecordingStopped);
        assert_eq!(seen[3], TrackEvent::Cleared);
    }

    #[test]
    fn test_replay_runs_until_source_ends() {
        let source = ReplaySource::from_points([
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(10.001, 10.001),
            GeoPoint::new(10.002, 10.002),
        ]);
        let slot = MemorySlot::new();
        let mut store = TrackStore::new(source, SlotWriter::new(slot.clone(), TRACK_RECORD_KEY));

        store.start().unwrap();
        store.run_until_idle();

        assert_eq!(store.mode(), RecordingMode::Idle);
        assert_eq!(store.track().len(), 3);
        assert_eq!(stored_track(&slot).unwrap().len(), 3);
    }

    #[test]
    fn test_run_until_idle_returns_when_source_disconnects() {
        let source = VanishingSource {
            points: vec![GeoPoint::new(10.0, 10.0)],
            ..Default::default()
        };
        let slot = MemorySlot::new();
        let mut store = TrackStore::new(source, SlotWriter::new(slot.clone(), TRACK_RECORD_KEY));

        store.start().unwrap();
        store.run_until_idle();

        assert_eq!(store.mode(), RecordingMode::Idle);
        assert_eq!(store.track().points(), &[GeoPoint::new(10.0, 10.0)]);
        assert_eq!(stored_track(&slot).unwrap().len(), 1);
    }
}
