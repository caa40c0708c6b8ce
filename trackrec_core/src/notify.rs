//! User-visible notifications while recording runs in the background.
//!
//! Notifications are informational only; a failing notifier never affects
//! the track.

use crate::observer::{TrackEvent, TrackObserver};
use crate::NotifyError;

/// Identifier of the ongoing "recording" notification
pub const RECORDING_NOTIFICATION_ID: u32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: u32,
    pub title: String,
    pub body: String,
    /// Stays visible until cancelled
    pub ongoing: bool,
}

/// Platform notification service
pub trait Notifier {
    fn show(&mut self, notification: &Notification) -> Result<(), NotifyError>;
    fn cancel(&mut self, id: u32) -> Result<(), NotifyError>;
}

/// Notifier for hosts without a notification area; writes to the log
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&mut self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!("{}: {}", notification.title, notification.body);
        Ok(())
    }

    fn cancel(&mut self, id: u32) -> Result<(), NotifyError> {
        tracing::debug!("Notification {} dismissed", id);
        Ok(())
    }
}

/// Shows the recording notification on start and cancels it on stop
pub struct RecordingNotifier<N> {
    notifier: N,
}

impl<N: Notifier> RecordingNotifier<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    pub fn recording_notification() -> Notification {
        Notification {
            id: RECORDING_NOTIFICATION_ID,
            title: "GPS tracker active".into(),
            body: "Recording your route.".into(),
            ongoing: true,
        }
    }

    pub fn into_inner(self) -> N {
        self.notifier
    }
}

impl<N: Notifier> TrackObserver for RecordingNotifier<N> {
    fn on_event(&mut self, event: &TrackEvent) {
        let result = match event {
            TrackEvent::RecordingStarted => self.notifier.show(&Self::recording_notification()),
            TrackEvent::RecordingStopped => self.notifier.cancel(RECORDING_NOTIFICATION_ID),
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("Notification failed: {}", e);
        }
    }
}
