//! Write-through persistence of the track record.
//!
//! The track store hands every new record to a [`RecordWriter`] and moves
//! on. Writers log failures and never retry; the in-memory track stays the
//! source of truth while a session is live.

use crate::persistence::PersistedTrackRecord;
use crate::slot::KeyValueSlot;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Destination for track records produced by the store
pub trait RecordWriter {
    /// Replace the stored record
    fn write(&mut self, record: PersistedTrackRecord);

    /// Remove the stored record
    fn erase(&mut self);

    /// Block until everything submitted so far has been applied
    fn flush(&mut self) {}
}

enum Pending {
    Write(PersistedTrackRecord),
    Erase,
}

fn apply<K: KeyValueSlot + ?Sized>(slot: &mut K, key: &str, pending: Pending) {
    match pending {
        Pending::Write(record) => {
            let result = record.to_json().and_then(|json| slot.set(key, &json));
            match result {
                Ok(()) => tracing::trace!("Persisted {} points", record.points.len()),
                Err(e) => tracing::warn!("Failed to persist track record: {}", e),
            }
        }
        Pending::Erase => match slot.remove(key) {
            Ok(()) => tracing::debug!("Erased stored track record"),
            Err(e) => tracing::warn!("Failed to erase track record: {}", e),
        },
    }
}

// ============================================================================
// Synchronous Writer
// ============================================================================

/// Writes straight into the slot on the caller's thread
pub struct SlotWriter<K> {
    slot: K,
    key: String,
}

impl<K: KeyValueSlot> SlotWriter<K> {
    pub fn new(slot: K, key: impl Into<String>) -> Self {
        Self {
            slot,
            key: key.into(),
        }
    }

    pub fn slot(&self) -> &K {
        &self.slot
    }
}

impl<K: KeyValueSlot> RecordWriter for SlotWriter<K> {
    fn write(&mut self, record: PersistedTrackRecord) {
        apply(&mut self.slot, &self.key, Pending::Write(record));
    }

    fn erase(&mut self) {
        apply(&mut self.slot, &self.key, Pending::Erase);
    }
}

// ============================================================================
// Background Writer
// ============================================================================

enum WriteCommand {
    Write(PersistedTrackRecord),
    Erase,
    Flush(Sender<()>),
}

/// Applies records on a worker thread
///
/// Commands that pile up while a write is in progress are coalesced, so only
/// the newest record (or erase) reaches the slot. Dropping the writer applies
/// whatever is queued and joins the worker.
pub struct BackgroundWriter {
    commands: Option<Sender<WriteCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundWriter {
    pub fn spawn<K>(slot: K, key: impl Into<String>) -> Self
    where
        K: KeyValueSlot + Send + 'static,
    {
        let key = key.into();
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("trackrec-writer".into())
            .spawn(move || run_worker(slot, key, rx));

        match worker {
            Ok(worker) => Self {
                commands: Some(tx),
                worker: Some(worker),
            },
            Err(e) => {
                tracing::error!("Unable to start persistence worker: {}. Track will not be saved.", e);
                Self {
                    commands: None,
                    worker: None,
                }
            }
        }
    }

    fn submit(&self, command: WriteCommand) {
        let sent = self
            .commands
            .as_ref()
            .map(|tx| tx.send(command).is_ok())
            .unwrap_or(false);
        if !sent {
            tracing::warn!("Persistence worker is not running, dropping write");
        }
    }
}

fn run_worker<K: KeyValueSlot>(mut slot: K, key: String, commands: Receiver<WriteCommand>) {
    while let Ok(first) = commands.recv() {
        let mut pending = None;
        let mut acks = Vec::new();
        let mut next = Some(first);

        while let Some(command) = next {
            match command {
                WriteCommand::Write(record) => pending = Some(Pending::Write(record)),
                WriteCommand::Erase => pending = Some(Pending::Erase),
                WriteCommand::Flush(ack) => acks.push(ack),
            }
            next = commands.try_recv().ok();
        }

        if let Some(pending) = pending {
            apply(&mut slot, &key, pending);
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
    tracing::debug!("Persistence worker exiting");
}

impl RecordWriter for BackgroundWriter {
    fn write(&mut self, record: PersistedTrackRecord) {
        self.submit(WriteCommand::Write(record));
    }

    fn erase(&mut self) {
        self.submit(WriteCommand::Erase);
    }

    fn flush(&mut self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.submit(WriteCommand::Flush(ack_tx));
        // Err means the worker is gone; nothing left to wait for
        let _ = ack_rx.recv();
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Persistence worker panicked");
            }
        }
    }
}

impl<W: RecordWriter + ?Sized> RecordWriter for Box<W> {
    fn write(&mut self, record: PersistedTrackRecord) {
        (**self).write(record)
    }

    fn erase(&mut self) {
        (**self).erase()
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}
