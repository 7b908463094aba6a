//! Appends readings to the daily log under the storage gate.
//!
//! A record attempt that finds the gate held is dropped, not queued.  The
//! sequence number only moves after a line has been written, so every
//! gap in a log corresponds to a reading that was never written.

use log::{debug, warn};

use crate::app::ports::{SequenceStore, StoragePort};
use crate::error::{RecordError, StorageError};
use crate::gate::StorageGate;

use super::{format_line, LogEntry, LogIdentity, ReadingSequence};

/// Running totals, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub written: u32,
    pub dropped_busy: u32,
    pub failed: u32,
}

#[derive(Debug, Default)]
pub struct ReadingRecorder {
    stats: RecorderStats,
}

impl ReadingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Append one reading.  Returns the id it was written under.
    pub fn record<S: StoragePort, Q: SequenceStore>(
        &mut self,
        gate: &StorageGate<S>,
        identity: &LogIdentity,
        sequence: &mut ReadingSequence<Q>,
        entry: &LogEntry<'_>,
    ) -> Result<u32, RecordError> {
        let Ok(mut storage) = gate.try_acquire() else {
            self.stats.dropped_busy += 1;
            return Err(RecordError::Busy);
        };
        if !storage.is_mounted() {
            self.stats.failed += 1;
            return Err(RecordError::Unavailable);
        }

        let id = sequence.current();
        let line = format_line(id, entry);
        if let Err(e) = storage.append(&identity.path(), &line) {
            warn!("Logbook: append to {} failed: {}", identity.filename, e);
            self.stats.failed += 1;
            return Err(match e {
                StorageError::NotMounted => RecordError::Unavailable,
                _ => RecordError::Io,
            });
        }
        drop(storage);

        sequence.advance();
        self.stats.written += 1;
        debug!("Logbook: {} <- {}", identity.filename, line.trim_end());
        Ok(id)
    }

    /// Create the day's file if it does not exist yet, so clients can
    /// list it before the first reading lands.
    pub fn ensure_file<S: StoragePort>(
        &self,
        gate: &StorageGate<S>,
        identity: &LogIdentity,
    ) -> Result<(), RecordError> {
        let mut storage = gate.try_acquire().map_err(|_| RecordError::Busy)?;
        if !storage.is_mounted() {
            return Err(RecordError::Unavailable);
        }
        let path = identity.path();
        if storage.exists(&path) {
            return Ok(());
        }
        storage.write(&path, "").map_err(|e| {
            warn!("Logbook: could not create {}: {}", identity.filename, e);
            RecordError::Io
        })
    }
}
