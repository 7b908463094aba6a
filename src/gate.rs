//! Storage gate: the one lock in the system.
//!
//! The SD card is shared between the control loop (daily log appends,
//! zone table reads) and the HTTP handlers (streaming a log file to a
//! client, deleting files, saving settings).  Whoever finds the gate open
//! proceeds; the other side gets [`StorageBusy`] and drops its operation.
//! Nobody queues and nobody retries automatically.
//!
//! ```text
//!  control loop ──try_acquire──▶ ┌─────────────┐
//!                                │ StorageGate │──▶ StoragePort (SD)
//!  HTTP handler ──try_acquire──▶ └─────────────┘
//! ```
//!
//! The guard releases the gate when dropped, so an operation that fails
//! or returns early can never leave the card locked.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

use crate::app::ports::StoragePort;
use crate::error::StorageBusy;

/// Scoped exclusive access to the storage medium.
pub type StorageGuard<'a, S> = MutexGuard<'a, CriticalSectionRawMutex, S>;

/// Non-blocking, non-queuing mutual exclusion around a [`StoragePort`].
pub struct StorageGate<S> {
    inner: Mutex<CriticalSectionRawMutex, S>,
}

impl<S: StoragePort> StorageGate<S> {
    pub const fn new(storage: S) -> Self {
        Self {
            inner: Mutex::new(storage),
        }
    }

    /// Take the gate if it is open.  Never waits.
    pub fn try_acquire(&self) -> Result<StorageGuard<'_, S>, StorageBusy> {
        self.inner.try_lock().map_err(|_| StorageBusy)
    }

    /// Run `f` with the gate held; the gate is released when `f` returns.
    pub fn with<T>(&self, f: impl FnOnce(&mut S) -> T) -> Result<T, StorageBusy> {
        let mut guard = self.try_acquire()?;
        Ok(f(&mut guard))
    }

    /// Whether someone currently holds the gate.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Direct access when the gate is exclusively owned (boot, tests).
    pub fn get_mut(&mut self) -> &mut S {
        self.inner.get_mut()
    }
}
