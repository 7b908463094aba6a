//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (ADC, clock, SD card, RTC memory, event sinks, display)
//! implement these traits.  The [`AppService`](super::service::AppService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.

use chrono::{DateTime, Utc};

use crate::error::StorageError;

// ───────────────────────────────────────────────────────────────
// Analog input port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One raw conversion from the pressure sensor's ADC channel.
pub trait AdcPort {
    /// Raw 12-bit count (0–4095).  Never fails: an unreadable channel
    /// reports whatever the converter returns.
    fn read_raw(&mut self) -> u16;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Wall-clock source.
pub trait ClockPort {
    /// Current UTC time, or `None` while the clock has not been
    /// synchronised (SNTP pending after a cold boot).
    fn now_utc(&self) -> Option<DateTime<Utc>>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ SD card)
// ───────────────────────────────────────────────────────────────

/// File-level access to the storage medium holding the zone table, the
/// settings files and the daily logs.
///
/// Paths are absolute from the medium root (`"/061024.txt"`).  Callers
/// reach an implementation only through
/// [`StorageGate`](crate::gate::StorageGate), which provides the mutual
/// exclusion; implementations themselves are not synchronised.
pub trait StoragePort {
    /// Whether the medium is present and mounted right now.
    fn is_mounted(&self) -> bool;

    /// Read a whole file as UTF-8 text.
    fn read_to_string(&self, path: &str) -> Result<String, StorageError>;

    /// Read up to `buf.len()` bytes starting at `offset`.  Returns 0 at
    /// end of file.
    fn read_chunk(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Create or truncate `path` and write `contents`.
    fn write(&mut self, path: &str, contents: &str) -> Result<(), StorageError>;

    /// Append `contents` in a single write, creating the file if needed.
    fn append(&mut self, path: &str, contents: &str) -> Result<(), StorageError>;

    fn exists(&self, path: &str) -> bool;

    /// Delete a file.  Missing files report [`StorageError::NotFound`].
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Names of the files in the medium root.
    fn list(&self) -> Result<Vec<String>, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Reading-counter port
// ───────────────────────────────────────────────────────────────

/// Backing cell for the reading sequence number.  Survives soft resets
/// where the platform allows it; resets to 0 on power loss.
pub trait SequenceStore {
    fn load(&self) -> u32;
    fn store(&mut self, value: u32);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / clients)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, the
/// client push channel, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

/// Fan out to two sinks, first then second.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &super::events::AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Display port
// ───────────────────────────────────────────────────────────────

/// The small local status display.
pub trait DisplayPort {
    /// Boot banner.
    fn show_splash(&mut self);

    /// Current pressure and the address clients should browse to.
    fn show_reading(&mut self, psi: f32, address: &str);
}
