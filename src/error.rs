//! Unified error types for the well monitor firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the tick
//! loop and the request handlers report failures the same way.  All
//! variants are `Copy`; nothing in the core is fatal to the process.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The storage medium failed or is absent.
    Storage(StorageError),
    /// Another consumer holds the storage gate.
    Busy(StorageBusy),
    /// The zone table document could not be decoded.
    ZoneTable(ZoneTableError),
    /// A reading could not be appended to the daily log.
    Record(RecordError),
    /// Configuration is invalid or could not be persisted.
    Config(ConfigError),
    /// The wall clock has not been synchronised yet.
    ClockNotSynced,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Busy(e) => write!(f, "{e}"),
            Self::ZoneTable(e) => write!(f, "zone table: {e}"),
            Self::Record(e) => write!(f, "record: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::ClockNotSynced => write!(f, "clock not synchronised"),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Failures of the storage medium (SD card).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Card not present or the filesystem is not mounted.
    NotMounted,
    /// The requested file does not exist.
    NotFound,
    /// The path escapes the medium root or is empty.
    InvalidPath,
    /// Read, write or directory operation failed.
    Io,
    /// The medium only serves files.
    ReadOnly,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMounted => write!(f, "medium not mounted"),
            Self::NotFound => write!(f, "file not found"),
            Self::InvalidPath => write!(f, "invalid path"),
            Self::Io => write!(f, "I/O error"),
            Self::ReadOnly => write!(f, "medium is read-only"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// The storage gate is held by another consumer.  Callers drop their
/// operation and report this upward; they never retry on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageBusy;

impl fmt::Display for StorageBusy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SD card is busy")
    }
}

impl From<StorageBusy> for Error {
    fn from(e: StorageBusy) -> Self {
        Self::Busy(e)
    }
}

// ---------------------------------------------------------------------------
// Zone table errors
// ---------------------------------------------------------------------------

/// Decode failures of the zone table document.  Field errors carry the
/// position of the offending zone in the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTableError {
    /// Not a JSON array of objects with the expected string fields.
    Malformed,
    /// `days` contains something other than the digits 0–6.
    InvalidDays(usize),
    /// `start` is not a valid `HH:MM` time of day.
    InvalidStart(usize),
    /// `run` is not a non-negative whole number of minutes.
    InvalidRun(usize),
    /// `avgpsi` is not a number.
    InvalidAveragePsi(usize),
}

impl fmt::Display for ZoneTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed document"),
            Self::InvalidDays(i) => write!(f, "zone {i}: days must be digits 0-6"),
            Self::InvalidStart(i) => write!(f, "zone {i}: start must be HH:MM"),
            Self::InvalidRun(i) => write!(f, "zone {i}: run must be whole minutes"),
            Self::InvalidAveragePsi(i) => write!(f, "zone {i}: avgpsi must be a number"),
        }
    }
}

impl From<ZoneTableError> for Error {
    fn from(e: ZoneTableError) -> Self {
        Self::ZoneTable(e)
    }
}

// ---------------------------------------------------------------------------
// Recorder errors
// ---------------------------------------------------------------------------

/// Why a reading was not appended to the daily log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// The storage gate was held; the reading was dropped.
    Busy,
    /// The medium is absent or not mounted.
    Unavailable,
    /// No valid wall-clock time yet, so there is no log identity.
    ClockNotSynced,
    /// The append itself failed.
    Io,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "storage busy, reading dropped"),
            Self::Unavailable => write!(f, "storage unavailable"),
            Self::ClockNotSynced => write!(f, "clock not synchronised"),
            Self::Io => write!(f, "append failed"),
        }
    }
}

impl From<RecordError> for Error {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed range validation.  The message names the field.
    ValidationFailed(&'static str),
    /// The value was applied but could not be persisted.
    Storage(StorageError),
    /// The value was applied but the gate was busy, so it was not persisted.
    Busy,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Storage(e) => write!(f, "not saved: {e}"),
            Self::Busy => write!(f, "not saved: SD card is busy"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
