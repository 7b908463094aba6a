//! Inbound commands to the application service.
//!
//! These represent settings changes requested by the web client that the
//! [`AppService`](super::service::AppService) applies and persists.

use core::fmt;

use crate::error::ConfigError;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Calibrate against an external gauge reading (PSI).  Exactly 0.0
    /// clears the calibration.
    SetReferencePressure(f32),

    /// Change the tick interval, in whole seconds.
    SetSampleRate(u32),

    /// Change the free-text location label.
    SetLocation(String),

    /// Replace the zone table with a new JSON document.
    SubmitZoneTable(String),
}

/// Outcome of a command, as reported back to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandStatus {
    /// Applied and persisted.  The body is the client-facing reply.
    Ok(String),
    /// Rejected, or applied but not persisted.
    Failed(ConfigError),
}

impl CommandStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(body) => f.write_str(body),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}
