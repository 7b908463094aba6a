//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, push to the web
//! client, etc.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::RecordError;
use crate::scheduler::{ProgramEnd, ZoneStartKind};
use crate::zones::ZoneDocument;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Boot finished; carries the sample interval in force.
    Started { sample_interval_secs: u32 },

    /// One tick's published reading.
    Reading(ReadingReport),

    /// A new daily log file became current.
    LogRotated { filename: String },

    /// The tick's reading was not written to the log.
    RecordSkipped(RecordError),

    /// A zone became active.
    ZoneStarted {
        index: usize,
        number: String,
        kind: ZoneStartKind,
    },

    /// The scheduler went back to idle.
    ProgramEnded { index: usize, reason: ProgramEnd },

    /// The stored zone table could not be decoded; running with none.
    ZoneTableRejected,
}

/// What a client sees for one tick.
///
/// Serialises to the document the web page consumes:
/// `{"Current Pressure": "41", "Active Zone": {...}}`.  The pressure is
/// truncated to a whole number and sent as a string; the active zone is
/// the zone document, or `{}` when there is none.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingReport {
    /// Sequence id the reading was logged under, if it was logged.
    pub id: Option<u32>,
    pub psi: f32,
    pub raw_psi: f32,
    pub zone: Option<ZoneDocument>,
    /// Whether `zone` is actually running or only the idle placeholder.
    pub zone_running: bool,
}

impl ReadingReport {
    /// Pressure as shown to clients: truncated toward zero.
    pub fn display_psi(&self) -> i32 {
        self.psi as i32
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

struct EmptyObject;

impl Serialize for EmptyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

impl Serialize for ReadingReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("Current Pressure", &self.display_psi().to_string())?;
        match &self.zone {
            Some(zone) => map.serialize_entry("Active Zone", zone)?,
            None => map.serialize_entry("Active Zone", &EmptyObject)?,
        }
        map.end()
    }
}
