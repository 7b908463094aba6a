//! Log-day boundary handling.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike, Utc};
use log::info;

use super::LogIdentity;

/// Convert UTC to local wall time with a fixed offset (no DST).
pub fn local_time(utc: DateTime<Utc>, utc_offset_secs: i32) -> Option<NaiveDateTime> {
    let zone = FixedOffset::east_opt(utc_offset_secs)?;
    Some(utc.with_timezone(&zone).naive_local())
}

/// Tracks the current daily log identity.
///
/// The identity is re-derived whenever the boundary-adjusted date moves,
/// so a tick that misses the boundary minute still rotates on the next one.
#[derive(Debug)]
pub struct DailyLogRotation {
    boundary_hour: u8,
    extension: heapless::String<4>,
    current: Option<LogIdentity>,
}

impl DailyLogRotation {
    pub fn new(boundary_hour: u8, extension: &str) -> Self {
        let mut ext = heapless::String::new();
        let _ = ext.push_str(extension);
        Self {
            boundary_hour,
            extension: ext,
            current: None,
        }
    }

    /// Identity for local time `now`, without touching state.
    pub fn identity_for(&self, now: NaiveDateTime) -> LogIdentity {
        let date = now.date();
        let day = if now.hour() < u32::from(self.boundary_hour) {
            date.pred_opt().unwrap_or(date)
        } else {
            date
        };
        LogIdentity::new(day, &self.extension)
    }

    /// Observe local time `now`.  Returns the new identity when it changed
    /// (including the first observation), `None` otherwise.
    pub fn observe(&mut self, now: NaiveDateTime) -> Option<&LogIdentity> {
        let next = self.identity_for(now);
        if self.current.as_ref() == Some(&next) {
            return None;
        }
        info!("Logbook: daily file is now {}", next.filename);
        self.current = Some(next);
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&LogIdentity> {
        self.current.as_ref()
    }
}
