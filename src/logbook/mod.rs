//! Daily pressure logbook.
//!
//! ```text
//!  local time ──▶ DailyLogRotation ──▶ LogIdentity ("190824.txt")
//!                                          │
//!  reading + zone ──▶ ReadingRecorder ─────┴──▶ StorageGate ──▶ append
//!                          │
//!                          └──▶ ReadingSequence (RTC memory)
//! ```
//!
//! One file per log day; a log day runs from the boundary hour (06:00) to
//! 05:59:59 the next calendar day.  Each reading is one CRLF-terminated
//! CSV line with no header row:
//!
//! ```text
//! <id>,<YYYY-MM-DD>,<HH:MM:SS>,<psi>,<zone number>,<zone avg psi>
//! ```

pub mod recorder;
pub mod rotation;
pub mod sequence;

use core::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime};

pub use recorder::{ReadingRecorder, RecorderStats};
pub use rotation::{local_time, DailyLogRotation};
pub use sequence::ReadingSequence;

/// Which daily file is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogIdentity {
    /// Boundary-adjusted calendar date the file belongs to.
    pub day: NaiveDate,
    /// `DDMMYY.<ext>`, no leading slash.
    pub filename: String,
}

impl LogIdentity {
    pub fn new(day: NaiveDate, extension: &str) -> Self {
        use chrono::Datelike;
        let filename = format!(
            "{:02}{:02}{:02}.{}",
            day.day(),
            day.month(),
            day.year().rem_euclid(100),
            extension
        );
        Self { day, filename }
    }

    /// Absolute path on the storage medium.
    pub fn path(&self) -> String {
        format!("/{}", self.filename)
    }
}

/// One reading as it goes into the log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry<'a> {
    /// Local wall time of the tick.
    pub timestamp: NaiveDateTime,
    /// Calibrated pressure.
    pub psi: f32,
    /// `znumber` of the zone reported for this tick.
    pub zone_number: Option<&'a str>,
    /// That zone's expected average pressure, as entered in the table.
    pub zone_average_psi: Option<&'a str>,
}

/// Render one log line, CRLF included.
///
/// Pressure is written with two decimals.  Zone fields are left empty
/// when there is no zone (empty table or clock not yet valid).
pub fn format_line(id: u32, entry: &LogEntry<'_>) -> String {
    let mut line = String::with_capacity(64);
    let _ = write!(
        line,
        "{},{},{},{:.2},",
        id,
        entry.timestamp.format("%Y-%m-%d"),
        entry.timestamp.format("%H:%M:%S"),
        entry.psi
    );
    if let Some(number) = entry.zone_number {
        line.push_str(number);
    }
    line.push(',');
    if let Some(avg) = entry.zone_average_psi {
        line.push_str(avg);
    }
    line.push_str("\r\n");
    line
}
