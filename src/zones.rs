//! Irrigation zone table.
//!
//! The table is a JSON array edited on the client's config page and stored
//! on the SD card.  Every field travels as a string:
//!
//! ```json
//! [{ "znumber": "1", "zname": "Front lawn", "controller": "A",
//!    "days": "135", "start": "07:00", "run": "10", "avgpsi": "48" }]
//! ```
//!
//! [`ZoneTable::decode`] turns that into typed [`ZoneRecord`]s and fails
//! with a [`ZoneTableError`] on the first bad field rather than treating
//! it as empty.  Order is significant: it is the scan order and the chain
//! order of the scheduler.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ZoneTableError;

/// Literal `start` value meaning "begin when the previous zone ends".
/// A real midnight start cannot be expressed.
pub const CHAIN_SENTINEL: &str = "00:00";

// ═══════════════════════════════════════════════════════════════
//  Time of day
// ═══════════════════════════════════════════════════════════════

/// Wall-clock minute, `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub const fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    /// Minutes since midnight.
    pub const fn minutes(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    /// Strict `HH:MM` parse (two digits each, 00–23 / 00–59).
    pub fn parse(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return None;
        }
        let two = |i: usize| -> Option<u8> {
            let (a, b) = (bytes[i], bytes[i + 1]);
            (a.is_ascii_digit() && b.is_ascii_digit()).then(|| (a - b'0') * 10 + (b - b'0'))
        };
        let (hour, minute) = (two(0)?, two(3)?);
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// When a zone begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStart {
    /// Runs immediately after the zone before it in the table.
    Chained,
    /// Starts at this minute on eligible days.
    At(TimeOfDay),
}

impl ZoneStart {
    fn parse(text: &str) -> Option<Self> {
        if text == CHAIN_SENTINEL {
            return Some(Self::Chained);
        }
        TimeOfDay::parse(text).map(Self::At)
    }
}

impl fmt::Display for ZoneStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chained => f.write_str(CHAIN_SENTINEL),
            Self::At(t) => t.fmt(f),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Weekdays
// ═══════════════════════════════════════════════════════════════

/// Set of weekdays, bit `n` = day `n` (0 = Sunday … 6 = Saturday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// Parse a run of single digits `0`–`6`, e.g. `"135"`.
    pub fn parse(text: &str) -> Option<Self> {
        text.bytes().try_fold(Self(0), |set, b| match b {
            b'0'..=b'6' => Some(Self(set.0 | 1 << (b - b'0'))),
            _ => None,
        })
    }

    pub fn contains(self, weekday: u8) -> bool {
        weekday < 7 && self.0 & (1 << weekday) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in 0..7u8 {
            if self.contains(d) {
                write!(f, "{d}")?;
            }
        }
        Ok(())
    }
}

/// Day of week by Zeller's congruence, rotated so 0 = Sunday.
pub fn day_of_week(year: i32, month: u32, day: u32) -> u8 {
    let (mut y, mut m) = (year, month as i32);
    if m < 3 {
        m += 12;
        y -= 1;
    }
    let k = y.rem_euclid(100);
    let j = y.div_euclid(100);
    // Zeller: 0 = Saturday.
    let h = (day as i32 + (13 * (m + 1)) / 5 + k + k / 4 + j / 4 + 5 * j).rem_euclid(7);
    ((h + 6) % 7) as u8
}

// ═══════════════════════════════════════════════════════════════
//  Records
// ═══════════════════════════════════════════════════════════════

/// Wire shape of one zone.  Also what is sent back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDocument {
    pub znumber: String,
    pub zname: String,
    pub controller: String,
    pub days: String,
    pub start: String,
    pub run: String,
    pub avgpsi: String,
}

/// One irrigation zone, decoded.
///
/// The document it came from is kept as entered; logs and clients see
/// those strings, never a re-rendering of the typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRecord {
    document: ZoneDocument,
    pub days: WeekdaySet,
    pub start: ZoneStart,
    pub run_minutes: u16,
    /// Expected pressure while this zone runs, for deviation analysis.
    pub average_psi: f32,
}

impl ZoneRecord {
    fn from_document(index: usize, doc: ZoneDocument) -> Result<Self, ZoneTableError> {
        let days = WeekdaySet::parse(doc.days.trim()).ok_or(ZoneTableError::InvalidDays(index))?;
        let start = ZoneStart::parse(doc.start.trim()).ok_or(ZoneTableError::InvalidStart(index))?;
        let run_minutes = doc
            .run
            .trim()
            .parse::<u16>()
            .map_err(|_| ZoneTableError::InvalidRun(index))?;
        let average_psi = doc
            .avgpsi
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or(ZoneTableError::InvalidAveragePsi(index))?;

        Ok(Self {
            document: doc,
            days,
            start,
            run_minutes,
            average_psi,
        })
    }

    /// Zone identifier as the user typed it (e.g. `"3"`).
    pub fn number(&self) -> &str {
        &self.document.znumber
    }

    pub fn name(&self) -> &str {
        &self.document.zname
    }

    /// Valve controller grouping.
    pub fn controller(&self) -> &str {
        &self.document.controller
    }

    /// Expected pressure exactly as entered (`"45.50"` stays `"45.50"`).
    pub fn average_psi_text(&self) -> &str {
        &self.document.avgpsi
    }

    /// The source document, unchanged.
    pub fn document(&self) -> &ZoneDocument {
        &self.document
    }

    /// Eligible on `weekday` (0 = Sunday).
    pub fn runs_on(&self, weekday: u8) -> bool {
        self.days.contains(weekday)
    }
}

/// Ordered zone schedule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZoneTable {
    zones: Vec<ZoneRecord>,
}

impl ZoneTable {
    pub fn new(zones: Vec<ZoneRecord>) -> Self {
        Self { zones }
    }

    /// The "nothing scheduled" table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode the stored JSON document.
    pub fn decode(json: &str) -> Result<Self, ZoneTableError> {
        let docs: Vec<ZoneDocument> =
            serde_json::from_str(json).map_err(|_| ZoneTableError::Malformed)?;
        docs.into_iter()
            .enumerate()
            .map(|(i, doc)| ZoneRecord::from_document(i, doc))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn get(&self, index: usize) -> Option<&ZoneRecord> {
        self.zones.get(index)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneRecord> {
        self.zones.iter()
    }
}
