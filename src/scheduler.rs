//! Zone scheduler: which irrigation zone should be running right now.
//!
//! The scheduler does not drive valves.  It replays the user's zone table
//! against the wall clock so each pressure reading can be tagged with the
//! zone that was (probably) open, and reports transitions to a
//! [`ScheduleDelegate`].
//!
//! ```text
//!           start == now on an eligible day
//!   ┌──────┐ ───────────────────────────────▶ ┌─────────┐
//!   │ Idle │                                  │ Running │──┐ next zone chained,
//!   └──────┘ ◀─────────────────────────────── └─────────┘◀─┘ or its start == now
//!        last zone done / next start missed
//! ```
//!
//! ## Timing contract
//!
//! Starts are matched by **equality** with the current minute, not by
//! range.  The loop must evaluate at least once inside every minute or a
//! start can be skipped until its next eligible weekday.  `SystemConfig`
//! refuses tick intervals above 60 s for this reason.

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::{debug, info, warn};

use crate::zones::{day_of_week, TimeOfDay, ZoneRecord, ZoneStart, ZoneTable};

const MINUTES_PER_DAY: i32 = 24 * 60;

// ═══════════════════════════════════════════════════════════════
//  Delegate
// ═══════════════════════════════════════════════════════════════

/// How a zone came to be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStartKind {
    /// Its own start time matched.
    Scheduled,
    /// It follows the previous zone immediately.
    Chained,
}

/// Why the scheduler went back to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramEnd {
    /// The last zone in the table finished.
    Completed,
    /// The next zone has its own start time and it is not now.
    NextStartNotDue,
    /// The table changed under a running zone.
    TableChanged,
}

/// Callback trait the scheduler invokes on transitions.
pub trait ScheduleDelegate {
    fn on_zone_started(&mut self, index: usize, zone: &ZoneRecord, kind: ZoneStartKind);
    fn on_program_ended(&mut self, index: usize, reason: ProgramEnd);
}

// ═══════════════════════════════════════════════════════════════
//  State
// ═══════════════════════════════════════════════════════════════

/// Scheduler state.  Start time and duration only exist while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Idle {
        /// First table index the next scan looks at.
        cursor: usize,
    },
    Running {
        index: usize,
        started: TimeOfDay,
        run_minutes: u16,
    },
}

/// Result of one evaluation.
///
/// When nothing is running this is a placeholder for zone 0 with
/// `running == false`: clients display zone 0 by default.  It does not
/// mean zone 0 is scheduled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveZone<'t> {
    pub index: usize,
    /// `None` only when the table is empty.
    pub record: Option<&'t ZoneRecord>,
    pub running: bool,
}

impl<'t> ActiveZone<'t> {
    fn placeholder(table: &'t ZoneTable) -> Self {
        Self {
            index: 0,
            record: table.get(0),
            running: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// The zone activation state machine.  Lives as long as the process.
#[derive(Debug)]
pub struct ZoneScheduler {
    state: ScheduleState,
}

impl Default for ZoneScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneScheduler {
    pub fn new() -> Self {
        Self {
            state: ScheduleState::Idle { cursor: 0 },
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ScheduleState::Running { .. })
    }

    /// Evaluate the table at local time `now`.
    pub fn evaluate<'t>(
        &mut self,
        table: &'t ZoneTable,
        now: NaiveDateTime,
        delegate: &mut dyn ScheduleDelegate,
    ) -> ActiveZone<'t> {
        let weekday = day_of_week(now.year(), now.month(), now.day());
        let minute = TimeOfDay::new(now.hour() as u8, now.minute() as u8);

        match self.state {
            ScheduleState::Idle { cursor } => self.scan(table, cursor, weekday, minute, delegate),
            ScheduleState::Running {
                index,
                started,
                run_minutes,
            } => {
                let elapsed = (i32::from(minute.minutes()) - i32::from(started.minutes()))
                    .rem_euclid(MINUTES_PER_DAY);
                debug!(
                    "Scheduler: zone {} started {} elapsed {}m of {}m",
                    index, started, elapsed, run_minutes
                );

                if elapsed < i32::from(run_minutes) {
                    if let Some(zone) = table.get(index) {
                        return ActiveZone {
                            index,
                            record: Some(zone),
                            running: true,
                        };
                    }
                    warn!("Scheduler: running zone {} no longer in table", index);
                    return self.end(table, index, ProgramEnd::TableChanged, delegate);
                }

                self.advance(table, index + 1, minute, delegate)
            }
        }
    }

    /// Idle: look for a zone whose own start is now, from `cursor` to the
    /// end of the table.  Never wraps.
    fn scan<'t>(
        &mut self,
        table: &'t ZoneTable,
        cursor: usize,
        weekday: u8,
        minute: TimeOfDay,
        delegate: &mut dyn ScheduleDelegate,
    ) -> ActiveZone<'t> {
        let due = table
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, z)| z.runs_on(weekday) && z.start == ZoneStart::At(minute));

        match due {
            Some((index, zone)) => self.start(index, zone, minute, ZoneStartKind::Scheduled, delegate),
            None => {
                self.state = ScheduleState::Idle { cursor: 0 };
                ActiveZone::placeholder(table)
            }
        }
    }

    /// Running zone finished: hand over to `next`, or stop.
    fn advance<'t>(
        &mut self,
        table: &'t ZoneTable,
        next: usize,
        minute: TimeOfDay,
        delegate: &mut dyn ScheduleDelegate,
    ) -> ActiveZone<'t> {
        let Some(zone) = table.get(next) else {
            info!("Scheduler: no more zones, program complete");
            return self.end(table, next - 1, ProgramEnd::Completed, delegate);
        };

        match zone.start {
            ZoneStart::Chained => self.start(next, zone, minute, ZoneStartKind::Chained, delegate),
            ZoneStart::At(at) if at == minute => {
                self.start(next, zone, minute, ZoneStartKind::Scheduled, delegate)
            }
            ZoneStart::At(at) => {
                info!("Scheduler: next zone {} starts at {}, not now; program ends", next, at);
                self.end(table, next - 1, ProgramEnd::NextStartNotDue, delegate)
            }
        }
    }

    fn start<'t>(
        &mut self,
        index: usize,
        zone: &'t ZoneRecord,
        minute: TimeOfDay,
        kind: ZoneStartKind,
        delegate: &mut dyn ScheduleDelegate,
    ) -> ActiveZone<'t> {
        info!(
            "Scheduler: zone {} '{}' running for {}m ({:?})",
            zone.number(), zone.name(), zone.run_minutes, kind
        );
        self.state = ScheduleState::Running {
            index,
            started: minute,
            run_minutes: zone.run_minutes,
        };
        delegate.on_zone_started(index, zone, kind);
        ActiveZone {
            index,
            record: Some(zone),
            running: true,
        }
    }

    fn end<'t>(
        &mut self,
        table: &'t ZoneTable,
        last: usize,
        reason: ProgramEnd,
        delegate: &mut dyn ScheduleDelegate,
    ) -> ActiveZone<'t> {
        self.state = ScheduleState::Idle { cursor: 0 };
        delegate.on_program_ended(last, reason);
        ActiveZone::placeholder(table)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
