//! Tick cadence.
//!
//! Zone starts match on the exact minute, so every wall-clock minute
//! needs at least one tick.  Sleeping a fixed period from the start of
//! each tick lets sleep overshoot pile up until a minute is stepped over.
//! Deadlines are therefore read off the wall clock instead: a tick is due
//! at each second of the minute that is a multiple of the interval, plus
//! [`TICK_GUARD`].  A late wake-up delays one tick and never the next.
//!
//! ```text
//!  interval 60:  ──┼•──────────────────┼•──────────────────┼•──
//!  interval 25:  ──┼•──────•──────•────┼•──────•──────•────┼•──
//!                 :00     :25    :50  :00
//! ```

use core::time::Duration;

use chrono::{NaiveTime, Timelike};

/// Offset past each boundary, so a tick never lands a hair before the
/// minute it is meant for.
pub const TICK_GUARD: Duration = Duration::from_millis(500);

/// Time from `now` (local wall time) to the next tick for an interval of
/// `interval_secs`, clamped to 1–60.
pub fn delay_to_next_tick(now: NaiveTime, interval_secs: u32) -> Duration {
    let step = interval_secs.clamp(1, 60) as usize;
    let guard_ms = TICK_GUARD.as_millis() as u64;
    // Leap-second nanoseconds run past 1e9; they count as the last ms.
    let into_minute_ms =
        u64::from(now.second()) * 1000 + u64::from(now.nanosecond().min(999_999_999) / 1_000_000);

    let next_ms = (0..60u64)
        .step_by(step)
        .map(|s| s * 1000 + guard_ms)
        .find(|&due| due > into_minute_ms)
        .unwrap_or(60_000 + guard_ms);
    Duration::from_millis(next_ms - into_minute_ms)
}
