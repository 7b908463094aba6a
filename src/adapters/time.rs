//! Wall-clock adapter.
//!
//! Implements [`ClockPort`] for the well monitor.
//!
//! - **`target_os = "espidf"`**: reads `gettimeofday()`, which SNTP keeps
//!   in sync once the network is up.
//! - **`not(target_os = "espidf")`**: uses `std::time::SystemTime` for
//!   host-side simulation.
//!
//! Anything before 2020-01-01 is reported as "not synchronised": after a
//! cold boot the ESP32 RTC counts from the 1970 epoch until SNTP answers.

use chrono::{DateTime, Utc};

use crate::app::ports::ClockPort;

/// 2020-01-01T00:00:00Z.
pub const EPOCH_2020: i64 = 1_577_836_800;

/// Accept `secs` since the Unix epoch only if it looks synchronised.
pub fn validate_epoch(secs: i64, micros: u32) -> Option<DateTime<Utc>> {
    if secs < EPOCH_2020 {
        return None;
    }
    DateTime::from_timestamp(secs, micros.saturating_mul(1000))
}

/// System clock adapter.
#[derive(Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    #[cfg(target_os = "espidf")]
    fn now_utc(&self) -> Option<DateTime<Utc>> {
        use core::ptr;
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: gettimeofday writes into the stack-owned timeval only.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return None;
        }
        validate_epoch(tv.tv_sec as i64, tv.tv_usec.max(0) as u32)
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_utc(&self) -> Option<DateTime<Utc>> {
        let since = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?;
        validate_epoch(since.as_secs() as i64, since.subsec_micros())
    }
}
