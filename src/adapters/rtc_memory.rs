//! Reading counter backed by RTC slow memory.
//!
//! Implements [`SequenceStore`].  On the ESP32 the counter lives in the
//! `.rtc.data` section, which the bootloader leaves alone across soft
//! resets and deep sleep but which is lost with power.  On the host it is
//! an ordinary static.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::app::ports::SequenceStore;

#[cfg_attr(target_os = "espidf", unsafe(link_section = ".rtc.data.reading_id"))]
static READING_ID: AtomicU32 = AtomicU32::new(0);

/// Handle to the process-wide reading counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtcSequenceStore;

impl RtcSequenceStore {
    pub fn new() -> Self {
        Self
    }
}

impl SequenceStore for RtcSequenceStore {
    fn load(&self) -> u32 {
        READING_ID.load(Ordering::Relaxed)
    }

    fn store(&mut self, value: u32) {
        READING_ID.store(value, Ordering::Relaxed);
    }
}
