//! GPIO / peripheral pin assignments for the well monitor board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Pressure transducer (ADC1)
// ---------------------------------------------------------------------------

/// 0.5–4.5 V ratiometric transducer through a divider.
/// ADC1 channel 0 (GPIO 36 / SENSOR_VP on ESP32).
pub const PRESSURE_ADC_GPIO: i32 = 36;

// ---------------------------------------------------------------------------
// Micro SD card (VSPI)
// ---------------------------------------------------------------------------

// `main` takes these pins as typed peripherals; keep the two in step.

pub const SD_SCK_GPIO: i32 = 18;
pub const SD_MISO_GPIO: i32 = 19;
pub const SD_MOSI_GPIO: i32 = 23;
pub const SD_CS_GPIO: i32 = 5;
