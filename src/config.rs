//! System configuration parameters
//!
//! All tunable parameters for the well monitor, plus the single-value
//! settings files the device keeps on the SD card next to its daily logs.
//! Each settings file holds exactly one plain-text value.

use core::fmt::Write as _;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::error::{ConfigError, StorageError};

/// Calibration offset, written with one decimal place.
pub const CALIB_OFFSET_PATH: &str = "/caliboffset.txt";
/// Free-text location label shown by the client.
pub const LOCATION_PATH: &str = "/location.txt";
/// Sample interval in whole seconds.
pub const SENSOR_RATE_PATH: &str = "/sensor_rate.txt";
/// The zone schedule document.
pub const ZONE_TABLE_PATH: &str = "/zone_data.json";

/// Longest location label accepted.
pub const MAX_LOCATION_LEN: usize = 64;

/// How the ADC accumulator is turned into an average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdcAveraging {
    /// One seed read plus `N` accumulated reads, divided by `N`.  Reads
    /// slightly high; kept for parity with logs recorded by earlier units.
    ReferenceSkew,
    /// `N` reads divided by `N`.
    Exact,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Sampling ---
    /// Seconds between ticks (sample, schedule, log, publish).
    pub sample_interval_secs: u32,
    /// ADC reads accumulated per sample.
    pub adc_samples: u8,
    /// Averaging rule for the accumulated reads.
    pub adc_averaging: AdcAveraging,

    // --- Clock / logs ---
    /// Local hour at which a new daily log begins.
    pub day_boundary_hour: u8,
    /// Fixed offset from UTC to local time, in seconds (no DST).
    pub utc_offset_secs: i32,
    /// Extension of the daily log files, without the dot.
    pub log_extension: heapless::String<4>,

    // --- Network ---
    /// Chunk size used when streaming a log file to a client.
    pub stream_chunk_bytes: u16,
    /// Free-text location label.
    pub location: heapless::String<MAX_LOCATION_LEN>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut log_extension = heapless::String::new();
        let _ = log_extension.push_str("txt");
        Self {
            // Sampling
            sample_interval_secs: 30,
            adc_samples: 10,
            adc_averaging: AdcAveraging::ReferenceSkew,

            // Clock / logs
            day_boundary_hour: 6,
            utc_offset_secs: -6 * 3600, // Mountain, standard time
            log_extension,

            // Network
            stream_chunk_bytes: 256,
            location: heapless::String::new(),
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Out-of-range values are rejected, never
    /// clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_sample_interval(self.sample_interval_secs)?;
        if !(1..=64).contains(&self.adc_samples) {
            return Err(ConfigError::ValidationFailed("adc_samples must be 1–64"));
        }
        if self.day_boundary_hour > 23 {
            return Err(ConfigError::ValidationFailed(
                "day_boundary_hour must be 0–23",
            ));
        }
        if self.utc_offset_secs.abs() > 14 * 3600 {
            return Err(ConfigError::ValidationFailed(
                "utc_offset_secs must be within ±14h",
            ));
        }
        if self.log_extension.is_empty() || !self.log_extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ConfigError::ValidationFailed(
                "log_extension must be 1–4 alphanumerics",
            ));
        }
        if !(16..=4096).contains(&self.stream_chunk_bytes) {
            return Err(ConfigError::ValidationFailed(
                "stream_chunk_bytes must be 16–4096",
            ));
        }
        validate_location(&self.location)?;
        Ok(())
    }
}

/// The schedule's exact-minute start matching needs at least one tick per
/// minute, so intervals above 60 s are refused.
pub fn validate_sample_interval(secs: u32) -> Result<(), ConfigError> {
    if (1..=60).contains(&secs) {
        Ok(())
    } else {
        Err(ConfigError::ValidationFailed(
            "sample_interval_secs must be 1–60",
        ))
    }
}

pub fn validate_location(label: &str) -> Result<(), ConfigError> {
    if label.len() > MAX_LOCATION_LEN {
        return Err(ConfigError::ValidationFailed("location longer than 64 bytes"));
    }
    if !label.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        return Err(ConfigError::ValidationFailed(
            "location must be printable ASCII",
        ));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
//  Settings files
// ═══════════════════════════════════════════════════════════════

/// Values recovered from the settings files at boot.  `None` means the
/// file was missing or did not parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSettings {
    pub sample_interval_secs: Option<u32>,
    pub location: Option<String>,
    pub calibration_offset: Option<f32>,
}

impl StoredSettings {
    /// Read all three settings files.  Individual failures are logged and
    /// left as `None`; they never abort the boot.
    pub fn load(storage: &impl StoragePort) -> Self {
        let sample_interval_secs = read_value(storage, SENSOR_RATE_PATH)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| validate_sample_interval(*v).is_ok());
        let location = read_value(storage, LOCATION_PATH).filter(|v| validate_location(v).is_ok());
        let calibration_offset = read_value(storage, CALIB_OFFSET_PATH)
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite());

        info!(
            "Settings: rate={:?} location={:?} offset={:?}",
            sample_interval_secs, location, calibration_offset
        );
        Self {
            sample_interval_secs,
            location,
            calibration_offset,
        }
    }

    /// Overlay the stored values onto `config`.
    pub fn apply_to(&self, config: &mut SystemConfig) {
        if let Some(secs) = self.sample_interval_secs {
            config.sample_interval_secs = secs;
        }
        if let Some(label) = &self.location {
            config.location.clear();
            let _ = config.location.push_str(label);
        }
    }
}

fn read_value(storage: &impl StoragePort, path: &str) -> Option<String> {
    match storage.read_to_string(path) {
        Ok(text) => Some(text.lines().next().unwrap_or("").trim().to_string()),
        Err(StorageError::NotFound) => None,
        Err(e) => {
            warn!("Settings: failed to read {}: {}", path, e);
            None
        }
    }
}

/// Persist the calibration offset with one decimal place.
pub fn save_calibration_offset(
    storage: &mut impl StoragePort,
    offset: f32,
) -> Result<(), StorageError> {
    storage.write(CALIB_OFFSET_PATH, &format_offset(offset))
}

pub fn save_location(storage: &mut impl StoragePort, label: &str) -> Result<(), StorageError> {
    storage.write(LOCATION_PATH, label)
}

pub fn save_sample_interval(storage: &mut impl StoragePort, secs: u32) -> Result<(), StorageError> {
    let mut text = heapless::String::<10>::new();
    let _ = write!(text, "{secs}");
    storage.write(SENSOR_RATE_PATH, &text)
}

/// `%.1f` rendering used by the calibration file.
pub fn format_offset(offset: f32) -> String {
    format!("{:.1}", offset)
}
