//! Raw ADC counts → calibrated well pressure.
//!
//! The transducer is specified for 0.5–4.5 V on a 5 V supply but runs at
//! 3.3 V here, so only the lower ~63 PSI of its span is usable.  The
//! conversion is:
//!
//! 1. average a burst of ADC reads,
//! 2. correct the ESP32 ADC nonlinearity with a fixed quartic (counts → V),
//! 3. map `[MIN_VOLTS, MAX_VOLTS]` linearly onto `[MIN_PSI, MAX_PSI]`,
//!    unclamped so a drifting sensor shows up as an implausible value,
//! 4. subtract the one-point calibration offset.
//!
//! Sensing never fails.

use crate::app::ports::AdcPort;
use crate::config::AdcAveraging;

/// Voltage window of the transducer as wired (experimentally trimmed).
pub const MIN_VOLTS: f64 = 0.8;
pub const MAX_VOLTS: f64 = 3.1;
/// Pressure at the ends of the voltage window.
pub const MIN_PSI: f64 = 0.8;
pub const MAX_PSI: f64 = 63.0;

/// ADC linearisation, highest power first.
const ADC_QUARTIC: [f64; 5] = [
    -0.000_000_000_000_016,
    0.000_000_000_118_171,
    -0.000_000_301_211_691,
    0.001_109_019_271_794,
    0.034_143_524_634_089,
];

/// Everything derived from one sample, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReading {
    /// Averaged ADC count.
    pub adc_raw: u32,
    pub voltage: f64,
    /// Pressure before calibration.
    pub raw_psi: f32,
    /// Offset in force when the reading was taken.
    pub offset: f32,
    /// `raw_psi - offset`.
    pub psi: f32,
}

/// One-point calibration against an external gauge.
///
/// The offset is recomputed only when the reference differs from the one
/// last applied; resubmitting the same gauge value leaves it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Calibration {
    /// Submitted but not yet applied reference value.
    pending: Option<f32>,
    /// Reference value the current offset was derived from.
    last_reference: Option<f32>,
    offset: f32,
}

impl Calibration {
    /// Start from a previously persisted offset.
    pub fn with_offset(offset: f32) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn last_reference(&self) -> Option<f32> {
        self.last_reference
    }

    /// Queue a reference pressure.  Returns `false` if it equals the
    /// reference already applied (nothing to do).
    pub fn submit(&mut self, reference: f32) -> bool {
        if self.last_reference == Some(reference) {
            self.pending = None;
            return false;
        }
        self.pending = Some(reference);
        true
    }

    /// Drop the offset entirely.
    pub fn clear(&mut self) {
        self.pending = None;
        self.last_reference = None;
        self.offset = 0.0;
    }

    /// Fold a pending reference into the offset using the current raw
    /// pressure.  Returns `true` if the offset changed.
    pub fn apply(&mut self, raw_psi: f32) -> bool {
        let Some(reference) = self.pending.take() else {
            return false;
        };
        self.offset = raw_psi - reference;
        self.last_reference = Some(reference);
        true
    }
}

/// Sampling and conversion pipeline.  Owns the calibration state.
pub struct PressurePipeline {
    samples: u8,
    averaging: AdcAveraging,
    calibration: Calibration,
    last: Option<PressureReading>,
}

impl PressurePipeline {
    pub fn new(samples: u8, averaging: AdcAveraging, calibration: Calibration) -> Self {
        Self {
            samples: samples.max(1),
            averaging,
            calibration,
            last: None,
        }
    }

    /// Take one averaged sample and convert it.
    ///
    /// The second element is `true` when a pending calibration reference
    /// was folded in during this sample, i.e. the offset needs persisting.
    pub fn sample(&mut self, adc: &mut impl AdcPort) -> (PressureReading, bool) {
        let adc_raw = self.average(adc);
        let voltage = counts_to_volts(adc_raw);
        let raw_psi = volts_to_psi(voltage) as f32;
        let changed = self.calibration.apply(raw_psi);
        let offset = self.calibration.offset();

        let reading = PressureReading {
            adc_raw,
            voltage,
            raw_psi,
            offset,
            psi: raw_psi - offset,
        };
        self.last = Some(reading);
        (reading, changed)
    }

    /// Submit a gauge reading.  If a sample has already been taken the
    /// offset is derived from it immediately; otherwise on the next
    /// sample.  Returns `true` if the offset changed now.
    pub fn set_reference(&mut self, reference: f32) -> bool {
        if !self.calibration.submit(reference) {
            return false;
        }
        match self.last {
            Some(ref mut last) => {
                let changed = self.calibration.apply(last.raw_psi);
                last.offset = self.calibration.offset();
                last.psi = last.raw_psi - last.offset;
                changed
            }
            None => false,
        }
    }

    pub fn clear_calibration(&mut self) {
        self.calibration.clear();
        if let Some(ref mut last) = self.last {
            last.offset = 0.0;
            last.psi = last.raw_psi;
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Most recent reading, with the offset currently in force.
    pub fn last_reading(&self) -> Option<PressureReading> {
        self.last
    }

    fn average(&self, adc: &mut impl AdcPort) -> u32 {
        let n = u32::from(self.samples);
        let mut acc: u32 = match self.averaging {
            AdcAveraging::ReferenceSkew => u32::from(adc.read_raw()),
            AdcAveraging::Exact => 0,
        };
        for _ in 0..n {
            acc += u32::from(adc.read_raw());
        }
        acc / n
    }
}

/// Quartic ADC correction, counts → volts.
pub fn counts_to_volts(counts: u32) -> f64 {
    let x = f64::from(counts);
    ADC_QUARTIC.iter().fold(0.0, |acc, c| acc * x + c)
}

/// Linear map of the voltage window onto the pressure window, unclamped.
pub fn volts_to_psi(volts: f64) -> f64 {
    (volts - MIN_VOLTS) * (MAX_PSI - MIN_PSI) / (MAX_VOLTS - MIN_VOLTS) + MIN_PSI
}
