//! Sensor subsystem for the well pressure transducer.
//!
//! [`PressureInput`] is the ADC driver; [`pressure::PressurePipeline`]
//! turns its raw counts into a calibrated pressure each tick.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads ADC1 through the oneshot handle set up by `hw_init`.
//! On host/test: reads from a static `AtomicU16` for injection.

pub mod pressure;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU16, Ordering};

use crate::app::ports::AdcPort;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;

#[cfg(not(target_os = "espidf"))]
static SIM_PRESSURE_ADC: AtomicU16 = AtomicU16::new(0);

/// Inject the raw count the simulated ADC returns.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_pressure_adc(raw: u16) {
    SIM_PRESSURE_ADC.store(raw, Ordering::Relaxed);
}

/// ADC driver for the pressure transducer.
pub struct PressureInput {
    _adc_gpio: i32,
}

impl PressureInput {
    pub fn new(adc_gpio: i32) -> Self {
        Self { _adc_gpio: adc_gpio }
    }
}

impl AdcPort for PressureInput {
    #[cfg(target_os = "espidf")]
    fn read_raw(&mut self) -> u16 {
        hw_init::adc1_read(hw_init::ADC1_CH_PRESSURE)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&mut self) -> u16 {
        SIM_PRESSURE_ADC.load(Ordering::Relaxed)
    }
}
