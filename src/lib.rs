//! Well monitor firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod api;
pub mod app;
pub mod cadence;
pub mod config;
pub mod error;
pub mod gate;
pub mod logbook;
pub mod pins;
pub mod scheduler;
pub mod zones;

// Hardware-facing modules; the ESP-IDF implementations are guarded by
// cfg attributes inside, the host builds get simulated stand-ins.
pub mod adapters;
pub mod drivers;
pub mod sensors;
