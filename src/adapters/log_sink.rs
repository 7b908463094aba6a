//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! On the device it runs alongside the push sink in
//! [`event_stream`](super::event_stream), which sends the same events to
//! web clients.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Reading(r) => {
                let id = r.id.map_or_else(|| String::from("-"), |id| id.to_string());
                let zone = r.zone.as_ref().map_or("-", |z| z.znumber.as_str());
                info!(
                    "READING | id={} | psi={:.2} | raw={:.2} | zone={}{}",
                    id,
                    r.psi,
                    r.raw_psi,
                    zone,
                    if r.zone_running { "" } else { " (idle)" },
                );
            }
            AppEvent::ZoneStarted {
                index,
                number,
                kind,
            } => {
                info!("ZONE | start | idx={} | zone={} | {:?}", index, number, kind);
            }
            AppEvent::ProgramEnded { index, reason } => {
                info!("ZONE | end | idx={} | {:?}", index, reason);
            }
            AppEvent::LogRotated { filename } => {
                info!("LOG | rotated | file={}", filename);
            }
            AppEvent::RecordSkipped(e) => {
                warn!("LOG | skipped | {}", e);
            }
            AppEvent::ZoneTableRejected => {
                warn!("ZONE | table rejected, no zones active");
            }
            AppEvent::Started {
                sample_interval_secs,
            } => {
                info!("START | interval={}s", sample_interval_secs);
            }
        }
    }
}
