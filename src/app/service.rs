//! Application service, the hexagonal core.
//!
//! [`AppService`] owns the pressure pipeline, the zone scheduler and the
//! logbook.  It exposes a clean, hardware-agnostic API.  All I/O flows
//! through port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!     AdcPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!   ClockPort ──▶ │          AppService          │
//!                 │ Pipeline · Scheduler · Log   │ ──▶ DisplayPort
//! StorageGate ◀──▶└──────────────────────────────┘
//! ```
//!
//! One tick: sample → calibrate → schedule → rotate → record → publish.

use core::time::Duration;

use log::{info, warn};

use crate::cadence;
use crate::config::{self, StoredSettings, SystemConfig, ZONE_TABLE_PATH};
use crate::error::{ConfigError, RecordError, StorageError};
use crate::gate::StorageGate;
use crate::logbook::{
    local_time, DailyLogRotation, LogEntry, ReadingRecorder, ReadingSequence, RecorderStats,
};
use crate::scheduler::{ProgramEnd, ScheduleDelegate, ZoneScheduler, ZoneStartKind};
use crate::sensors::pressure::{Calibration, PressurePipeline};
use crate::zones::{ZoneRecord, ZoneTable};

use super::commands::{AppCommand, CommandStatus};
use super::events::{AppEvent, ReadingReport};
use super::ports::{AdcPort, ClockPort, DisplayPort, EventSink, SequenceStore, StoragePort};

/// Reply to a successful zone table submission.
pub const ZONE_TABLE_STORED: &str = "Data stored successfully";

// ───────────────────────────────────────────────────────────────
// Scheduler → event sink bridge
// ───────────────────────────────────────────────────────────────

struct SinkDelegate<'a, E> {
    sink: &'a mut E,
}

impl<E: EventSink> ScheduleDelegate for SinkDelegate<'_, E> {
    fn on_zone_started(&mut self, index: usize, zone: &ZoneRecord, kind: ZoneStartKind) {
        self.sink.emit(&AppEvent::ZoneStarted {
            index,
            number: zone.number().to_string(),
            kind,
        });
    }

    fn on_program_ended(&mut self, index: usize, reason: ProgramEnd) {
        self.sink.emit(&AppEvent::ProgramEnded { index, reason });
    }
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService<Q> {
    config: SystemConfig,
    pipeline: PressurePipeline,
    scheduler: ZoneScheduler,
    rotation: DailyLogRotation,
    sequence: ReadingSequence<Q>,
    recorder: ReadingRecorder,
    zones: ZoneTable,
    /// Text the cached table was decoded from; skips re-decoding an
    /// unchanged document every tick.
    zones_source: Option<String>,
    latest: Option<ReadingReport>,
    /// Offset changed but could not be written yet.
    offset_dirty: bool,
    tick_count: u64,
}

impl<Q: SequenceStore> AppService<Q> {
    /// Construct the service from configuration.
    ///
    /// Does **not** load the stored settings; call [`boot`](Self::boot) next.
    pub fn new(config: SystemConfig, sequence: Q) -> Self {
        let pipeline = PressurePipeline::new(
            config.adc_samples,
            config.adc_averaging,
            Calibration::default(),
        );
        let rotation = DailyLogRotation::new(config.day_boundary_hour, &config.log_extension);
        Self {
            config,
            pipeline,
            scheduler: ZoneScheduler::new(),
            rotation,
            sequence: ReadingSequence::new(sequence),
            recorder: ReadingRecorder::new(),
            zones: ZoneTable::empty(),
            zones_source: None,
            latest: None,
            offset_dirty: false,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Load the settings files and the zone table.  Missing values keep
    /// their defaults; a missing sample rate file is written back so
    /// clients always find one.
    pub fn boot<S: StoragePort>(&mut self, gate: &StorageGate<S>, sink: &mut impl EventSink) {
        match gate.try_acquire() {
            Ok(mut storage) if storage.is_mounted() => {
                let stored = StoredSettings::load(&*storage);
                stored.apply_to(&mut self.config);
                if let Some(offset) = stored.calibration_offset {
                    self.pipeline = PressurePipeline::new(
                        self.config.adc_samples,
                        self.config.adc_averaging,
                        Calibration::with_offset(offset),
                    );
                }
                if stored.sample_interval_secs.is_none() {
                    let secs = self.config.sample_interval_secs;
                    if let Err(e) = config::save_sample_interval(&mut *storage, secs) {
                        warn!("Boot: could not write default sample rate: {}", e);
                    }
                }
            }
            Ok(_) => warn!("Boot: storage not mounted, running on defaults"),
            Err(e) => warn!("Boot: {}, running on defaults", e),
        }

        self.refresh_zones(gate, sink);
        info!(
            "AppService started: every {}s, {} zones, offset {:.1}",
            self.config.sample_interval_secs,
            self.zones.len(),
            self.pipeline.calibration().offset()
        );
        sink.emit(&AppEvent::Started {
            sample_interval_secs: self.config.sample_interval_secs,
        });
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full cycle and return what was published.
    pub fn tick<S: StoragePort>(
        &mut self,
        adc: &mut impl AdcPort,
        clock: &impl ClockPort,
        gate: &StorageGate<S>,
        sink: &mut impl EventSink,
    ) -> ReadingReport {
        self.tick_count += 1;

        // 1. Sample and calibrate
        let (reading, offset_changed) = self.pipeline.sample(adc);
        self.offset_dirty |= offset_changed;
        if self.offset_dirty {
            let _ = self.flush_offset(gate);
        }

        // 2. Wall clock; without it there is no schedule and no log day
        let Some(now) = clock
            .now_utc()
            .and_then(|utc| local_time(utc, self.config.utc_offset_secs))
        else {
            warn!("Tick: clock not synchronised, reading not logged");
            sink.emit(&AppEvent::RecordSkipped(RecordError::ClockNotSynced));
            return self.publish(reading.psi, reading.raw_psi, None, None, false, sink);
        };

        // 3. Schedule
        self.refresh_zones(gate, sink);
        let active = self
            .scheduler
            .evaluate(&self.zones, now, &mut SinkDelegate { sink: &mut *sink });
        let running = active.running;
        let zone = active.record.cloned();

        // 4. Rotate
        if let Some(identity) = self.rotation.observe(now) {
            sink.emit(&AppEvent::LogRotated {
                filename: identity.filename.clone(),
            });
            if let Err(e) = self.recorder.ensure_file(gate, identity) {
                warn!("Tick: daily file not created: {}", e);
            }
        }

        // 5. Record
        let id = match self.rotation.current() {
            Some(identity) => {
                let entry = LogEntry {
                    timestamp: now,
                    psi: reading.psi,
                    zone_number: zone.as_ref().map(ZoneRecord::number),
                    zone_average_psi: zone.as_ref().map(ZoneRecord::average_psi_text),
                };
                match self.recorder.record(gate, identity, &mut self.sequence, &entry) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("Tick: reading not logged: {}", e);
                        sink.emit(&AppEvent::RecordSkipped(e));
                        None
                    }
                }
            }
            None => None,
        };

        // 6. Publish
        self.publish(reading.psi, reading.raw_psi, zone.as_ref(), id, running, sink)
    }

    /// How long to sleep before the next tick, keeping ticks in phase with
    /// the wall-clock minute.  Without a synced clock nothing can be
    /// scheduled, so the plain interval is used.
    pub fn next_tick_delay(&self, clock: &impl ClockPort) -> Duration {
        let interval = self.config.sample_interval_secs;
        match clock
            .now_utc()
            .and_then(|utc| local_time(utc, self.config.utc_offset_secs))
        {
            Some(now) => cadence::delay_to_next_tick(now.time(), interval),
            None => Duration::from_secs(u64::from(interval)),
        }
    }

    /// Show the latest reading on the local display.
    pub fn render(&self, display: &mut impl DisplayPort, address: &str) {
        let psi = self.latest.as_ref().map_or(0.0, |r| r.psi);
        display.show_reading(psi, address);
    }

    // ── Command handling ──────────────────────────────────────

    /// Apply a settings change from a client and persist it.
    pub fn handle_command<S: StoragePort>(
        &mut self,
        cmd: AppCommand,
        gate: &StorageGate<S>,
    ) -> CommandStatus {
        match cmd {
            AppCommand::SetReferencePressure(reference) => {
                if !reference.is_finite() {
                    return CommandStatus::Failed(ConfigError::ValidationFailed(
                        "reference pressure must be a number",
                    ));
                }
                let reply = if reference == 0.0 {
                    info!("Calibration cleared");
                    self.pipeline.clear_calibration();
                    String::from("0.0")
                } else {
                    self.pipeline.set_reference(reference);
                    info!(
                        "Calibration reference {:.1} psi, offset {:.2}",
                        reference,
                        self.pipeline.calibration().offset()
                    );
                    let psi = self.pipeline.last_reading().map_or(reference, |r| r.psi);
                    format!("{psi:.2}")
                };
                if let Some(latest) = self.latest.as_mut() {
                    if let Some(last) = self.pipeline.last_reading() {
                        latest.psi = last.psi;
                    }
                }
                self.offset_dirty = true;
                match self.flush_offset(gate) {
                    Ok(()) => CommandStatus::Ok(reply),
                    Err(e) => CommandStatus::Failed(e),
                }
            }
            AppCommand::SetSampleRate(secs) => {
                if let Err(e) = config::validate_sample_interval(secs) {
                    return CommandStatus::Failed(e);
                }
                self.config.sample_interval_secs = secs;
                info!("Sample interval set to {}s", secs);
                persist(gate, |s| config::save_sample_interval(s, secs), secs.to_string())
            }
            AppCommand::SetLocation(label) => {
                if let Err(e) = config::validate_location(&label) {
                    return CommandStatus::Failed(e);
                }
                self.config.location.clear();
                let _ = self.config.location.push_str(&label);
                info!("Location set to '{}'", label);
                persist(gate, |s| config::save_location(s, &label), label.clone())
            }
            AppCommand::SubmitZoneTable(document) => {
                let table = match ZoneTable::decode(&document) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("Zone table rejected: {}", e);
                        return CommandStatus::Failed(ConfigError::ValidationFailed(
                            "zone table document is invalid",
                        ));
                    }
                };
                let status = persist(
                    gate,
                    |s| s.write(ZONE_TABLE_PATH, &document),
                    String::from(ZONE_TABLE_STORED),
                );
                if status.is_ok() {
                    info!("Zone table stored: {} zones", table.len());
                    self.zones = table;
                    self.zones_source = Some(document);
                }
                status
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn sample_interval_secs(&self) -> u32 {
        self.config.sample_interval_secs
    }

    pub fn location(&self) -> &str {
        &self.config.location
    }

    pub fn calibration_offset(&self) -> f32 {
        self.pipeline.calibration().offset()
    }

    /// Current daily log filename, once the clock has been valid.
    pub fn daily_filename(&self) -> Option<&str> {
        self.rotation.current().map(|i| i.filename.as_str())
    }

    pub fn latest_report(&self) -> Option<&ReadingReport> {
        self.latest.as_ref()
    }

    pub fn zone_table(&self) -> &ZoneTable {
        &self.zones
    }

    pub fn scheduler(&self) -> &ZoneScheduler {
        &self.scheduler
    }

    pub fn next_reading_id(&self) -> u32 {
        self.sequence.current()
    }

    pub fn recorder_stats(&self) -> RecorderStats {
        self.recorder.stats()
    }

    /// Total ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // ── Internal ──────────────────────────────────────────────

    /// Re-read the stored zone table.  A busy gate keeps the cached
    /// table; a missing file means no zones; a bad document means no
    /// zones until it is replaced.
    fn refresh_zones<S: StoragePort>(&mut self, gate: &StorageGate<S>, sink: &mut impl EventSink) {
        let text = match gate.with(|s| s.read_to_string(ZONE_TABLE_PATH)) {
            Err(_) => return,
            Ok(Ok(text)) => text,
            Ok(Err(StorageError::NotFound)) => String::from("[]"),
            Ok(Err(e)) => {
                warn!("Zone table unreadable: {}", e);
                return;
            }
        };
        if self.zones_source.as_deref() == Some(text.as_str()) {
            return;
        }
        self.zones = match ZoneTable::decode(&text) {
            Ok(table) => table,
            Err(e) => {
                warn!("Stored zone table rejected ({}), running with no zones", e);
                sink.emit(&AppEvent::ZoneTableRejected);
                ZoneTable::empty()
            }
        };
        self.zones_source = Some(text);
    }

    fn flush_offset<S: StoragePort>(&mut self, gate: &StorageGate<S>) -> Result<(), ConfigError> {
        let offset = self.pipeline.calibration().offset();
        let result = match gate.with(|s| config::save_calibration_offset(s, offset)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConfigError::Storage(e)),
            Err(_) => Err(ConfigError::Busy),
        };
        match result {
            Ok(()) => {
                self.offset_dirty = false;
                info!("Calibration offset {} saved", config::format_offset(offset));
            }
            Err(e) => warn!("Calibration offset {}", e),
        }
        result
    }

    fn publish(
        &mut self,
        psi: f32,
        raw_psi: f32,
        zone: Option<&ZoneRecord>,
        id: Option<u32>,
        zone_running: bool,
        sink: &mut impl EventSink,
    ) -> ReadingReport {
        let report = ReadingReport {
            id,
            psi,
            raw_psi,
            zone: zone.map(|z| z.document().clone()),
            zone_running,
        };
        sink.emit(&AppEvent::Reading(report.clone()));
        self.latest = Some(report.clone());
        report
    }
}

/// Write through the gate and turn the outcome into a client status.
fn persist<S: StoragePort>(
    gate: &StorageGate<S>,
    write: impl FnOnce(&mut S) -> Result<(), StorageError>,
    reply: String,
) -> CommandStatus {
    match gate.with(write) {
        Ok(Ok(())) => CommandStatus::Ok(reply),
        Ok(Err(e)) => {
            warn!("Setting not saved: {}", e);
            CommandStatus::Failed(ConfigError::Storage(e))
        }
        Err(_) => CommandStatus::Failed(ConfigError::Busy),
    }
}
