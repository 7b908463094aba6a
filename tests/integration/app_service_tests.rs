//! Integration tests for the AppService tick pipeline.
//!
//! sample → calibrate → schedule → rotate → record → publish, driven
//! against the in-memory card and a hand-moved clock.

use wellmon::app::commands::{AppCommand, CommandStatus};
use wellmon::app::events::AppEvent;
use wellmon::app::service::{AppService, ZONE_TABLE_STORED};
use wellmon::config::{self, CALIB_OFFSET_PATH, LOCATION_PATH, SENSOR_RATE_PATH, ZONE_TABLE_PATH};
use wellmon::error::{ConfigError, RecordError};
use wellmon::gate::StorageGate;
use wellmon::scheduler::{ProgramEnd, ZoneStartKind};

use crate::mock_hw::{
    booted, utc_config, with_zones, ConstAdc, ManualClock, MemSequence, MemStorage,
    RecordingDisplay, RecordingSink,
};

/// ~30.5 psi raw with the default averaging.
fn well_adc() -> ConstAdc {
    ConstAdc(2000)
}

fn fields(line: &str) -> Vec<&str> {
    line.split(',').collect()
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_writes_default_sample_rate_when_missing() {
    let (app, gate, sink) = booted(MemStorage::new());
    assert_eq!(app.sample_interval_secs(), 30);
    gate.with(|s| assert_eq!(s.file(SENSOR_RATE_PATH), Some("30"))).unwrap();
    assert!(matches!(
        sink.events.last(),
        Some(AppEvent::Started { sample_interval_secs: 30 })
    ));
}

#[test]
fn boot_applies_stored_settings() {
    let storage = MemStorage::new()
        .with_file(SENSOR_RATE_PATH, "10\n")
        .with_file(LOCATION_PATH, "North well")
        .with_file(CALIB_OFFSET_PATH, "1.5");
    let (app, _gate, _sink) = booted(storage);
    assert_eq!(app.sample_interval_secs(), 10);
    assert_eq!(app.location(), "North well");
    assert_eq!(app.calibration_offset(), 1.5);
}

#[test]
fn boot_ignores_out_of_range_rate() {
    let (app, gate, _sink) = booted(MemStorage::new().with_file(SENSOR_RATE_PATH, "600"));
    assert_eq!(app.sample_interval_secs(), 30);
    // Unparseable or out of range counts as missing and is rewritten.
    gate.with(|s| assert_eq!(s.file(SENSOR_RATE_PATH), Some("30"))).unwrap();
}

#[test]
fn boot_without_card_runs_on_defaults() {
    let storage = MemStorage {
        unmounted: true,
        ..MemStorage::default()
    };
    let (app, _gate, sink) = booted(storage);
    assert_eq!(app.sample_interval_secs(), 30);
    assert_eq!(app.zone_table().len(), 0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::Started { .. })), 1);
}

// ── Schedule + log ────────────────────────────────────────────

#[test]
fn zone_fields_reach_log_and_report_as_entered() {
    let table = r#"[{"znumber":"3","zname":"Garden","controller":"B","days":"531","start":"07:00","run":"1","avgpsi":"45.50"}]"#;
    let (mut app, gate, mut sink) = booted(MemStorage::new().with_file(ZONE_TABLE_PATH, table));
    let clock = ManualClock::at(2024, 8, 19, 7, 0, 0);

    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    let zone = r.zone.as_ref().unwrap();
    assert_eq!(zone.avgpsi, "45.50");
    assert_eq!(zone.days, "531");

    let v: serde_json::Value = serde_json::from_str(&r.to_json()).unwrap();
    assert_eq!(v["Active Zone"]["avgpsi"], "45.50");

    gate.with(|s| {
        let lines = s.lines("/190824.txt");
        let f = fields(lines[0]);
        assert_eq!((f[4], f[5]), ("3", "45.50"));
    })
    .unwrap();
}

#[test]
fn monday_program_runs_zone_then_chained_zone() {
    let (mut app, gate, mut sink) = booted(with_zones());
    let clock = ManualClock::at(2024, 8, 19, 7, 0, 0); // Monday
    let mut adc = well_adc();

    let r = app.tick(&mut adc, &clock, &gate, &mut sink);
    assert_eq!(r.zone.as_ref().map(|z| z.znumber.as_str()), Some("1"));
    assert!(r.zone_running);
    assert_eq!(r.id, Some(0));

    clock.advance_secs(60);
    let r = app.tick(&mut adc, &clock, &gate, &mut sink);
    assert_eq!(r.zone.as_ref().map(|z| z.znumber.as_str()), Some("1"));

    clock.advance_secs(60); // 07:02, zone 1 done
    let r = app.tick(&mut adc, &clock, &gate, &mut sink);
    assert_eq!(r.zone.as_ref().map(|z| z.znumber.as_str()), Some("2"));
    assert!(r.zone_running);

    clock.advance_secs(60); // 07:03, zone 2 done, nothing after it
    let r = app.tick(&mut adc, &clock, &gate, &mut sink);
    assert!(!r.zone_running);
    assert_eq!(r.zone.as_ref().map(|z| z.znumber.as_str()), Some("1"));

    let starts: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::ZoneStarted { index, kind, .. } => Some((*index, *kind)),
            _ => None,
        })
        .collect();
    assert_eq!(
        starts,
        vec![(0, ZoneStartKind::Scheduled), (1, ZoneStartKind::Chained)]
    );
    assert_eq!(
        sink.count(|e| matches!(
            e,
            AppEvent::ProgramEnded { index: 1, reason: ProgramEnd::Completed }
        )),
        1
    );

    gate.with(|s| {
        let lines = s.lines("/190824.txt");
        assert_eq!(lines.len(), 4);
        let first = fields(lines[0]);
        assert_eq!(&first[..3], &["0", "2024-08-19", "07:00:00"]);
        assert_eq!(&first[4..], &["1", "40"]);
        let third = fields(lines[2]);
        assert_eq!(third[0], "2");
        assert_eq!(&third[4..], &["2", "38.5"]);
        // Idle placeholder is logged too.
        assert_eq!(&fields(lines[3])[4..], &["1", "40"]);
    })
    .unwrap();
}

#[test]
fn off_day_reports_idle_placeholder() {
    let (mut app, gate, mut sink) = booted(with_zones());
    let clock = ManualClock::at(2024, 8, 20, 7, 0, 0); // Tuesday
    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    assert!(!r.zone_running);
    assert_eq!(r.zone.as_ref().map(|z| z.znumber.as_str()), Some("1"));
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ZoneStarted { .. })), 0);
}

#[test]
fn empty_table_logs_blank_zone_fields() {
    let (mut app, gate, mut sink) = booted(MemStorage::new());
    let clock = ManualClock::at(2024, 8, 19, 12, 0, 0);
    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    assert!(r.zone.is_none());
    assert!(r.to_json().ends_with(r#""Active Zone":{}}"#));
    gate.with(|s| {
        let lines = s.lines("/190824.txt");
        assert_eq!(&fields(lines[0])[4..], &["", ""]);
    })
    .unwrap();
}

#[test]
fn day_boundary_starts_new_file() {
    let (mut app, gate, mut sink) = booted(MemStorage::new());
    let clock = ManualClock::at(2024, 8, 20, 5, 59, 30);
    let mut adc = well_adc();

    app.tick(&mut adc, &clock, &gate, &mut sink);
    assert_eq!(app.daily_filename(), Some("190824.txt"));
    clock.advance_secs(60);
    app.tick(&mut adc, &clock, &gate, &mut sink);
    assert_eq!(app.daily_filename(), Some("200824.txt"));

    let rotated: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::LogRotated { filename } => Some(filename.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(rotated, vec!["190824.txt", "200824.txt"]);
    gate.with(|s| {
        assert_eq!(s.lines("/190824.txt").len(), 1);
        let next = s.lines("/200824.txt");
        assert_eq!(next.len(), 1);
        // Ids carry on across files.
        assert_eq!(fields(next[0])[0], "1");
    })
    .unwrap();
}

#[test]
fn local_offset_moves_the_log_day() {
    let gate = StorageGate::new(MemStorage::new());
    let mut app = AppService::new(
        config::SystemConfig {
            utc_offset_secs: -6 * 3600,
            ..config::SystemConfig::default()
        },
        MemSequence::default(),
    );
    let mut sink = RecordingSink::new();
    app.boot(&gate, &mut sink);
    // 11:00 UTC is 05:00 local: still the previous log day.
    let clock = ManualClock::at(2024, 8, 20, 11, 0, 0);
    app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    assert_eq!(app.daily_filename(), Some("190824.txt"));
}

// ── Degraded paths ────────────────────────────────────────────

#[test]
fn busy_gate_drops_reading_without_consuming_id() {
    let (mut app, gate, mut sink) = booted(with_zones());
    let clock = ManualClock::at(2024, 8, 19, 6, 59, 0);
    let mut adc = well_adc();
    assert_eq!(app.tick(&mut adc, &clock, &gate, &mut sink).id, Some(0));

    clock.advance_secs(60); // 07:00 while a download holds the card
    let guard = gate.try_acquire().unwrap();
    let r = app.tick(&mut adc, &clock, &gate, &mut sink);
    drop(guard);
    assert_eq!(r.id, None);
    // The cached table still drives the schedule.
    assert!(r.zone_running);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::RecordSkipped(RecordError::Busy))),
        1
    );
    assert_eq!(app.recorder_stats().dropped_busy, 1);

    clock.advance_secs(60);
    assert_eq!(app.tick(&mut adc, &clock, &gate, &mut sink).id, Some(1));
    gate.with(|s| assert_eq!(s.lines("/190824.txt").len(), 2)).unwrap();
}

#[test]
fn unsynced_clock_publishes_but_does_not_log() {
    let (mut app, gate, mut sink) = booted(with_zones());
    let clock = ManualClock::new();
    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    assert_eq!(r.id, None);
    assert!(r.zone.is_none());
    assert!(app.latest_report().is_some());
    assert_eq!(app.daily_filename(), None);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::RecordSkipped(RecordError::ClockNotSynced))),
        1
    );
    assert_eq!(app.next_reading_id(), 0);
}

#[test]
fn missing_card_skips_record_as_unavailable() {
    let (mut app, mut gate, mut sink) = booted(MemStorage::new());
    gate.get_mut().unmounted = true;
    let clock = ManualClock::at(2024, 8, 19, 12, 0, 0);
    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    assert_eq!(r.id, None);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::RecordSkipped(RecordError::Unavailable))),
        1
    );
}

#[test]
fn bad_stored_table_runs_with_no_zones() {
    let storage = MemStorage::new().with_file(ZONE_TABLE_PATH, r#"[{"znumber":"1"}]"#);
    let (mut app, gate, mut sink) = booted(storage);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ZoneTableRejected)), 1);
    let clock = ManualClock::at(2024, 8, 19, 7, 0, 0);
    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    assert!(r.zone.is_none());
    // Same bad text is not re-reported every tick.
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ZoneTableRejected)), 1);
}

#[test]
fn table_edited_on_card_is_picked_up_next_tick() {
    let (mut app, mut gate, mut sink) = booted(MemStorage::new());
    assert_eq!(app.zone_table().len(), 0);
    gate.get_mut()
        .files
        .insert(ZONE_TABLE_PATH.to_string(), crate::mock_hw::TWO_ZONE_TABLE.to_string());
    let clock = ManualClock::at(2024, 8, 19, 7, 0, 0);
    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    assert_eq!(app.zone_table().len(), 2);
    assert!(r.zone_running);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn calibration_sets_offset_and_persists_it() {
    let (mut app, gate, mut sink) = booted(MemStorage::new());
    let clock = ManualClock::at(2024, 8, 19, 12, 0, 0);
    let mut adc = well_adc();
    let raw = app.tick(&mut adc, &clock, &gate, &mut sink).raw_psi;

    let status = app.handle_command(AppCommand::SetReferencePressure(40.0), &gate);
    assert_eq!(status, CommandStatus::Ok(String::from("40.00")));
    let offset = app.calibration_offset();
    assert!((offset - (raw - 40.0)).abs() < 1e-4);
    gate.with(|s| {
        assert_eq!(s.file(CALIB_OFFSET_PATH), Some(config::format_offset(offset).as_str()));
    })
    .unwrap();

    let r = app.tick(&mut adc, &clock, &gate, &mut sink);
    assert!((r.psi - 40.0).abs() < 1e-3);

    // Same gauge value again: nothing moves.
    assert!(app.handle_command(AppCommand::SetReferencePressure(40.0), &gate).is_ok());
    assert_eq!(app.calibration_offset(), offset);
}

#[test]
fn zero_reference_clears_calibration() {
    let (mut app, gate, mut sink) = booted(MemStorage::new().with_file(CALIB_OFFSET_PATH, "2.5"));
    let clock = ManualClock::at(2024, 8, 19, 12, 0, 0);
    app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    let status = app.handle_command(AppCommand::SetReferencePressure(0.0), &gate);
    assert_eq!(status, CommandStatus::Ok(String::from("0.0")));
    assert_eq!(app.calibration_offset(), 0.0);
    gate.with(|s| assert_eq!(s.file(CALIB_OFFSET_PATH), Some("0.0"))).unwrap();
}

#[test]
fn reference_before_first_sample_applies_on_next_tick() {
    let (mut app, gate, mut sink) = booted(MemStorage::new());
    let status = app.handle_command(AppCommand::SetReferencePressure(40.0), &gate);
    assert_eq!(status, CommandStatus::Ok(String::from("40.00")));
    assert_eq!(app.calibration_offset(), 0.0);

    let clock = ManualClock::at(2024, 8, 19, 12, 0, 0);
    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    assert!((r.psi - 40.0).abs() < 1e-3);
    let offset = app.calibration_offset();
    assert!(offset < 0.0);
    gate.with(|s| {
        assert_eq!(s.file(CALIB_OFFSET_PATH), Some(config::format_offset(offset).as_str()));
    })
    .unwrap();
}

#[test]
fn offset_save_retried_after_busy() {
    let (mut app, gate, mut sink) = booted(MemStorage::new());
    let clock = ManualClock::at(2024, 8, 19, 12, 0, 0);
    let mut adc = well_adc();
    app.tick(&mut adc, &clock, &gate, &mut sink);

    let guard = gate.try_acquire().unwrap();
    let status = app.handle_command(AppCommand::SetReferencePressure(40.0), &gate);
    drop(guard);
    assert_eq!(status, CommandStatus::Failed(ConfigError::Busy));
    gate.with(|s| assert_eq!(s.file(CALIB_OFFSET_PATH), None)).unwrap();

    app.tick(&mut adc, &clock, &gate, &mut sink);
    let offset = app.calibration_offset();
    gate.with(|s| {
        assert_eq!(s.file(CALIB_OFFSET_PATH), Some(config::format_offset(offset).as_str()));
    })
    .unwrap();
}

#[test]
fn sample_rate_is_validated_and_saved() {
    let (mut app, gate, _sink) = booted(MemStorage::new());
    let ok = app.handle_command(AppCommand::SetSampleRate(15), &gate);
    assert_eq!(ok, CommandStatus::Ok(String::from("15")));
    assert_eq!(app.sample_interval_secs(), 15);
    gate.with(|s| assert_eq!(s.file(SENSOR_RATE_PATH), Some("15"))).unwrap();

    for bad in [0, 61, 3600] {
        let status = app.handle_command(AppCommand::SetSampleRate(bad), &gate);
        assert!(matches!(status, CommandStatus::Failed(ConfigError::ValidationFailed(_))));
    }
    assert_eq!(app.sample_interval_secs(), 15);
}

#[test]
fn location_is_saved() {
    let (mut app, gate, _sink) = booted(MemStorage::new());
    let status = app.handle_command(AppCommand::SetLocation(String::from("Pump house")), &gate);
    assert!(status.is_ok());
    assert_eq!(app.location(), "Pump house");
    gate.with(|s| assert_eq!(s.file(LOCATION_PATH), Some("Pump house"))).unwrap();

    let status = app.handle_command(AppCommand::SetLocation(String::from("tab\there")), &gate);
    assert!(!status.is_ok());
    assert_eq!(app.location(), "Pump house");
}

#[test]
fn zone_table_submission_replaces_table() {
    let (mut app, gate, _sink) = booted(MemStorage::new());
    let bad = app.handle_command(AppCommand::SubmitZoneTable(String::from("{not json")), &gate);
    assert!(matches!(bad, CommandStatus::Failed(ConfigError::ValidationFailed(_))));
    gate.with(|s| assert_eq!(s.file(ZONE_TABLE_PATH), None)).unwrap();

    let doc = String::from(crate::mock_hw::TWO_ZONE_TABLE);
    let ok = app.handle_command(AppCommand::SubmitZoneTable(doc.clone()), &gate);
    assert_eq!(ok, CommandStatus::Ok(String::from(ZONE_TABLE_STORED)));
    assert_eq!(app.zone_table().len(), 2);
    gate.with(|s| assert_eq!(s.file(ZONE_TABLE_PATH), Some(doc.as_str()))).unwrap();
}

#[test]
fn failed_write_reports_storage_error() {
    let (mut app, mut gate, _sink) = booted(MemStorage::new());
    gate.get_mut().fail_writes = true;
    let status = app.handle_command(AppCommand::SetSampleRate(20), &gate);
    assert!(matches!(status, CommandStatus::Failed(ConfigError::Storage(_))));
    // Applied in memory even though it was not saved.
    assert_eq!(app.sample_interval_secs(), 20);
}

// ── Display ───────────────────────────────────────────────────

#[test]
fn render_shows_latest_reading_and_address() {
    let gate = StorageGate::new(MemStorage::new());
    let mut app = AppService::new(utc_config(), MemSequence::default());
    let mut sink = RecordingSink::new();
    app.boot(&gate, &mut sink);

    let mut display = RecordingDisplay::default();
    app.render(&mut display, "10.0.0.7");
    assert_eq!(display.last, Some((0.0, String::from("10.0.0.7"))));

    let clock = ManualClock::at(2024, 8, 19, 12, 0, 0);
    let r = app.tick(&mut well_adc(), &clock, &gate, &mut sink);
    app.render(&mut display, "10.0.0.7");
    assert_eq!(display.last.as_ref().map(|(psi, _)| *psi), Some(r.psi));
    assert_eq!(app.tick_count(), 1);
}

#[test]
fn next_tick_follows_wall_clock_minute() {
    let (app, _gate, _) = booted(MemStorage::new());
    let clock = ManualClock::at(2024, 8, 19, 6, 59, 59);
    assert_eq!(app.next_tick_delay(&clock), std::time::Duration::from_millis(1_500));
    clock.set(2024, 8, 19, 7, 0, 10);
    // 30 s interval: next slot is :30.5.
    assert_eq!(app.next_tick_delay(&clock), std::time::Duration::from_millis(20_500));
    clock.unsync();
    assert_eq!(app.next_tick_delay(&clock), std::time::Duration::from_secs(30));
}
