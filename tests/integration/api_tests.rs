//! Integration tests for request routing and log streaming.
//!
//! Requests go through `api::handle` exactly as the HTTP adapter sends
//! them; responses are checked for the status codes and bodies the web
//! page relies on.

use wellmon::api::{self, ApiRequest, ApiResponse, Method, Reply, StreamOutcome};
use wellmon::app::service::{AppService, ZONE_TABLE_STORED};
use wellmon::config::{CALIB_OFFSET_PATH, LOCATION_PATH, ZONE_TABLE_PATH};
use wellmon::error::StorageError;
use wellmon::gate::StorageGate;

use crate::mock_hw::{booted, with_zones, ConstAdc, ManualClock, MemSequence, MemStorage, RecordingSink};

fn get<Q: wellmon::app::ports::SequenceStore>(
    app: &mut AppService<Q>,
    gate: &StorageGate<MemStorage>,
    uri: &str,
) -> Reply {
    get_with_flash(app, gate, &mut MemStorage::new(), uri)
}

fn get_with_flash<Q: wellmon::app::ports::SequenceStore>(
    app: &mut AppService<Q>,
    gate: &StorageGate<MemStorage>,
    flash: &mut MemStorage,
    uri: &str,
) -> Reply {
    api::handle(&ApiRequest::new(Method::Get, uri, b""), app, gate, flash)
}

fn post<Q: wellmon::app::ports::SequenceStore>(
    app: &mut AppService<Q>,
    gate: &StorageGate<MemStorage>,
    uri: &str,
    body: &str,
) -> Reply {
    let req = ApiRequest::new(Method::Post, uri, body.as_bytes());
    api::handle(&req, app, gate, &mut MemStorage::new())
}

/// Flash partition as shipped: pages plus two preset tables, one empty.
fn flash() -> MemStorage {
    MemStorage::new()
        .with_file("/index.html", "<html>wellmon</html>")
        .with_file("/config.js", "// config page")
        .with_file("/north.json", crate::mock_hw::TWO_ZONE_TABLE)
        .with_file("/blank.json", "[]")
}

fn response(reply: Reply) -> ApiResponse {
    match reply {
        Reply::Respond(r) => r,
        other => panic!("expected a plain response, got {other:?}"),
    }
}

fn tick_once(app: &mut AppService<MemSequence>, gate: &StorageGate<MemStorage>) {
    let clock = ManualClock::at(2024, 8, 19, 7, 0, 0);
    let mut sink = RecordingSink::new();
    app.tick(&mut ConstAdc(2000), &clock, gate, &mut sink);
}

// ── Reads ─────────────────────────────────────────────────────

#[test]
fn daily_filename_empty_until_clock_valid() {
    let (mut app, gate, _) = booted(MemStorage::new());
    assert_eq!(response(get(&mut app, &gate, "/get-daily-filename")).body, "");
    tick_once(&mut app, &gate);
    assert_eq!(
        response(get(&mut app, &gate, "/get-daily-filename")).body,
        "190824.txt"
    );
}

#[test]
fn readings_before_and_after_first_tick() {
    let (mut app, gate, _) = booted(with_zones());
    assert_eq!(response(get(&mut app, &gate, "/readings")).status, 503);

    tick_once(&mut app, &gate);
    let r = response(get(&mut app, &gate, "/readings"));
    assert_eq!(r.status, 200);
    assert_eq!(r.content_type, api::CONTENT_JSON);
    let v: serde_json::Value = serde_json::from_str(&r.body).unwrap();
    assert_eq!(v["Current Pressure"], "30");
    assert_eq!(v["Active Zone"]["znumber"], "1");
    assert_eq!(v["Active Zone"]["zname"], "Front lawn");
}

#[test]
fn settings_reads_reflect_service() {
    let storage = MemStorage::new()
        .with_file(LOCATION_PATH, "Pump house")
        .with_file(CALIB_OFFSET_PATH, "-1.5");
    let (mut app, gate, _) = booted(storage);
    assert_eq!(response(get(&mut app, &gate, "/get-sensor-rate")).body, "30");
    assert_eq!(response(get(&mut app, &gate, "/get-location")).body, "Pump house");
    // One decimal, as stored.
    assert_eq!(response(get(&mut app, &gate, "/get-calib-offset")).body, "-1.5");
}

#[test]
fn zone_table_load_defaults_to_empty_array() {
    let (mut app, gate, _) = booted(MemStorage::new());
    let r = response(get(&mut app, &gate, "/load-sd-zone-table"));
    assert_eq!((r.status, r.body.as_str()), (200, "[]"));

    let (mut app, gate, _) = booted(with_zones());
    let r = response(get(&mut app, &gate, "/load-sd-zone-table"));
    assert_eq!(r.body, crate::mock_hw::TWO_ZONE_TABLE);
}

#[test]
fn list_files_returns_names() {
    let (mut app, gate, _) = booted(with_zones());
    tick_once(&mut app, &gate);
    let r = response(get(&mut app, &gate, "/list-sd-card-files"));
    let names: Vec<String> = serde_json::from_str(&r.body).unwrap();
    assert!(names.iter().any(|n| n == "190824.txt"));
    assert!(names.iter().any(|n| n == "zone_data.json"));
}

#[test]
fn unknown_route_is_404() {
    let (mut app, gate, _) = booted(MemStorage::new());
    assert_eq!(response(get(&mut app, &gate, "/nope")).status, 404);
    assert_eq!(response(post(&mut app, &gate, "/readings", "")).status, 404);
}

// ── Files ─────────────────────────────────────────────────────

#[test]
fn data_file_requests_are_sanitised() {
    let (mut app, gate, _) = booted(MemStorage::new());
    assert_eq!(response(get(&mut app, &gate, "/get-data-file")).status, 400);
    assert_eq!(
        response(get(&mut app, &gate, "/get-data-file?filename=..%2Fsecret")).status,
        400
    );
    assert_eq!(
        get(&mut app, &gate, "/get-data-file?filename=190824.txt"),
        Reply::StreamFile(String::from("/190824.txt"))
    );
}

#[test]
fn stream_sends_whole_file_in_chunks() {
    let (mut app, gate, _) = booted(MemStorage::new());
    tick_once(&mut app, &gate);
    let expected = gate.with(|s| s.file("/190824.txt").unwrap().to_string()).unwrap();

    let mut chunks = 0;
    let outcome = api::stream_file(
        &gate,
        "/190824.txt",
        8,
        || Ok::<_, ()>(Vec::new()),
        |out: &mut Vec<u8>, data| {
            chunks += 1;
            out.extend_from_slice(data);
            assert!(gate.is_held());
            Ok(())
        },
    );
    assert_eq!(outcome, StreamOutcome::Sent(expected.len() as u64));
    assert!(chunks > 1);
    assert!(!gate.is_held());
}

#[test]
fn stream_refused_while_busy_or_missing() {
    let (_app, gate, _) = booted(MemStorage::new());
    let guard = gate.try_acquire().unwrap();
    let outcome = api::stream_file(&gate, "/x.txt", 64, || Ok::<_, ()>(()), |_, _| Ok(()));
    drop(guard);
    match outcome {
        StreamOutcome::Refused(r) => assert_eq!((r.status, r.body.as_str()), (503, "SD card is busy")),
        other => panic!("unexpected {other:?}"),
    }

    let outcome = api::stream_file(&gate, "/x.txt", 64, || Ok::<_, ()>(()), |_, _| Ok(()));
    assert!(matches!(outcome, StreamOutcome::Refused(ApiResponse { status: 500, .. })));
}

#[test]
fn stream_read_failure_is_not_reported_as_sent() {
    let storage = MemStorage {
        fail_reads_from: Some(8),
        ..MemStorage::new().with_file("/010124.txt", "0,2024-01-01,07:00:00,40.00,,\r\n")
    };
    let (_app, gate, _) = booted(storage);
    let mut received = Vec::new();
    let outcome = api::stream_file(
        &gate,
        "/010124.txt",
        8,
        || Ok::<_, ()>(()),
        |_, data| {
            received.extend_from_slice(data);
            Ok(())
        },
    );
    assert_eq!(
        outcome,
        StreamOutcome::Truncated {
            sent: 8,
            error: StorageError::Io
        }
    );
    assert_eq!(received.len(), 8);
    assert!(!gate.is_held());
}

#[test]
fn stream_abort_releases_gate() {
    let (mut app, gate, _) = booted(MemStorage::new());
    tick_once(&mut app, &gate);
    let outcome = api::stream_file(
        &gate,
        "/190824.txt",
        4,
        || Ok(()),
        |_, _| Err("client went away"),
    );
    assert_eq!(outcome, StreamOutcome::Aborted("client went away"));
    assert!(!gate.is_held());
}

#[test]
fn delete_file_outcomes() {
    let (mut app, gate, _) = booted(MemStorage::new().with_file("/010124.txt", "0,..."));
    let r = response(get(&mut app, &gate, "/delete-file?filename=010124.txt"));
    assert_eq!((r.status, r.body.as_str()), (200, "File deleted successfully"));
    assert_eq!(response(get(&mut app, &gate, "/delete-file?filename=010124.txt")).status, 404);
    assert_eq!(response(get(&mut app, &gate, "/delete-file")).status, 400);

    let _guard = gate.try_acquire().unwrap();
    let r = response(get(&mut app, &gate, "/delete-file?filename=zone_data.json"));
    assert_eq!(r.status, 503);
}

// ── Settings posts ────────────────────────────────────────────

#[test]
fn post_settings() {
    let (mut app, gate, _) = booted(MemStorage::new());

    let r = response(post(&mut app, &gate, "/sensor-rate-input", "5"));
    assert_eq!((r.status, r.body.as_str()), (200, "5"));
    assert_eq!(response(post(&mut app, &gate, "/sensor-rate-input", "120")).status, 400);
    assert_eq!(response(post(&mut app, &gate, "/sensor-rate-input", "fast")).status, 400);

    let r = response(post(&mut app, &gate, "/loc-input", "Well 3"));
    assert_eq!((r.status, r.body.as_str()), (200, "Well 3"));
    assert_eq!(response(get(&mut app, &gate, "/get-location")).body, "Well 3");

    assert_eq!(response(post(&mut app, &gate, "/calib-input", "abc")).status, 400);
    let r = response(post(&mut app, &gate, "/calib-input", "0"));
    assert_eq!((r.status, r.body.as_str()), (200, "0.0"));
}

#[test]
fn post_zone_table() {
    let (mut app, gate, _) = booted(MemStorage::new());
    let r = response(post(&mut app, &gate, "/submit-zone-form", "[{]"));
    assert_eq!((r.status, r.body.as_str()), (400, "Bad Request - JSON Parsing Failed"));

    let r = response(post(&mut app, &gate, "/submit-zone-form", crate::mock_hw::TWO_ZONE_TABLE));
    assert_eq!((r.status, r.body.as_str()), (200, ZONE_TABLE_STORED));
    gate.with(|s| assert!(s.file(ZONE_TABLE_PATH).is_some())).unwrap();
}

#[test]
fn post_while_busy_is_503() {
    let (mut app, gate, _) = booted(MemStorage::new());
    let _guard = gate.try_acquire().unwrap();
    let r = response(post(&mut app, &gate, "/loc-input", "Barn"));
    assert_eq!((r.status, r.body.as_str()), (503, "SD card is busy"));
}

#[test]
fn reset_requests_restart() {
    let (mut app, gate, _) = booted(MemStorage::new());
    match get(&mut app, &gate, "/reset") {
        Reply::Restart(r) => assert_eq!(r.body, "Resetting ESP32..."),
        other => panic!("unexpected {other:?}"),
    }
}

// ── Flash assets ──────────────────────────────────────────────

#[test]
fn root_serves_index_page_from_flash() {
    let (mut app, gate, _) = booted(MemStorage::new());
    assert_eq!(
        get_with_flash(&mut app, &gate, &mut flash(), "/"),
        Reply::StreamAsset {
            path: String::from("/index.html"),
            content_type: api::CONTENT_HTML
        }
    );
    assert_eq!(
        get_with_flash(&mut app, &gate, &mut flash(), "/config.js"),
        Reply::StreamAsset {
            path: String::from("/config.js"),
            content_type: "application/javascript"
        }
    );
    let r = response(get(&mut app, &gate, "/"));
    assert_eq!((r.status, r.body.as_str()), (404, "File not found"));
    assert_eq!(response(get_with_flash(&mut app, &gate, &mut flash(), "/missing.css")).status, 404);
}

#[test]
fn flash_listings() {
    let (mut app, gate, _) = booted(MemStorage::new());
    let r = response(get_with_flash(&mut app, &gate, &mut flash(), "/list-spiffs-files"));
    let names: Vec<String> = serde_json::from_str(&r.body).unwrap();
    assert_eq!(names, ["blank.json", "config.js", "index.html", "north.json"]);

    let r = response(get_with_flash(&mut app, &gate, &mut flash(), "/list-json-files"));
    let names: Vec<String> = serde_json::from_str(&r.body).unwrap();
    assert_eq!(names, ["blank.json", "north.json"]);
}

#[test]
fn preset_zone_table_rules() {
    let (mut app, gate, _) = booted(MemStorage::new());
    let mut flash = flash();
    let mut load = |uri: &str| response(get_with_flash(&mut app, &gate, &mut flash, uri));

    let r = load("/load-spiffs-zone-table?filename=north.json");
    assert_eq!((r.status, r.content_type), (200, api::CONTENT_JSON));
    assert_eq!(r.body, crate::mock_hw::TWO_ZONE_TABLE);

    assert_eq!(load("/load-spiffs-zone-table").body, "Filename parameter missing.");
    let r = load("/load-spiffs-zone-table?filename=index.html");
    assert_eq!((r.status, r.body.as_str()), (400, "Invalid file type. Only .json files are allowed."));
    let r = load("/load-spiffs-zone-table?filename=blank.json");
    assert_eq!((r.status, r.body.as_str()), (404, "File not found or empty."));
    assert_eq!(load("/load-spiffs-zone-table?filename=gone.json").status, 404);
}

#[test]
fn delete_prefers_flash_then_card() {
    let (mut app, gate, _) = booted(MemStorage::new().with_file("/north.json", "[]"));
    let mut flash = flash();

    let r = response(get_with_flash(&mut app, &gate, &mut flash, "/delete-file?filename=north.json"));
    assert_eq!(r.status, 200);
    assert!(flash.file("/north.json").is_none());
    gate.with(|s| assert!(s.file("/north.json").is_some())).unwrap();

    let r = response(get_with_flash(&mut app, &gate, &mut flash, "/delete-file?filename=north.json"));
    assert_eq!(r.status, 200);
    gate.with(|s| assert!(s.file("/north.json").is_none())).unwrap();
}

#[test]
fn asset_stream_sends_whole_file() {
    let flash = flash();
    let mut body = Vec::new();
    let outcome = api::stream_asset(
        &flash,
        "/index.html",
        4,
        || Ok::<_, ()>(()),
        |_, data| {
            body.extend_from_slice(data);
            Ok(())
        },
    );
    assert_eq!(outcome, StreamOutcome::Sent(20));
    assert_eq!(body, b"<html>wellmon</html>");

    let outcome = api::stream_asset(&flash, "/nope.html", 4, || Ok::<_, ()>(()), |_, _| Ok(()));
    assert!(matches!(outcome, StreamOutcome::Refused(ApiResponse { status: 404, .. })));
}

// ── Config dump ───────────────────────────────────────────────

#[test]
fn config_dump_reflects_settings() {
    let (mut app, gate, _) = booted(MemStorage::new().with_file(LOCATION_PATH, "Pump house"));
    let r = response(get(&mut app, &gate, "/get-config"));
    assert_eq!(r.content_type, api::CONTENT_JSON);
    let v: serde_json::Value = serde_json::from_str(&r.body).unwrap();
    assert_eq!(v["sample_interval_secs"], 30);
    assert_eq!(v["location"], "Pump house");
    assert_eq!(v["day_boundary_hour"], 6);
    assert_eq!(v["adc_averaging"], "ReferenceSkew");
}
