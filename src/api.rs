//! Request handling for the web client.
//!
//! **Transport-decoupled**: this layer does not own an HTTP server.  The
//! server adapter turns each request into an [`ApiRequest`], calls
//! [`handle`] and writes back the [`Reply`].  Log file downloads are
//! streamed separately through [`stream_file`] so the server can push
//! chunks straight from the card without buffering a whole day's log.
//!
//! Every route that touches the card goes through the
//! [`StorageGate`]; a busy gate answers 503 immediately.  The flash
//! partition holding the web pages and the preset zone tables is a second
//! [`StoragePort`] passed straight in: nothing else writes to it, so it
//! has no gate.

use log::{info, warn};

use crate::app::commands::{AppCommand, CommandStatus};
use crate::app::ports::{SequenceStore, StoragePort};
use crate::app::service::AppService;
use crate::config::{self, ZONE_TABLE_PATH};
use crate::error::{ConfigError, StorageBusy, StorageError};
use crate::gate::StorageGate;

pub const CONTENT_TEXT: &str = "text/plain";
pub const CONTENT_JSON: &str = "application/json";
pub const CONTENT_HTML: &str = "text/html";

/// Page served for `GET /`.
pub const INDEX_PAGE: &str = "/index.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One inbound request, already split by the server adapter.
#[derive(Debug, Clone, Copy)]
pub struct ApiRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    /// Raw query string without the `?`.
    pub query: &'a str,
    pub body: &'a [u8],
}

impl<'a> ApiRequest<'a> {
    /// Split `uri` into path and query.
    pub fn new(method: Method, uri: &'a str, body: &'a [u8]) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Self {
            method,
            path,
            query,
            body,
        }
    }

    /// First value of query parameter `name`, percent-decoded.
    pub fn param(&self, name: &str) -> Option<String> {
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| percent_decode(v))
    }

    fn body_text(&self) -> Option<&'a str> {
        core::str::from_utf8(self.body).ok().map(str::trim)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ApiResponse {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: CONTENT_TEXT,
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: CONTENT_JSON,
            body: body.into(),
        }
    }

    fn busy() -> Self {
        Self::text(503, StorageBusy.to_string())
    }
}

/// What the server adapter should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send this response.
    Respond(ApiResponse),
    /// Stream the file at this (sanitised) path with [`stream_file`].
    StreamFile(String),
    /// Stream a flash asset with [`stream_asset`].
    StreamAsset {
        path: String,
        content_type: &'static str,
    },
    /// Send this response, then restart the device.
    Restart(ApiResponse),
}

// ═══════════════════════════════════════════════════════════════
//  Routing
// ═══════════════════════════════════════════════════════════════

/// Route one request.  `assets` is the flash partition.
pub fn handle<S: StoragePort, A: StoragePort, Q: SequenceStore>(
    req: &ApiRequest<'_>,
    app: &mut AppService<Q>,
    gate: &StorageGate<S>,
    assets: &mut A,
) -> Reply {
    use Method::{Get, Post};

    let response = match (req.method, req.path) {
        (Get, "/") => {
            return if assets.exists(INDEX_PAGE) {
                Reply::StreamAsset {
                    path: String::from(INDEX_PAGE),
                    content_type: CONTENT_HTML,
                }
            } else {
                Reply::Respond(ApiResponse::text(404, "File not found"))
            };
        }
        (Get, "/get-daily-filename") => {
            ApiResponse::text(200, app.daily_filename().unwrap_or_default())
        }
        (Get, "/get-data-file") => {
            return match req.param("filename").as_deref().map(sanitize_filename) {
                None => Reply::Respond(ApiResponse::text(400, "Filename not specified.")),
                Some(Err(_)) => Reply::Respond(ApiResponse::text(400, "Invalid filename.")),
                Some(Ok(path)) => Reply::StreamFile(path),
            };
        }
        (Get, "/list-sd-card-files") => list_files(gate),
        (Get, "/list-spiffs-files") => list_assets(assets, |_| true),
        (Get, "/list-json-files") => list_assets(assets, |name| name.ends_with(".json")),
        (Get, "/delete-file") => delete_file(req, gate, assets),
        (Get, "/load-sd-zone-table") => load_zone_table(gate),
        (Get, "/load-spiffs-zone-table") => load_preset_table(req, assets),
        (Get, "/get-config") => match serde_json::to_string(app.config()) {
            Ok(json) => ApiResponse::json(json),
            Err(_) => ApiResponse::text(500, "Config not serialisable"),
        },
        (Get, "/get-sensor-rate") => ApiResponse::text(200, app.sample_interval_secs().to_string()),
        (Get, "/get-location") => ApiResponse::text(200, app.location()),
        (Get, "/get-calib-offset") => {
            ApiResponse::text(200, config::format_offset(app.calibration_offset()))
        }
        (Get, "/readings") => match app.latest_report() {
            Some(report) => ApiResponse::json(report.to_json()),
            None => ApiResponse::text(503, "No reading yet"),
        },
        (Get, "/reset") => {
            info!("API: restart requested");
            return Reply::Restart(ApiResponse::text(200, "Resetting ESP32..."));
        }
        (Post, "/submit-zone-form") => match req.body_text() {
            Some(doc) => command_response(
                app.handle_command(AppCommand::SubmitZoneTable(doc.to_string()), gate),
                "Bad Request - JSON Parsing Failed",
            ),
            None => ApiResponse::text(400, "Bad Request - JSON Parsing Failed"),
        },
        (Post, "/sensor-rate-input") => match req.body_text().and_then(|t| t.parse().ok()) {
            Some(secs) => command_response(
                app.handle_command(AppCommand::SetSampleRate(secs), gate),
                "Sample rate must be 1-60 seconds",
            ),
            None => ApiResponse::text(400, "Sample rate must be a whole number of seconds"),
        },
        (Post, "/loc-input") => match req.body_text() {
            Some(label) => command_response(
                app.handle_command(AppCommand::SetLocation(label.to_string()), gate),
                "Invalid location",
            ),
            None => ApiResponse::text(400, "Invalid location"),
        },
        (Post, "/calib-input") => match req.body_text().and_then(|t| t.parse().ok()) {
            Some(reference) => command_response(
                app.handle_command(AppCommand::SetReferencePressure(reference), gate),
                "Invalid calibration value",
            ),
            None => ApiResponse::text(400, "Invalid calibration value"),
        },
        (Get, path) => return static_asset(path, assets),
        _ => ApiResponse::text(404, "Not found"),
    };
    Reply::Respond(response)
}

/// Any other GET is a page, script or stylesheet from flash.
fn static_asset<A: StoragePort>(path: &str, assets: &A) -> Reply {
    match sanitize_filename(path) {
        Ok(path) if assets.exists(&path) => {
            let content_type = content_type_for(&path);
            Reply::StreamAsset { path, content_type }
        }
        _ => Reply::Respond(ApiResponse::text(404, "Not found")),
    }
}

/// MIME type by file extension.
pub fn content_type_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html" | "htm") => CONTENT_HTML,
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => CONTENT_JSON,
        Some("ico") => "image/x-icon",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        _ => CONTENT_TEXT,
    }
}

fn command_response(status: CommandStatus, invalid: &str) -> ApiResponse {
    match status {
        CommandStatus::Ok(body) => ApiResponse::text(200, body),
        CommandStatus::Failed(ConfigError::ValidationFailed(_)) => ApiResponse::text(400, invalid),
        CommandStatus::Failed(ConfigError::Busy) => ApiResponse::busy(),
        CommandStatus::Failed(e @ ConfigError::Storage(_)) => ApiResponse::text(500, e.to_string()),
    }
}

fn list_files<S: StoragePort>(gate: &StorageGate<S>) -> ApiResponse {
    match gate.with(|s| s.list()) {
        Err(StorageBusy) => ApiResponse::busy(),
        Ok(Ok(names)) => {
            ApiResponse::json(serde_json::to_string(&names).unwrap_or_else(|_| "[]".into()))
        }
        Ok(Err(e)) => ApiResponse::text(500, e.to_string()),
    }
}

fn list_assets<A: StoragePort>(assets: &A, keep: impl Fn(&str) -> bool) -> ApiResponse {
    match assets.list() {
        Ok(names) => {
            let names: Vec<&String> = names.iter().filter(|n| keep(n)).collect();
            ApiResponse::json(serde_json::to_string(&names).unwrap_or_else(|_| "[]".into()))
        }
        Err(e) => {
            warn!("API: flash listing failed: {}", e);
            ApiResponse::json("[]")
        }
    }
}

/// A file in flash shadows one of the same name on the card.
fn delete_file<S: StoragePort, A: StoragePort>(
    req: &ApiRequest<'_>,
    gate: &StorageGate<S>,
    assets: &mut A,
) -> ApiResponse {
    let path = match req.param("filename").as_deref().map(sanitize_filename) {
        None => return ApiResponse::text(400, "Filename not specified."),
        Some(Err(_)) => return ApiResponse::text(400, "Invalid filename."),
        Some(Ok(path)) => path,
    };
    if assets.exists(&path) {
        return match assets.remove(&path) {
            Ok(()) => {
                info!("API: deleted {} from flash", path);
                ApiResponse::text(200, "File deleted successfully")
            }
            Err(e) => {
                warn!("API: delete {} from flash failed: {}", path, e);
                ApiResponse::text(500, "Failed to delete file")
            }
        };
    }
    match gate.with(|s| s.remove(&path)) {
        Err(StorageBusy) => ApiResponse::busy(),
        Ok(Ok(())) => {
            info!("API: deleted {}", path);
            ApiResponse::text(200, "File deleted successfully")
        }
        Ok(Err(StorageError::NotFound)) => ApiResponse::text(404, "File not found"),
        Ok(Err(e)) => {
            warn!("API: delete {} failed: {}", path, e);
            ApiResponse::text(500, "Failed to delete file")
        }
    }
}

fn load_zone_table<S: StoragePort>(gate: &StorageGate<S>) -> ApiResponse {
    match gate.with(|s| s.read_to_string(ZONE_TABLE_PATH)) {
        Err(StorageBusy) => ApiResponse::busy(),
        Ok(Ok(doc)) => ApiResponse::json(doc),
        Ok(Err(_)) => ApiResponse::json("[]"),
    }
}

/// A preset zone table from flash.  Only `.json` names are served.
fn load_preset_table<A: StoragePort>(req: &ApiRequest<'_>, assets: &A) -> ApiResponse {
    let Some(name) = req.param("filename") else {
        return ApiResponse::text(400, "Filename parameter missing.");
    };
    if !name.ends_with(".json") {
        return ApiResponse::text(400, "Invalid file type. Only .json files are allowed.");
    }
    let doc = sanitize_filename(&name).and_then(|path| assets.read_to_string(&path));
    match doc {
        // "[]" and shorter hold no zones.
        Ok(doc) if doc.trim().len() > 2 => ApiResponse::json(doc),
        _ => ApiResponse::text(404, "File not found or empty."),
    }
}

// ═══════════════════════════════════════════════════════════════
//  File streaming
// ═══════════════════════════════════════════════════════════════

/// How a streamed download ended.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamOutcome<E> {
    /// Nothing was sent; answer with this response instead.
    Refused(ApiResponse),
    /// Whole file sent; total bytes.
    Sent(u64),
    /// The transport failed mid-stream.
    Aborted(E),
    /// The medium failed mid-stream; the client got `sent` bytes of a
    /// longer file.
    Truncated { sent: u64, error: StorageError },
}

/// Stream the file at `path` in `chunk_bytes` pieces while holding the
/// storage gate for the whole transfer.
///
/// `begin` is called once the file is known to be readable and should
/// send the response headers; `write` sends one chunk.  The gate is
/// released on every exit path.
pub fn stream_file<S, W, E>(
    gate: &StorageGate<S>,
    path: &str,
    chunk_bytes: usize,
    begin: impl FnOnce() -> Result<W, E>,
    write: impl FnMut(&mut W, &[u8]) -> Result<(), E>,
) -> StreamOutcome<E>
where
    S: StoragePort,
{
    let Ok(storage) = gate.try_acquire() else {
        warn!("API: {} refused, SD card is busy", path);
        return StreamOutcome::Refused(ApiResponse::busy());
    };
    if !storage.exists(path) {
        return StreamOutcome::Refused(ApiResponse::text(
            500,
            format!("Failed to open file or file does not exist. Filename: {path}"),
        ));
    }

    send_chunks(&*storage, path, chunk_bytes, begin, write)
}

/// Stream a file from the flash partition.  No gate is involved.
pub fn stream_asset<A, W, E>(
    assets: &A,
    path: &str,
    chunk_bytes: usize,
    begin: impl FnOnce() -> Result<W, E>,
    write: impl FnMut(&mut W, &[u8]) -> Result<(), E>,
) -> StreamOutcome<E>
where
    A: StoragePort,
{
    if !assets.exists(path) {
        return StreamOutcome::Refused(ApiResponse::text(404, "Not found"));
    }
    send_chunks(assets, path, chunk_bytes, begin, write)
}

fn send_chunks<S, W, E>(
    storage: &S,
    path: &str,
    chunk_bytes: usize,
    begin: impl FnOnce() -> Result<W, E>,
    mut write: impl FnMut(&mut W, &[u8]) -> Result<(), E>,
) -> StreamOutcome<E>
where
    S: StoragePort,
{
    let mut out = match begin() {
        Ok(out) => out,
        Err(e) => return StreamOutcome::Aborted(e),
    };
    let mut buf = vec![0u8; chunk_bytes.max(1)];
    let mut offset: u64 = 0;
    loop {
        let n = match storage.read_chunk(path, offset, &mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(error) => {
                warn!("API: read of {} failed at {}: {}", path, offset, error);
                return StreamOutcome::Truncated { sent: offset, error };
            }
        };
        if let Err(e) = write(&mut out, &buf[..n]) {
            return StreamOutcome::Aborted(e);
        }
        offset += n as u64;
    }
    info!("API: streamed {} ({} bytes)", path, offset);
    StreamOutcome::Sent(offset)
}

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

/// Turn a client-supplied file name into an absolute path on the card.
/// Rejects empty names and anything containing `..`.
pub fn sanitize_filename(name: &str) -> Result<String, StorageError> {
    let name = name.trim();
    if name.is_empty() || name == "/" || name.contains("..") || name.contains('\\') {
        return Err(StorageError::InvalidPath);
    }
    if name.starts_with('/') {
        Ok(name.to_string())
    } else {
        Ok(format!("/{name}"))
    }
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = core::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
