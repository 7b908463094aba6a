//! HTTP server adapter (ESP-IDF only).
//!
//! Binds the routes of [`api`](crate::api) to `EspHttpServer`.  Every
//! handler only translates: it builds an [`ApiRequest`], locks the
//! service, calls [`api::handle`] and writes the [`Reply`] back.  Log
//! downloads are streamed through [`api::stream_file`] without the
//! service lock, so a long download never stalls the tick loop; it only
//! holds the storage gate.  Pages and scripts come from the flash
//! partition through a catch-all route registered last, after the
//! `/events` stream of [`SseHub`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request, Response};
use esp_idf_svc::http::Method as HttpMethod;
use esp_idf_svc::io::{Read, Write};
use log::{info, warn};

use crate::adapters::event_stream::SseHub;
use crate::adapters::flash::FlashAssets;
use crate::adapters::rtc_memory::RtcSequenceStore;
use crate::adapters::sd_card::SdCardStorage;
use crate::api::{self, ApiRequest, ApiResponse, Method, Reply, StreamOutcome};
use crate::app::service::AppService;
use crate::gate::StorageGate;

pub type SharedApp = Arc<Mutex<AppService<RtcSequenceStore>>>;
pub type SharedGate = Arc<StorageGate<SdCardStorage>>;
pub type SharedFlash = Arc<Mutex<FlashAssets>>;

/// Everything a handler needs besides the request.
#[derive(Clone)]
pub struct Shared {
    pub app: SharedApp,
    pub gate: SharedGate,
    pub flash: SharedFlash,
    pub chunk_bytes: usize,
}

/// Largest request body accepted (zone tables are the big ones).
const MAX_BODY: usize = 8 * 1024;

const ROUTES: &[(&str, Method)] = &[
    ("/get-daily-filename", Method::Get),
    ("/get-data-file", Method::Get),
    ("/list-sd-card-files", Method::Get),
    ("/list-spiffs-files", Method::Get),
    ("/list-json-files", Method::Get),
    ("/delete-file", Method::Get),
    ("/load-sd-zone-table", Method::Get),
    ("/load-spiffs-zone-table", Method::Get),
    ("/get-config", Method::Get),
    ("/get-sensor-rate", Method::Get),
    ("/get-location", Method::Get),
    ("/get-calib-offset", Method::Get),
    ("/readings", Method::Get),
    ("/reset", Method::Get),
    ("/submit-zone-form", Method::Post),
    ("/sensor-rate-input", Method::Post),
    ("/loc-input", Method::Post),
    ("/calib-input", Method::Post),
];

/// Start the server and register every route.  Keep the returned server
/// alive for as long as requests should be answered.
pub fn start(shared: Shared, hub: &Arc<SseHub>) -> Result<EspHttpServer<'static>> {
    let mut server = EspHttpServer::new(&Configuration {
        uri_match_wildcard: true,
        max_uri_handlers: ROUTES.len() + 4,
        lru_purge_enable: true,
        ..Default::default()
    })?;

    for &(path, method) in ROUTES {
        let shared = shared.clone();
        let http_method = match method {
            Method::Get => HttpMethod::Get,
            Method::Post => HttpMethod::Post,
        };
        server.fn_handler(path, http_method, move |req| serve(req, method, &shared))?;
    }
    hub.attach(&server)?;
    // Last: anything unmatched is looked up in flash.
    server.fn_handler("/*", HttpMethod::Get, move |req| serve(req, Method::Get, &shared))?;

    info!("HTTP: {} routes registered", ROUTES.len() + 2);
    Ok(server)
}

fn serve(
    mut req: Request<&mut EspHttpConnection<'_>>,
    method: Method,
    shared: &Shared,
) -> Result<()> {
    let uri = req.uri().to_string();
    let body = match method {
        Method::Post => read_body(&mut req)?,
        Method::Get => Vec::new(),
    };

    let reply = {
        let mut app = shared.app.lock().map_err(|_| anyhow!("service lock poisoned"))?;
        let mut flash = shared.flash.lock().map_err(|_| anyhow!("flash lock poisoned"))?;
        api::handle(
            &ApiRequest::new(method, &uri, &body),
            &mut app,
            shared.gate.as_ref(),
            &mut *flash,
        )
    };

    match reply {
        Reply::Respond(response) => respond(req, &response),
        Reply::Restart(response) => {
            respond(req, &response)?;
            std::thread::sleep(Duration::from_secs(1));
            esp_idf_svc::hal::reset::restart();
        }
        Reply::StreamFile(path) => {
            let mut pending = Some(req);
            let outcome = api::stream_file(
                shared.gate.as_ref(),
                &path,
                shared.chunk_bytes,
                || begin_stream(&mut pending, api::CONTENT_TEXT),
                |resp, data| resp.write_all(data).map_err(anyhow::Error::from),
            );
            finish_stream(outcome, &path, pending)
        }
        Reply::StreamAsset { path, content_type } => {
            let flash = shared.flash.lock().map_err(|_| anyhow!("flash lock poisoned"))?;
            let mut pending = Some(req);
            let outcome = api::stream_asset(
                &*flash,
                &path,
                shared.chunk_bytes,
                || begin_stream(&mut pending, content_type),
                |resp, data| resp.write_all(data).map_err(anyhow::Error::from),
            );
            finish_stream(outcome, &path, pending)
        }
    }
}

type Connection<'r, 'c> = Request<&'r mut EspHttpConnection<'c>>;

fn begin_stream<'r, 'c>(
    pending: &mut Option<Connection<'r, 'c>>,
    content_type: &str,
) -> Result<Response<&'r mut EspHttpConnection<'c>>> {
    let req = pending.take().ok_or_else(|| anyhow!("request already answered"))?;
    Ok(req.into_response(200, None, &[("Content-Type", content_type)])?)
}

fn finish_stream(
    outcome: StreamOutcome<anyhow::Error>,
    path: &str,
    pending: Option<Connection<'_, '_>>,
) -> Result<()> {
    match outcome {
        StreamOutcome::Sent(_) => Ok(()),
        StreamOutcome::Aborted(e) => {
            warn!("HTTP: download of {} aborted: {}", path, e);
            Ok(())
        }
        // Headers are out.  Failing the handler drops the connection before
        // the final chunk, so the client sees an incomplete transfer.
        StreamOutcome::Truncated { sent, error } => {
            warn!("HTTP: download of {} cut at {} bytes: {}", path, sent, error);
            Err(anyhow!("{} truncated: {}", path, error))
        }
        StreamOutcome::Refused(response) => match pending {
            Some(req) => respond(req, &response),
            None => Ok(()),
        },
    }
}

fn respond(req: Request<&mut EspHttpConnection<'_>>, response: &ApiResponse) -> Result<()> {
    let mut resp = req.into_response(
        response.status,
        None,
        &[("Content-Type", response.content_type)],
    )?;
    resp.write_all(response.body.as_bytes())?;
    Ok(())
}

fn read_body(req: &mut Request<&mut EspHttpConnection<'_>>) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let n = req.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if body.len() + n > MAX_BODY {
            return Err(anyhow!("request body over {} bytes", MAX_BODY));
        }
        body.extend_from_slice(&buf[..n]);
    }
    Ok(body)
}
