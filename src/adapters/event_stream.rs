//! Server-sent event push to web clients.
//!
//! Pages subscribe with `EventSource("/events")` and listen for two
//! event names:
//!
//! | Event          | Data                                        |
//! |----------------|---------------------------------------------|
//! | `new-readings` | [`ReadingReport`](crate::app::events::ReadingReport) JSON |
//! | `server-log`   | one human-readable status line              |
//!
//! [`PushEventSink`] turns [`AppEvent`]s into frames and hands them to a
//! [`FrameChannel`].  On the device the channel is [`SseHub`], which
//! keeps the open `/events` sockets of the HTTP server and writes every
//! frame to each of them.  Delivery is best effort: a client that
//! connects late misses earlier frames, a dead socket is dropped.

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::scheduler::{ProgramEnd, ZoneStartKind};

pub const EVENT_READINGS: &str = "new-readings";
pub const EVENT_LOG: &str = "server-log";

/// One `event:`/`data:` block, blank-line terminated.  Line breaks in
/// `data` become separate `data:` lines.
pub fn sse_frame(event: &str, data: &str) -> String {
    let mut frame = format!("event: {event}\n");
    for line in data.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// The frame a client receives for `event`.
pub fn frame_for(event: &AppEvent) -> String {
    match event {
        AppEvent::Reading(report) => sse_frame(EVENT_READINGS, &report.to_json()),
        other => sse_frame(EVENT_LOG, &log_line(other)),
    }
}

fn log_line(event: &AppEvent) -> String {
    match event {
        AppEvent::Started {
            sample_interval_secs,
        } => format!("Monitor started, sampling every {sample_interval_secs} s"),
        AppEvent::Reading(r) => format!("Pressure {:.2} psi", r.psi),
        AppEvent::LogRotated { filename } => format!("Daily log file is now {filename}"),
        AppEvent::RecordSkipped(e) => format!("Reading not logged: {e}"),
        AppEvent::ZoneStarted { number, kind, .. } => match kind {
            ZoneStartKind::Scheduled => format!("Zone {number} started"),
            ZoneStartKind::Chained => format!("Zone {number} started after the previous zone"),
        },
        AppEvent::ProgramEnded { reason, .. } => match reason {
            ProgramEnd::Completed => String::from("Zone program finished"),
            ProgramEnd::NextStartNotDue => {
                String::from("Zone program paused until the next start time")
            }
            ProgramEnd::TableChanged => String::from("Zone program stopped, zone table changed"),
        },
        AppEvent::ZoneTableRejected => {
            String::from("Stored zone table is invalid, no zones are scheduled")
        }
    }
}

/// Where finished frames go.
pub trait FrameChannel {
    fn send(&self, frame: &str);
}

/// [`EventSink`] that pushes every event to subscribed clients.
pub struct PushEventSink<C> {
    channel: C,
}

impl<C: FrameChannel> PushEventSink<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }
}

impl<C: FrameChannel> EventSink for PushEventSink<C> {
    fn emit(&mut self, event: &AppEvent) {
        self.channel.send(&frame_for(event));
    }
}

#[cfg(target_os = "espidf")]
pub use esp::SseHub;

#[cfg(target_os = "espidf")]
mod esp {
    use std::ffi::c_void;
    use std::sync::{Arc, Mutex, PoisonError};

    use anyhow::{anyhow, Result};
    use esp_idf_svc::handle::RawHandle;
    use esp_idf_svc::http::server::EspHttpServer;
    use esp_idf_svc::sys::*;
    use log::{debug, info, warn};

    use super::FrameChannel;

    /// Response head written straight to the socket; the body never ends.
    const STREAM_HEAD: &str = "HTTP/1.1 200 OK\r\n\
        Content-Type: text/event-stream\r\n\
        Cache-Control: no-cache\r\n\
        Connection: keep-alive\r\n\
        Access-Control-Allow-Origin: *\r\n\
        \r\n\
        retry: 10000\n\n";

    /// Most clients kept at once; the oldest is dropped past this.
    const MAX_CLIENTS: usize = 4;

    #[derive(Clone, Copy)]
    struct Server(httpd_handle_t);

    // SAFETY: the handle is an opaque token; every use goes through
    // `httpd_queue_work`, which is safe from any task.
    unsafe impl Send for Server {}

    #[derive(Default)]
    struct HubState {
        server: Option<Server>,
        clients: Vec<i32>,
    }

    /// Open `/events` sockets of one HTTP server.
    #[derive(Default)]
    pub struct SseHub {
        state: Mutex<HubState>,
    }

    /// Session context tagging a socket as an event stream.  Freed by the
    /// server when the socket closes.
    struct StreamSession {
        hub: *const SseHub,
        fd: i32,
    }

    struct Broadcast {
        hub: *const SseHub,
        server: httpd_handle_t,
        clients: Vec<i32>,
        frame: String,
    }

    impl SseHub {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Register `GET /events` on `server`.  Must run before any
        /// wildcard route, which would otherwise shadow it.
        pub fn attach(self: &Arc<Self>, server: &EspHttpServer<'static>) -> Result<()> {
            // The server holds a raw pointer to the hub for as long as it
            // runs; one strong count is given up to keep that pointer valid.
            let ctx = Arc::into_raw(self.clone());
            let uri = httpd_uri_t {
                uri: c"/events".as_ptr(),
                method: http_method_HTTP_GET,
                handler: Some(open_stream),
                user_ctx: ctx.cast_mut().cast(),
                ..Default::default()
            };
            // SAFETY: the handle comes from a live server and `uri` is copied
            // by the call.
            let ret = unsafe { httpd_register_uri_handler(server.handle(), &uri) };
            if ret != ESP_OK as i32 {
                // SAFETY: registration failed, the pointer was never stored.
                drop(unsafe { Arc::from_raw(ctx) });
                return Err(anyhow!("register /events failed (rc={})", ret));
            }
            self.lock().server = Some(Server(server.handle()));
            info!("SSE: /events registered");
            Ok(())
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn add(&self, fd: i32) {
            let mut state = self.lock();
            state.clients.retain(|&c| c != fd);
            if state.clients.len() >= MAX_CLIENTS {
                state.clients.remove(0);
            }
            state.clients.push(fd);
            info!("SSE: client on fd {} ({} open)", fd, state.clients.len());
        }

        fn remove(&self, fd: i32) {
            let mut state = self.lock();
            state.clients.retain(|&c| c != fd);
            debug!("SSE: fd {} closed ({} open)", fd, state.clients.len());
        }
    }

    impl FrameChannel for Arc<SseHub> {
        fn send(&self, frame: &str) {
            let (server, clients) = {
                let state = self.lock();
                match state.server {
                    Some(server) if !state.clients.is_empty() => (server, state.clients.clone()),
                    _ => return,
                }
            };
            let work = Box::into_raw(Box::new(Broadcast {
                hub: Arc::as_ptr(self),
                server: server.0,
                clients,
                frame: frame.to_owned(),
            }));
            // SAFETY: ownership of `work` passes to `run_broadcast`, which
            // runs on the server task.
            let ret = unsafe { httpd_queue_work(server.0, Some(run_broadcast), work.cast()) };
            if ret != ESP_OK as i32 {
                // SAFETY: the work item was not queued, so it is still ours.
                drop(unsafe { Box::from_raw(work) });
                warn!("SSE: frame dropped, server queue full (rc={})", ret);
            }
        }
    }

    unsafe extern "C" fn open_stream(req: *mut httpd_req_t) -> esp_err_t {
        // SAFETY: `req` is valid for the duration of the handler and its
        // `user_ctx` is the hub leaked in `attach`.
        unsafe {
            let hub = (*req).user_ctx as *const SseHub;
            let fd = httpd_req_to_sockfd(req);
            let sent = httpd_send(req, STREAM_HEAD.as_ptr().cast(), STREAM_HEAD.len());
            if sent < 0 {
                return ESP_FAIL;
            }
            let session = Box::new(StreamSession { hub, fd });
            (*req).sess_ctx = Box::into_raw(session).cast();
            (*req).free_ctx = Some(close_stream);
            (*hub).add(fd);
        }
        ESP_OK as esp_err_t
    }

    unsafe extern "C" fn close_stream(ctx: *mut c_void) {
        if ctx.is_null() {
            return;
        }
        // SAFETY: `ctx` was produced by `Box::into_raw` in `open_stream`
        // and the server frees each session context exactly once.
        let session = unsafe { Box::from_raw(ctx.cast::<StreamSession>()) };
        // SAFETY: the hub outlives the server (see `attach`).
        unsafe { (*session.hub).remove(session.fd) };
    }

    unsafe extern "C" fn run_broadcast(arg: *mut c_void) {
        // SAFETY: `arg` is the `Broadcast` boxed in `send`.
        let work = unsafe { Box::from_raw(arg.cast::<Broadcast>()) };
        for &fd in &work.clients {
            // SAFETY: runs on the server task, the owner of its sockets.
            let sent = unsafe {
                httpd_socket_send(
                    work.server,
                    fd,
                    work.frame.as_ptr().cast(),
                    work.frame.len(),
                    0,
                )
            };
            if sent < 0 {
                // SAFETY: the hub outlives the server (see `attach`).
                unsafe { (*work.hub).remove(fd) };
            }
        }
    }
}
