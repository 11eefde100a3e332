use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::protocol::{parse_server_line, ClientMessage, TelemetryEvent};
use crate::{lock_or_recover, log_debug, log_debug_content};

/// Reconnect schedule after a session drops or a connect attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before giving up. Zero disables reconnecting.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    /// Delay before the 1-based `attempt`: doubles each time, capped at `max_backoff`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub port: u16,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl SessionConfig {
    fn addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    /// `seq` increases by one per update for the lifetime of the session, across reconnects.
    Update { seq: u64, event: TelemetryEvent },
    Disconnected { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    /// No more reconnect attempts; the owner keeps its last-known values.
    GaveUp,
}

/// What happened to a `toggle_system` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleDelivery {
    Sent,
    /// Not connected; sent right after `start_tracking` on the next connect.
    Queued,
}

/// Streaming connection to the engine, owned by a single surface.
///
/// A worker thread connects, sends `start_tracking`, and turns each `tracking_update`
/// line into a [`SessionEvent::Update`] in arrival order. Toggles are written from the
/// owner's thread through a shared handle to the live socket. A toggle made while
/// disconnected is held until the next connect so the engine never keeps an older value.
pub struct TelemetrySession {
    events: Receiver<SessionEvent>,
    writer: Arc<Mutex<Option<TcpStream>>>,
    pending_toggle: Arc<Mutex<Option<bool>>>,
    closing: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TelemetrySession {
    pub fn open(config: SessionConfig) -> Self {
        let (event_tx, event_rx) = unbounded();
        let (wake_tx, wake_rx) = unbounded();
        let writer = Arc::new(Mutex::new(None));
        let pending_toggle = Arc::new(Mutex::new(None));
        let closing = Arc::new(AtomicBool::new(false));

        let worker = {
            let link = EngineLink {
                writer: Arc::clone(&writer),
                pending_toggle: Arc::clone(&pending_toggle),
                closing: Arc::clone(&closing),
            };
            thread::spawn(move || run_session(config, event_tx, wake_rx, link))
        };

        Self {
            events: event_rx,
            writer,
            pending_toggle,
            closing,
            wake: Some(wake_tx),
            worker: Some(worker),
        }
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Ask the engine to set its system-active flag. Only the newest unsent value is kept.
    pub fn toggle_system(&self, active: bool) -> Result<ToggleDelivery> {
        let mut guard = lock_or_recover(&self.writer, "telemetry writer");
        let mut pending = lock_or_recover(&self.pending_toggle, "pending toggle");
        let Some(stream) = guard.as_mut() else {
            *pending = Some(active);
            return Ok(ToggleDelivery::Queued);
        };
        match write_message(stream, ClientMessage::ToggleSystem { active }) {
            Ok(()) => {
                *pending = None;
                Ok(ToggleDelivery::Sent)
            }
            Err(err) => {
                *pending = Some(active);
                Err(err.context("failed to send toggle_system; queued for reconnect"))
            }
        }
    }

    pub fn pending_toggle(&self) -> Option<bool> {
        *lock_or_recover(&self.pending_toggle, "pending toggle")
    }

    pub fn is_connected(&self) -> bool {
        lock_or_recover(&self.writer, "telemetry writer").is_some()
    }

    /// Send `stop_tracking`, disconnect, and wait for the worker to exit.
    pub fn close(&mut self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut stream) = lock_or_recover(&self.writer, "telemetry writer").take() {
            if let Err(err) = write_message(&mut stream, ClientMessage::StopTracking) {
                log_debug(&format!("stop_tracking not delivered: {err:#}"));
            }
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.wake.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for TelemetrySession {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_message(stream: &mut TcpStream, message: ClientMessage) -> Result<()> {
    let mut line = serde_json::to_string(&message)?;
    line.push('\n');
    stream.write_all(line.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// State the worker shares with the session handle.
struct EngineLink {
    writer: Arc<Mutex<Option<TcpStream>>>,
    pending_toggle: Arc<Mutex<Option<bool>>>,
    closing: Arc<AtomicBool>,
}

fn run_session(
    config: SessionConfig,
    events: Sender<SessionEvent>,
    wake: Receiver<()>,
    link: EngineLink,
) {
    let EngineLink {
        writer,
        pending_toggle,
        closing,
    } = link;
    let mut seq = 0u64;
    let mut failures = 0u32;

    while !closing.load(Ordering::SeqCst) {
        let reason = match connect(&config, &writer, &pending_toggle, &closing) {
            Ok(Some(reader)) => {
                failures = 0;
                tracing::info!(port = config.port, "telemetry session connected");
                if events.send(SessionEvent::Connected).is_err() {
                    break;
                }
                let reason = read_updates(reader, &events, &mut seq);
                lock_or_recover(&writer, "telemetry writer").take();
                reason
            }
            Ok(None) => break,
            Err(err) => format!("connect failed: {err:#}"),
        };
        if closing.load(Ordering::SeqCst) {
            break;
        }

        tracing::warn!(port = config.port, %reason, "telemetry session disconnected");
        if events.send(SessionEvent::Disconnected { reason }).is_err() {
            break;
        }

        failures += 1;
        if failures > config.reconnect.max_attempts {
            tracing::warn!(port = config.port, "telemetry session gave up reconnecting");
            let _ = events.send(SessionEvent::GaveUp);
            break;
        }
        let delay = config.reconnect.delay(failures);
        if events
            .send(SessionEvent::Reconnecting {
                attempt: failures,
                delay,
            })
            .is_err()
        {
            break;
        }
        match wake.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log_debug(&format!("telemetry worker for port {} exiting", config.port));
}

/// Connect, request tracking, flush any queued toggle, and publish the writer half.
/// `Ok(None)` when the session was closed while connecting.
fn connect(
    config: &SessionConfig,
    writer: &Mutex<Option<TcpStream>>,
    pending_toggle: &Mutex<Option<bool>>,
    closing: &AtomicBool,
) -> Result<Option<TcpStream>> {
    let mut stream = TcpStream::connect_timeout(&config.addr(), config.connect_timeout)
        .with_context(|| format!("127.0.0.1:{}", config.port))?;
    stream.set_nodelay(true)?;
    let reader = stream.try_clone()?;
    write_message(&mut stream, ClientMessage::StartTracking)?;

    let mut guard = lock_or_recover(writer, "telemetry writer");
    if closing.load(Ordering::SeqCst) {
        let _ = stream.shutdown(Shutdown::Both);
        return Ok(None);
    }
    let mut pending = lock_or_recover(pending_toggle, "pending toggle");
    if let Some(active) = *pending {
        write_message(&mut stream, ClientMessage::ToggleSystem { active })
            .context("failed to send queued toggle_system")?;
        *pending = None;
        log_debug(&format!("sent queued toggle_system {active} after connect"));
    }
    *guard = Some(stream);
    Ok(Some(reader))
}

/// Read until the stream ends. Returns the disconnect reason.
fn read_updates(reader: TcpStream, events: &Sender<SessionEvent>, seq: &mut u64) -> String {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return "engine closed the stream".to_string(),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return format!("read failed: {err}"),
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_server_line(line) {
            Ok(Some(event)) => {
                *seq += 1;
                let update = SessionEvent::Update { seq: *seq, event };
                if events.send(update).is_err() {
                    return "session owner went away".to_string();
                }
            }
            Ok(None) => log_debug_content(&format!("ignoring engine event: {line}")),
            Err(err) => {
                log_debug(&format!("skipping malformed engine line: {err}"));
                log_debug_content(&format!("malformed line: {line}"));
            }
        }
    }
}
