//! Rendering context of one surface: its own thread, channel endpoint, telemetry
//! session and view state. Nothing here is shared with other surfaces.

use crossbeam_channel::{never, select, Receiver};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::channel::{SurfaceEndpoint, SurfacePush, SurfaceRequest};
use crate::gesture::GestureDisplay;
use crate::surfaces::SurfaceKind;
use crate::system_state::SystemStateReplica;
use crate::telemetry::{
    FrameDecoder, FrameOutcome, FrameRenderer, GestureTag, SessionConfig, SessionEvent,
    TelemetryEvent, TelemetrySession, ToggleDelivery,
};
use crate::log_debug;

const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Inputs a frontend delivers to one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceInput {
    /// The system toggle control in Main.
    ToggleSystem,
    /// Widget "Show" button.
    OpenMain,
    /// Raw control-channel request, already validated.
    Forward(SurfaceRequest),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No backend port yet.
    Waiting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    GaveUp,
}

/// Everything a surface displays, minus frame pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceView {
    pub surface: SurfaceKind,
    pub backend_port: Option<u16>,
    pub session: SessionStatus,
    pub system_active: bool,
    pub hand_detected: bool,
    pub activation_progress: f64,
    pub gesture: Option<String>,
    pub frame_seq: Option<u64>,
}

impl SurfaceView {
    fn new(surface: SurfaceKind) -> Self {
        Self {
            surface,
            backend_port: None,
            session: SessionStatus::Waiting,
            system_active: true,
            hand_detected: false,
            activation_progress: 0.0,
            gesture: None,
            frame_seq: None,
        }
    }
}

/// Where a runtime publishes its view whenever it changes.
pub trait ViewSink: Send {
    fn present(&mut self, view: &SurfaceView);
}

#[derive(Clone)]
pub struct FrameOptions {
    pub decoder: Arc<dyn FrameDecoder>,
    pub workers: usize,
}

#[derive(Clone)]
pub struct RuntimeOptions {
    /// Connection settings; the port is replaced by the one the core pushes.
    pub session: SessionConfig,
    pub gesture_dwell: Duration,
    /// Only surfaces with a canvas decode frames.
    pub frames: Option<FrameOptions>,
    pub reply_timeout: Duration,
}

pub struct SurfaceRuntime<S: ViewSink> {
    endpoint: SurfaceEndpoint,
    options: RuntimeOptions,
    sink: S,
    replica: SystemStateReplica,
    display: GestureDisplay,
    session: Option<TelemetrySession>,
    session_events: Option<Receiver<SessionEvent>>,
    /// User toggle made before the session existed.
    pending_toggle: Option<bool>,
    renderer: Option<FrameRenderer>,
    view: SurfaceView,
    published: Option<SurfaceView>,
}

impl<S: ViewSink> SurfaceRuntime<S> {
    pub fn new(endpoint: SurfaceEndpoint, options: RuntimeOptions, sink: S) -> Self {
        let view = SurfaceView::new(endpoint.kind());
        let display = GestureDisplay::new(options.gesture_dwell);
        Self {
            endpoint,
            options,
            sink,
            replica: SystemStateReplica::default(),
            display,
            session: None,
            session_events: None,
            pending_toggle: None,
            renderer: None,
            view,
            published: None,
        }
    }

    pub fn kind(&self) -> SurfaceKind {
        self.endpoint.kind()
    }

    pub fn view(&self) -> &SurfaceView {
        &self.view
    }

    pub fn spawn(self, inputs: Receiver<SurfaceInput>) -> thread::JoinHandle<()>
    where
        S: 'static,
    {
        thread::spawn(move || self.run(inputs))
    }

    /// Event loop. Returns after `Shutdown`, or once the frontend or core is gone.
    pub fn run(mut self, inputs: Receiver<SurfaceInput>) {
        let pushes = self.endpoint.pushes().clone();
        self.publish();
        loop {
            let session_events = self.session_events.clone().unwrap_or_else(never);
            let frame_outcomes = self
                .renderer
                .as_ref()
                .map(|renderer| renderer.outcomes().clone())
                .unwrap_or_else(never);
            let wait = self
                .display
                .deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_WAIT);

            select! {
                recv(inputs) -> input => match input {
                    Ok(SurfaceInput::Shutdown) | Err(_) => break,
                    Ok(input) => self.handle_input(input),
                },
                recv(pushes) -> push => match push {
                    Ok(push) => self.handle_push(push),
                    Err(_) => break,
                },
                recv(session_events) -> event => match event {
                    Ok(event) => self.handle_session_event(event, Instant::now()),
                    Err(_) => self.session_events = None,
                },
                recv(frame_outcomes) -> outcome => {
                    if let Ok(outcome) = outcome {
                        self.handle_frame_outcome(outcome);
                    }
                },
                default(wait) => {}
            }
            self.tick(Instant::now());
            self.publish();
        }
        self.shutdown();
    }

    pub(crate) fn handle_input(&mut self, input: SurfaceInput) {
        match input {
            SurfaceInput::ToggleSystem => self.toggle_system(),
            SurfaceInput::OpenMain => self.forward(SurfaceRequest::OpenMainWindow),
            SurfaceInput::Forward(request) => self.forward(request),
            SurfaceInput::Shutdown => {}
        }
    }

    fn forward(&mut self, request: SurfaceRequest) {
        let kind = self.kind();
        let result = match request {
            SurfaceRequest::GetBackendPort => {
                match self.endpoint.get_backend_port(self.options.reply_timeout) {
                    Ok(port) => {
                        self.connect(port);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            SurfaceRequest::NotifySystemState { active } => {
                self.replica.set(active);
                self.view.system_active = active;
                self.endpoint.send(request)
            }
            SurfaceRequest::OpenMainWindow => self.endpoint.send(request),
        };
        if let Err(err) = result {
            log_debug(&format!("{} {} failed: {err}", kind.label(), request.name()));
        }
    }

    /// User toggle: flip locally, tell the core, tell the engine.
    fn toggle_system(&mut self) {
        let active = self.replica.toggle();
        self.view.system_active = active;
        if let Err(err) = self.endpoint.notify_system_state(active) {
            log_debug(&format!("notifySystemState not delivered: {err}"));
        }
        match &self.session {
            Some(session) => send_toggle(session, active),
            None => {
                log_debug("toggle_system held until the session opens");
                self.pending_toggle = Some(active);
            }
        }
    }

    pub(crate) fn handle_push(&mut self, push: SurfacePush) {
        match push {
            SurfacePush::BackendPort { port } => self.connect(port),
            SurfacePush::SetSystemState { active } => {
                self.replica.set(active);
                self.view.system_active = active;
            }
        }
    }

    /// Open the telemetry session once; later port pushes are ignored.
    fn connect(&mut self, port: u16) {
        self.view.backend_port = Some(port);
        if self.session.is_some() {
            return;
        }
        let config = SessionConfig {
            port,
            ..self.options.session
        };
        let session = TelemetrySession::open(config);
        if let Some(active) = self.pending_toggle.take() {
            send_toggle(&session, active);
        }
        self.session_events = Some(session.events().clone());
        self.session = Some(session);
        if let Some(frames) = &self.options.frames {
            self.renderer = Some(FrameRenderer::new(
                Arc::clone(&frames.decoder),
                frames.workers,
            ));
        }
        log_debug(&format!(
            "{} opened telemetry session on port {port}",
            self.kind().label()
        ));
    }

    pub(crate) fn handle_session_event(&mut self, event: SessionEvent, now: Instant) {
        match event {
            SessionEvent::Connected => self.view.session = SessionStatus::Connected,
            SessionEvent::Disconnected { reason } => {
                log_debug(&format!("{} session dropped: {reason}", self.kind().label()));
                self.view.session = SessionStatus::Disconnected;
            }
            SessionEvent::Reconnecting { attempt, .. } => {
                self.view.session = SessionStatus::Reconnecting { attempt };
            }
            SessionEvent::GaveUp => self.view.session = SessionStatus::GaveUp,
            SessionEvent::Update { seq, event } => self.apply_update(seq, event, now),
        }
    }

    fn apply_update(&mut self, seq: u64, event: TelemetryEvent, now: Instant) {
        self.view.hand_detected = event.hand_detected;
        self.view.activation_progress = event.activation_progress();

        if let Some(active) = event.system_active {
            if self.replica.set(active) {
                self.view.system_active = active;
                if let Err(err) = self.endpoint.notify_system_state(active) {
                    log_debug(&format!("engine system state not reported: {err}"));
                }
            }
        }

        if let Some(tag) = event.displayable_gesture() {
            if let GestureTag::Unmapped(raw) = tag {
                log_debug(&format!("unmapped gesture tag {raw:?}"));
            }
            self.display.observe(tag, event.play_pause_display.as_ref(), now);
            self.view.gesture = self.display.label().map(str::to_string);
        }

        if let (Some(frame), Some(renderer)) = (event.tracking_frame, &self.renderer) {
            renderer.submit(seq, frame);
        }
    }

    pub(crate) fn handle_frame_outcome(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Drawn { .. } => {
                self.view.frame_seq = self.renderer.as_ref().and_then(FrameRenderer::current_seq);
            }
            FrameOutcome::Stale { seq } => log_debug(&format!("dropped stale frame {seq}")),
            FrameOutcome::Failed { .. } => {}
        }
    }

    pub(crate) fn tick(&mut self, now: Instant) {
        if self.display.tick(now) {
            self.view.gesture = None;
        }
    }

    fn publish(&mut self) {
        if self.published.as_ref() == Some(&self.view) {
            return;
        }
        self.sink.present(&self.view);
        self.published = Some(self.view.clone());
    }

    fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.session_events = None;
        self.renderer = None;
        log_debug(&format!("{} runtime stopped", self.kind().label()));
    }
}

fn send_toggle(session: &TelemetrySession, active: bool) {
    match session.toggle_system(active) {
        Ok(ToggleDelivery::Sent) => {}
        Ok(ToggleDelivery::Queued) => {
            log_debug(&format!("toggle_system {active} queued until the engine reconnects"));
        }
        Err(err) => log_debug(&format!("toggle_system not sent to engine: {err:#}")),
    }
}
