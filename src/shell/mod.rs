//! Core process loop: owns the surface registry, the authoritative system state and
//! the core side of the control channel.
//!
//! Startup order is fixed: the engine is ready, surfaces are created, every surface with
//! a rendering context receives `backendPort`, then the loop starts serving requests.

mod frontend;
mod runtime;

use crossbeam_channel::{select, Receiver};

use crate::channel::{
    ControlChannel, CoreReply, Envelope, SurfaceEndpoint, SurfacePush, SurfaceRequest,
};
use crate::log_debug;
use crate::supervisor::ReadyEngine;
use crate::surfaces::{
    CloseOutcome, SurfaceHost, SurfaceKind, SurfaceRegistry, TrayAction, WorkArea,
};
use crate::system_state::SystemActiveState;

pub use frontend::{
    parse_ui_command, read_commands, spawn_stdin_reader, EventWriter, FrontendRoutes, JsonHost,
    JsonViewSink, RouteError, ShellEvent, UiCommand,
};
pub use runtime::{
    FrameOptions, RuntimeOptions, SessionStatus, SurfaceInput, SurfaceRuntime, SurfaceView,
    ViewSink,
};

/// Inputs that act on the core directly rather than on a surface's rendering context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreInput {
    TrayIconClicked,
    TrayMenu(TrayAction),
    CloseRequested(SurfaceKind),
    Quit,
}

/// Endpoints handed to the rendering contexts created at launch.
pub struct LaunchedSurfaces {
    pub main: SurfaceEndpoint,
    pub widget: SurfaceEndpoint,
}

/// Whether the core loop keeps running after an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell<H: SurfaceHost> {
    registry: SurfaceRegistry<H>,
    channel: ControlChannel,
    state: SystemActiveState,
    port: u16,
    tray: SurfaceEndpoint,
}

impl<H: SurfaceHost> Shell<H> {
    /// Create all surfaces and attach them to the control channel.
    pub fn launch(engine: &ReadyEngine, host: H, area: WorkArea) -> (Self, LaunchedSurfaces) {
        let registry = SurfaceRegistry::create(engine, host, area);
        let mut channel = ControlChannel::new();
        let main = channel.attach(SurfaceKind::Main);
        let widget = channel.attach(SurfaceKind::Widget);
        let tray = channel.attach(SurfaceKind::Tray);

        let port = engine.port();
        for kind in [SurfaceKind::Main, SurfaceKind::Widget] {
            channel.push_to(kind, SurfacePush::BackendPort { port });
        }

        let shell = Self {
            registry,
            channel,
            state: SystemActiveState::new(),
            port,
            tray,
        };
        (shell, LaunchedSurfaces { main, widget })
    }

    pub fn registry(&self) -> &SurfaceRegistry<H> {
        &self.registry
    }

    pub fn system_state(&self) -> &SystemActiveState {
        &self.state
    }

    /// Serve requests and frontend inputs until a quit is requested or the frontend
    /// goes away, then destroy every surface.
    pub fn run(&mut self, inputs: &Receiver<CoreInput>) {
        let requests = self.channel.requests().clone();
        let tray_pushes = self.tray.pushes().clone();
        loop {
            let flow = select! {
                recv(requests) -> envelope => match envelope {
                    Ok(envelope) => self.handle_request(envelope),
                    Err(_) => Flow::Quit,
                },
                recv(tray_pushes) -> push => {
                    if let Ok(push) = push {
                        self.apply_tray_push(push);
                    }
                    Flow::Continue
                },
                recv(inputs) -> input => match input {
                    Ok(input) => self.handle_core_input(input),
                    Err(_) => {
                        log_debug("frontend input closed; quitting");
                        self.registry.begin_quit();
                        Flow::Quit
                    }
                },
            };
            if flow == Flow::Quit {
                break;
            }
        }
        self.shutdown();
    }

    /// Process everything already queued without blocking.
    pub fn pump(&mut self) -> bool {
        let mut handled = false;
        loop {
            if let Ok(envelope) = self.channel.requests().try_recv() {
                self.handle_request(envelope);
            } else if let Ok(push) = self.tray.pushes().try_recv() {
                self.apply_tray_push(push);
            } else {
                return handled;
            }
            handled = true;
        }
    }

    fn handle_request(&mut self, envelope: Envelope) -> Flow {
        match envelope.request {
            SurfaceRequest::GetBackendPort => {
                envelope.respond(CoreReply::BackendPort { port: self.port });
            }
            SurfaceRequest::NotifySystemState { active } => {
                if let Some(change) = self.state.apply(active, envelope.from) {
                    let delivered = self
                        .channel
                        .broadcast(SurfacePush::SetSystemState { active: change.active });
                    log_debug(&format!(
                        "system state {} from {} broadcast to {delivered} surfaces",
                        change.active,
                        change.writer.label()
                    ));
                }
            }
            SurfaceRequest::OpenMainWindow => self.registry.open_main(),
        }
        Flow::Continue
    }

    /// The tray renders inside the core, so its pushes land here.
    fn apply_tray_push(&mut self, push: SurfacePush) {
        match push {
            SurfacePush::SetSystemState { active } => {
                self.registry.apply_system_state(active);
            }
            SurfacePush::BackendPort { .. } => {}
        }
    }

    pub fn handle_core_input(&mut self, input: CoreInput) -> Flow {
        match input {
            CoreInput::TrayIconClicked => self.registry.toggle_main(),
            CoreInput::TrayMenu(action) => {
                if self.registry.activate_tray(action) {
                    return Flow::Quit;
                }
            }
            CoreInput::CloseRequested(kind) => {
                if self.registry.request_close(kind) == CloseOutcome::Ignored {
                    log_debug(&format!("{} has no close affordance", kind.label()));
                }
            }
            CoreInput::Quit => {
                self.registry.begin_quit();
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    pub fn shutdown(&mut self) {
        self.registry.shutdown();
    }
}
