//! Headless frontend: JSON-lines commands on stdin, JSON-lines events on stdout.
//!
//! A windowing toolkit would replace this module by implementing [`SurfaceHost`] and
//! [`ViewSink`] and feeding the same [`CoreInput`]/[`SurfaceInput`] channels.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

use super::runtime::{SurfaceInput, SurfaceView, ViewSink};
use super::CoreInput;
use crate::channel::{decode_request, ChannelError};
use crate::surfaces::{
    Bounds, Surface, SurfaceHost, SurfaceKind, SurfaceTraits, TrayAction, TrayMenu,
};
use crate::{lock_or_recover, log_debug, log_debug_content};

// ============================================================================
// Commands (frontend → shell)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum UiCommand {
    /// Main window's system toggle control.
    ToggleSystem,
    /// Widget "Show" button.
    WidgetClick,
    TrayClick,
    TrayMenu { item: TrayAction },
    /// Window chrome close button.
    Close { surface: SurfaceKind },
    Quit,
    /// Raw control-channel request sent from a surface's rendering context.
    Channel {
        surface: SurfaceKind,
        request: serde_json::Value,
    },
}

pub fn parse_ui_command(line: &str) -> Result<UiCommand, serde_json::Error> {
    serde_json::from_str(line)
}

// ============================================================================
// Events (shell → frontend)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ShellEvent {
    Startup {
        version: &'static str,
        engine_pid: u32,
        port: u16,
    },
    StartupFailed {
        message: String,
    },
    SurfaceCreated {
        surface: SurfaceKind,
        visible: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        bounds: Option<Bounds>,
        traits: SurfaceTraits,
    },
    Visibility {
        surface: SurfaceKind,
        visible: bool,
    },
    Focus {
        surface: SurfaceKind,
    },
    SurfaceDestroyed {
        surface: SurfaceKind,
    },
    TrayMenu {
        menu: TrayMenu,
    },
    SurfaceView {
        view: SurfaceView,
    },
    Error {
        message: String,
        recoverable: bool,
    },
    Shutdown {
        reason: String,
    },
}

/// Serialises events as JSON lines. Clones share one output stream.
#[derive(Clone)]
pub struct EventWriter {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EventWriter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn emit(&self, event: &ShellEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                log_debug(&format!("failed to encode frontend event: {err}"));
                return;
            }
        };
        let mut out = lock_or_recover(&self.out, "event writer");
        let _ = writeln!(out, "{json}");
        let _ = out.flush();
    }
}

/// [`SurfaceHost`] that reports every surface operation as an event.
pub struct JsonHost {
    out: EventWriter,
}

impl JsonHost {
    pub fn new(out: EventWriter) -> Self {
        Self { out }
    }
}

impl SurfaceHost for JsonHost {
    fn create(&mut self, surface: &Surface) {
        self.out.emit(&ShellEvent::SurfaceCreated {
            surface: surface.kind,
            visible: surface.is_visible(),
            bounds: surface.bounds,
            traits: surface.traits,
        });
    }

    fn set_visible(&mut self, kind: SurfaceKind, visible: bool) {
        self.out.emit(&ShellEvent::Visibility {
            surface: kind,
            visible,
        });
    }

    fn focus(&mut self, kind: SurfaceKind) {
        self.out.emit(&ShellEvent::Focus { surface: kind });
    }

    fn destroy(&mut self, kind: SurfaceKind) {
        self.out.emit(&ShellEvent::SurfaceDestroyed { surface: kind });
    }

    fn set_tray_menu(&mut self, menu: &TrayMenu) {
        self.out.emit(&ShellEvent::TrayMenu { menu: menu.clone() });
    }
}

pub struct JsonViewSink {
    out: EventWriter,
}

impl JsonViewSink {
    pub fn new(out: EventWriter) -> Self {
        Self { out }
    }
}

impl ViewSink for JsonViewSink {
    fn present(&mut self, view: &SurfaceView) {
        self.out.emit(&ShellEvent::SurfaceView { view: view.clone() });
    }
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid channel request: {0}")]
    Invalid(#[from] ChannelError),
    #[error("{} has no rendering context", .0.label())]
    NoRenderingContext(SurfaceKind),
    #[error("shell is shutting down")]
    Closed,
}

/// Senders for every context a frontend command can target.
#[derive(Clone)]
pub struct FrontendRoutes {
    pub core: Sender<CoreInput>,
    pub main: Sender<SurfaceInput>,
    pub widget: Sender<SurfaceInput>,
}

impl FrontendRoutes {
    pub fn route(&self, command: UiCommand) -> Result<(), RouteError> {
        match command {
            UiCommand::ToggleSystem => {
                self.to_surface(SurfaceKind::Main, SurfaceInput::ToggleSystem)
            }
            UiCommand::WidgetClick => self.to_surface(SurfaceKind::Widget, SurfaceInput::OpenMain),
            UiCommand::TrayClick => self.to_core(CoreInput::TrayIconClicked),
            UiCommand::TrayMenu { item } => self.to_core(CoreInput::TrayMenu(item)),
            UiCommand::Close { surface } => self.to_core(CoreInput::CloseRequested(surface)),
            UiCommand::Quit => self.to_core(CoreInput::Quit),
            UiCommand::Channel { surface, request } => {
                log_debug_content(&format!("{} channel request: {request}", surface.label()));
                let request = decode_request(&request)?;
                self.to_surface(surface, SurfaceInput::Forward(request))
            }
        }
    }

    fn to_core(&self, input: CoreInput) -> Result<(), RouteError> {
        self.core.send(input).map_err(|_| RouteError::Closed)
    }

    fn to_surface(&self, kind: SurfaceKind, input: SurfaceInput) -> Result<(), RouteError> {
        let target = match kind {
            SurfaceKind::Main => &self.main,
            SurfaceKind::Widget => &self.widget,
            SurfaceKind::Tray => return Err(RouteError::NoRenderingContext(kind)),
        };
        target.send(input).map_err(|_| RouteError::Closed)
    }
}

/// Route every command line from `input`. EOF asks the core to quit.
pub fn read_commands(input: impl BufRead, routes: &FrontendRoutes, out: &EventWriter) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let command = match parse_ui_command(trimmed) {
            Ok(command) => command,
            Err(err) => {
                out.emit(&ShellEvent::Error {
                    message: format!("Invalid command: {err}"),
                    recoverable: true,
                });
                continue;
            }
        };
        match routes.route(command) {
            Ok(()) => {}
            Err(RouteError::Closed) => break,
            Err(err) => out.emit(&ShellEvent::Error {
                message: err.to_string(),
                recoverable: true,
            }),
        }
    }
    let _ = routes.core.send(CoreInput::Quit);
    log_debug("Stdin reader thread exiting");
}

pub fn spawn_stdin_reader(routes: FrontendRoutes, out: EventWriter) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        read_commands(stdin.lock(), &routes, &out);
    })
}
