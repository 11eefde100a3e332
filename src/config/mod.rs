//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{ArgAction, Parser};
use std::time::Duration;

pub use defaults::{
    DEFAULT_BACKEND_PORT, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_DISPLAY_HEIGHT, DEFAULT_DISPLAY_WIDTH, DEFAULT_ENGINE_CMD, DEFAULT_ENGINE_SCRIPT,
    DEFAULT_FRAME_DECODE_WORKERS, DEFAULT_GESTURE_DWELL_MS, DEFAULT_READY_MARKER,
    DEFAULT_READY_TIMEOUT_MS, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BACKOFF_MS,
};

use crate::supervisor::EngineSpec;
use crate::surfaces::WorkArea;
use crate::telemetry::{ReconnectPolicy, SessionConfig};

/// CLI options for the OKTrix shell. Validated values keep the engine subprocess safe.
#[derive(Debug, Parser, Clone)]
#[command(about = "OKTrix gesture control shell", author, version)]
pub struct AppConfig {
    /// Interpreter or binary that runs the recognition engine
    #[arg(long = "engine-cmd", env = "OKTRIX_ENGINE_CMD", default_value = DEFAULT_ENGINE_CMD)]
    pub engine_cmd: String,

    /// Arguments passed to the engine before the port (repeatable)
    #[arg(
        long = "engine-arg",
        action = ArgAction::Append,
        value_name = "ARG",
        default_value = DEFAULT_ENGINE_SCRIPT
    )]
    pub engine_args: Vec<String>,

    /// Port the engine listens on for telemetry sessions
    #[arg(long, env = "OKTRIX_PORT", default_value_t = DEFAULT_BACKEND_PORT)]
    pub port: u16,

    /// Line fragment the engine prints on stdout once it accepts connections
    #[arg(long = "ready-marker", default_value = DEFAULT_READY_MARKER)]
    pub ready_marker: String,

    /// How long to wait for the readiness marker (milliseconds)
    #[arg(long = "ready-timeout-ms", default_value_t = DEFAULT_READY_TIMEOUT_MS)]
    pub ready_timeout_ms: u64,

    /// How long a recognised gesture stays on screen (milliseconds)
    #[arg(long = "gesture-dwell-ms", default_value_t = DEFAULT_GESTURE_DWELL_MS)]
    pub gesture_dwell_ms: u64,

    /// Timeout for each telemetry connection attempt (milliseconds)
    #[arg(long = "connect-timeout-ms", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,

    /// Reconnect attempts after a telemetry session drops (0 disables reconnect)
    #[arg(long = "reconnect-attempts", default_value_t = DEFAULT_RECONNECT_ATTEMPTS)]
    pub reconnect_attempts: u32,

    /// Initial reconnect backoff, doubled per attempt (milliseconds)
    #[arg(long = "reconnect-backoff-ms", default_value_t = DEFAULT_RECONNECT_BACKOFF_MS)]
    pub reconnect_backoff_ms: u64,

    /// Worker threads decoding tracking frames
    #[arg(long = "frame-decode-workers", default_value_t = DEFAULT_FRAME_DECODE_WORKERS)]
    pub frame_decode_workers: usize,

    /// Canvas width tracking frames are scaled to
    #[arg(long = "canvas-width", default_value_t = DEFAULT_CANVAS_WIDTH)]
    pub canvas_width: u32,

    /// Canvas height tracking frames are scaled to
    #[arg(long = "canvas-height", default_value_t = DEFAULT_CANVAS_HEIGHT)]
    pub canvas_height: u32,

    /// Usable width of the primary display
    #[arg(long = "display-width", default_value_t = DEFAULT_DISPLAY_WIDTH)]
    pub display_width: u32,

    /// Usable height of the primary display
    #[arg(long = "display-height", default_value_t = DEFAULT_DISPLAY_HEIGHT)]
    pub display_height: u32,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "OKTRIX_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "OKTRIX_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging engine output and raw channel payloads (debug log only)
    #[arg(
        long = "log-content",
        env = "OKTRIX_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

impl AppConfig {
    /// Launch parameters for the recognition engine.
    pub fn engine_spec(&self) -> EngineSpec {
        EngineSpec {
            program: self.engine_cmd.clone(),
            args: self.engine_args.clone(),
            port: self.port,
            ready_marker: self.ready_marker.clone(),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
        }
    }

    /// Connection parameters every surface uses for its telemetry session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            port: self.port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect_attempts,
                initial_backoff: Duration::from_millis(self.reconnect_backoff_ms),
                max_backoff: Duration::from_millis(defaults::MAX_RECONNECT_BACKOFF_MS),
            },
        }
    }

    pub fn work_area(&self) -> WorkArea {
        WorkArea {
            width: self.display_width,
            height: self.display_height,
        }
    }

    pub fn gesture_dwell(&self) -> Duration {
        Duration::from_millis(self.gesture_dwell_ms)
    }
}
