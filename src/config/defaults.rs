pub const DEFAULT_ENGINE_CMD: &str = "python3";
pub const DEFAULT_ENGINE_SCRIPT: &str = "backend_server.py";
pub const DEFAULT_BACKEND_PORT: u16 = 5847;
pub const DEFAULT_READY_MARKER: &str = "Backend ready";
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_GESTURE_DWELL_MS: u64 = 2_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 250;
pub const DEFAULT_FRAME_DECODE_WORKERS: usize = 2;
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 500;
pub const DEFAULT_DISPLAY_WIDTH: u32 = 1920;
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 1040;

pub(super) const MAX_READY_TIMEOUT_MS: u64 = 120_000;
pub(super) const MAX_RECONNECT_ATTEMPTS: u32 = 50;
pub(super) const MAX_RECONNECT_BACKOFF_MS: u64 = 5_000;
pub(super) const MAX_ENGINE_ARGS: usize = 32;
pub(super) const MAX_ENGINE_ARG_BYTES: usize = 8 * 1024;
pub(super) const MAX_FRAME_DECODE_WORKERS: usize = 8;
