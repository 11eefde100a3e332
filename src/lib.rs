pub mod app;
pub mod channel;
pub mod config;
pub mod gesture;
mod lock;
pub mod shell;
pub mod supervisor;
pub mod surfaces;
pub mod system_state;
pub mod telemetry;

pub use app::{
    crash_log_path, init_logging, init_tracing, install_panic_hook, log_debug, log_debug_content,
    log_engine_line, log_file_path, log_panic,
};
pub(crate) use lock::lock_or_recover;
