//! Process-wide ambient services: debug file log, crash log, JSON trace log.

mod logging;
mod trace;

#[cfg(test)]
pub(crate) use logging::{force_rotation_for_tests, set_logging_for_tests};
pub use logging::{
    crash_log_path, init_logging, install_panic_hook, log_debug, log_debug_content,
    log_engine_line, log_file_path, log_panic, rotated_path,
};
pub use trace::{init_tracing, trace_log_path};
