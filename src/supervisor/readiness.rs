use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::{log_debug, log_engine_line};

/// One observation from the engine's output pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    Stdout(String),
    Stderr(String),
    /// Stdout reached EOF; the engine exited or closed the pipe.
    StdoutClosed,
}

/// Result of scanning engine output for the readiness marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    Exited,
}

/// Scan stdout lines until one contains `marker`, the deadline passes, or stdout closes.
///
/// The deadline is fixed when the call starts: diagnostic output does not extend it.
pub fn await_readiness(
    output: &Receiver<EngineOutput>,
    marker: &str,
    timeout: Duration,
) -> Readiness {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Readiness::TimedOut;
        }
        match output.recv_timeout(remaining) {
            Ok(EngineOutput::Stdout(line)) => {
                if line.contains(marker) {
                    log_debug("engine readiness marker seen");
                    return Readiness::Ready;
                }
                log_engine_line(&line, false);
            }
            Ok(EngineOutput::Stderr(line)) => {
                log_engine_line(&line, true);
            }
            Ok(EngineOutput::StdoutClosed) | Err(RecvTimeoutError::Disconnected) => {
                return Readiness::Exited;
            }
            Err(RecvTimeoutError::Timeout) => return Readiness::TimedOut,
        }
    }
}
