//! Launches the recognition engine, waits for its readiness marker, and stops it on
//! shutdown. Nothing user-visible may be created until `Supervisor::start` hands out a
//! [`ReadyEngine`]; the surface registry requires one to exist.

mod process;
mod readiness;
#[cfg(test)]
mod tests;

pub use process::{EngineSpec, EngineState, StartupFailure, Supervisor};
pub use readiness::{await_readiness, EngineOutput, Readiness};

/// Proof that the engine printed its readiness marker. Only the supervisor builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEngine {
    port: u16,
    pid: u32,
}

impl ReadyEngine {
    pub(crate) fn new(port: u16, pid: u32) -> Self {
        Self { port, pid }
    }

    /// Port the engine accepts telemetry sessions on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}
