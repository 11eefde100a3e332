use crossbeam_channel::{unbounded, Sender};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use super::readiness::{await_readiness, EngineOutput, Readiness};
use super::ReadyEngine;
use crate::{log_debug, log_engine_line};

/// Launch parameters for the recognition engine.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    pub program: String,
    pub args: Vec<String>,
    pub port: u16,
    pub ready_marker: String,
    pub ready_timeout: Duration,
}

impl EngineSpec {
    /// Arguments after the program name; the port always comes last.
    pub fn argv_tail(&self) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push(self.port.to_string());
        argv
    }
}

/// Lifecycle of the engine process as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Ready,
    Failed,
    Terminated,
}

impl EngineState {
    pub fn label(self) -> &'static str {
        match self {
            EngineState::Starting => "starting",
            EngineState::Ready => "ready",
            EngineState::Failed => "failed",
            EngineState::Terminated => "terminated",
        }
    }
}

/// Every way startup can fail. Callers treat all of them the same: abort launch.
#[derive(Debug, Error)]
pub enum StartupFailure {
    #[error("failed to spawn engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine did not print '{marker}' within {timeout:?}")]
    Timeout { marker: String, timeout: Duration },
    #[error("engine exited before printing '{marker}'")]
    Exited { marker: String },
    #[error("engine already started")]
    AlreadyStarted,
}

/// Owns the engine child process for the whole application lifetime.
pub struct Supervisor {
    spec: EngineSpec,
    state: EngineState,
    child: Option<Child>,
}

impl Supervisor {
    pub fn new(spec: EngineSpec) -> Self {
        Self {
            spec,
            state: EngineState::Starting,
            child: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Spawn the engine and block until it reports readiness or the timeout elapses.
    pub fn start(&mut self) -> Result<ReadyEngine, StartupFailure> {
        if self.child.is_some() || self.state != EngineState::Starting {
            return Err(StartupFailure::AlreadyStarted);
        }
        tracing::info!(
            program = %self.spec.program,
            port = self.spec.port,
            "starting engine"
        );

        let mut child = match Command::new(&self.spec.program)
            .args(self.spec.argv_tail())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                return Err(self.fail(StartupFailure::Spawn {
                    program: self.spec.program.clone(),
                    source,
                }));
            }
        };

        let (tx, rx) = unbounded();
        if let Some(stdout) = child.stdout.take() {
            spawn_output_reader(stdout, tx.clone(), false);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_reader(stderr, tx, true);
        }

        let pid = child.id();
        self.child = Some(child);
        let readiness = await_readiness(&rx, &self.spec.ready_marker, self.spec.ready_timeout);
        // Dropping the receiver hands line logging over to the reader threads.
        drop(rx);

        match readiness {
            Readiness::Ready => {
                self.state = EngineState::Ready;
                tracing::info!(pid, port = self.spec.port, "engine ready");
                Ok(ReadyEngine::new(self.spec.port, pid))
            }
            Readiness::TimedOut => {
                self.kill_child();
                Err(self.fail(StartupFailure::Timeout {
                    marker: self.spec.ready_marker.clone(),
                    timeout: self.spec.ready_timeout,
                }))
            }
            Readiness::Exited => {
                self.kill_child();
                Err(self.fail(StartupFailure::Exited {
                    marker: self.spec.ready_marker.clone(),
                }))
            }
        }
    }

    /// Signal the engine to terminate without waiting for it to exit.
    pub fn stop(&mut self) {
        let Some(child) = self.child.take() else {
            return;
        };
        let pid = child.id();
        send_terminate(child, pid);
        if self.state != EngineState::Failed {
            self.state = EngineState::Terminated;
        }
        tracing::info!(pid, "engine stop requested");
    }

    fn fail(&mut self, failure: StartupFailure) -> StartupFailure {
        self.state = EngineState::Failed;
        tracing::error!(error = %failure, "engine startup failed");
        log_debug(&format!("engine startup failed: {failure}"));
        failure
    }

    fn kill_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn send_terminate(child: Child, pid: u32) {
    // SAFETY: pid belongs to a child we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        log_debug(&format!(
            "SIGTERM to engine {pid} failed: {}",
            std::io::Error::last_os_error()
        ));
    }
    spawn_reaper(child, pid);
}

#[cfg(not(unix))]
fn send_terminate(mut child: Child, pid: u32) {
    if let Err(err) = child.kill() {
        log_debug(&format!("killing engine {pid} failed: {err}"));
    }
    spawn_reaper(child, pid);
}

/// Reap the child in the background so shutdown never blocks on engine exit.
fn spawn_reaper(mut child: Child, pid: u32) {
    thread::spawn(move || match child.wait() {
        Ok(status) => log_debug(&format!("engine {pid} exited with {status}")),
        Err(err) => log_debug(&format!("engine {pid} wait failed: {err}")),
    });
}

fn spawn_output_reader<R>(pipe: R, tx: Sender<EngineOutput>, is_stderr: bool)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    log_debug(&format!("engine output read failed: {err}"));
                    break;
                }
            }
            // Engine output is only logged, so undecodable bytes must not end the drain.
            let line = String::from_utf8_lossy(&buf).trim_end().to_string();
            if line.is_empty() {
                continue;
            }
            let event = if is_stderr {
                EngineOutput::Stderr(line)
            } else {
                EngineOutput::Stdout(line)
            };
            // Once readiness resolved nobody listens; keep draining so the pipe never fills.
            if let Err(unsent) = tx.send(event) {
                match unsent.into_inner() {
                    EngineOutput::Stdout(line) => log_engine_line(&line, false),
                    EngineOutput::Stderr(line) => log_engine_line(&line, true),
                    EngineOutput::StdoutClosed => {}
                }
            }
        }
        if !is_stderr {
            let _ = tx.send(EngineOutput::StdoutClosed);
            log_debug("engine stdout closed");
        }
    });
}
