use super::*;
use crossbeam_channel::unbounded;
use std::thread;
use std::time::{Duration, Instant};

fn spec_for(program: &str, timeout: Duration) -> EngineSpec {
    EngineSpec {
        program: program.to_string(),
        args: Vec::new(),
        port: 5847,
        ready_marker: "Backend ready".to_string(),
        ready_timeout: timeout,
    }
}

#[cfg(unix)]
fn write_stub_script(dir: &tempfile::TempDir, body: &str) -> String {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("engine_stub.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write stub");
    let mut perms = fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod stub");
    path.to_string_lossy().to_string()
}

// -------------------------------------------------------------------------
// Readiness scanning
// -------------------------------------------------------------------------

#[test]
fn readiness_resolves_when_marker_arrives_before_timeout() {
    let (tx, rx) = unbounded();
    let sender = thread::spawn(move || {
        tx.send(EngineOutput::Stdout("loading model".to_string())).unwrap();
        thread::sleep(Duration::from_millis(50));
        tx.send(EngineOutput::Stdout("Backend ready".to_string())).unwrap();
        tx
    });
    let result = await_readiness(&rx, "Backend ready", Duration::from_millis(1_000));
    assert_eq!(result, Readiness::Ready);
    drop(sender.join());
}

#[test]
fn readiness_matches_marker_inside_longer_line() {
    let (tx, rx) = unbounded();
    tx.send(EngineOutput::Stdout("[server] Backend ready on 5847".to_string()))
        .unwrap();
    assert_eq!(
        await_readiness(&rx, "Backend ready", Duration::from_millis(100)),
        Readiness::Ready
    );
}

#[test]
fn readiness_ignores_marker_on_stderr() {
    let (tx, rx) = unbounded();
    tx.send(EngineOutput::Stderr("Backend ready".to_string())).unwrap();
    assert_eq!(
        await_readiness(&rx, "Backend ready", Duration::from_millis(80)),
        Readiness::TimedOut
    );
}

#[test]
fn readiness_times_out_without_marker() {
    let (tx, rx) = unbounded::<EngineOutput>();
    let started = Instant::now();
    let result = await_readiness(&rx, "Backend ready", Duration::from_millis(120));
    assert_eq!(result, Readiness::TimedOut);
    assert!(started.elapsed() >= Duration::from_millis(120));
    drop(tx);
}

#[test]
fn readiness_deadline_is_not_extended_by_chatter() {
    let (tx, rx) = unbounded();
    let chatter = thread::spawn(move || {
        for _ in 0..40 {
            if tx.send(EngineOutput::Stdout("still loading".to_string())).is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
    });
    let started = Instant::now();
    let result = await_readiness(&rx, "Backend ready", Duration::from_millis(150));
    assert_eq!(result, Readiness::TimedOut);
    assert!(started.elapsed() < Duration::from_millis(380));
    drop(rx);
    let _ = chatter.join();
}

#[test]
fn readiness_reports_exit_when_stdout_closes() {
    let (tx, rx) = unbounded();
    tx.send(EngineOutput::StdoutClosed).unwrap();
    assert_eq!(
        await_readiness(&rx, "Backend ready", Duration::from_millis(500)),
        Readiness::Exited
    );
}

#[test]
fn readiness_reports_exit_when_all_readers_drop() {
    let (tx, rx) = unbounded::<EngineOutput>();
    drop(tx);
    assert_eq!(
        await_readiness(&rx, "Backend ready", Duration::from_millis(500)),
        Readiness::Exited
    );
}

// -------------------------------------------------------------------------
// Process lifecycle
// -------------------------------------------------------------------------

#[test]
fn missing_executable_fails_startup() {
    let mut supervisor = Supervisor::new(spec_for(
        "/definitely/not/a/real/engine",
        Duration::from_millis(200),
    ));
    let err = supervisor.start().expect_err("spawn must fail");
    assert!(matches!(err, StartupFailure::Spawn { .. }));
    assert_eq!(supervisor.state(), EngineState::Failed);
    assert!(supervisor.pid().is_none());
}

#[test]
fn argv_tail_appends_port_last() {
    let mut spec = spec_for("python3", Duration::from_secs(1));
    spec.args = vec!["backend_server.py".to_string()];
    assert_eq!(spec.argv_tail(), vec!["backend_server.py", "5847"]);
}

#[cfg(unix)]
#[test]
fn engine_printing_marker_becomes_ready_and_receives_port() {
    let dir = tempfile::tempdir().expect("tempdir");
    let port_file = dir.path().join("port.txt");
    let script = write_stub_script(
        &dir,
        &format!(
            "echo \"$1\" > '{}'\necho 'loading'\nsleep 0.1\necho 'Backend ready'\nsleep 5",
            port_file.display()
        ),
    );
    let mut supervisor = Supervisor::new(spec_for(&script, Duration::from_secs(5)));
    let ready = supervisor.start().expect("engine ready");
    assert_eq!(ready.port(), 5847);
    assert_eq!(supervisor.state(), EngineState::Ready);
    assert_eq!(Some(ready.pid()), supervisor.pid());
    let recorded = std::fs::read_to_string(&port_file).expect("port recorded");
    assert_eq!(recorded.trim(), "5847");

    supervisor.stop();
    assert_eq!(supervisor.state(), EngineState::Terminated);
    assert!(supervisor.pid().is_none());
}

#[cfg(unix)]
#[test]
fn silent_engine_fails_after_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_stub_script(&dir, "echo 'warming up'\nsleep 5");
    let mut supervisor = Supervisor::new(spec_for(&script, Duration::from_millis(200)));
    let started = Instant::now();
    let err = supervisor.start().expect_err("no marker");
    assert!(matches!(err, StartupFailure::Timeout { .. }));
    assert_eq!(supervisor.state(), EngineState::Failed);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[cfg(unix)]
#[test]
fn engine_exiting_before_marker_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_stub_script(&dir, "echo 'import error' >&2\nexit 3");
    let mut supervisor = Supervisor::new(spec_for(&script, Duration::from_secs(5)));
    let err = supervisor.start().expect_err("engine exited");
    assert!(matches!(err, StartupFailure::Exited { .. }));
    assert_eq!(supervisor.state(), EngineState::Failed);
}

#[cfg(unix)]
#[test]
fn non_utf8_output_before_marker_does_not_end_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_stub_script(
        &dir,
        "printf 'cam\\377ok\\n'\nprintf 'warn \\376\\n' >&2\necho 'Backend ready'\nsleep 5",
    );
    let mut supervisor = Supervisor::new(spec_for(&script, Duration::from_secs(5)));
    let ready = supervisor.start().expect("engine ready despite undecodable line");
    assert_eq!(ready.port(), 5847);
    assert_eq!(supervisor.state(), EngineState::Ready);
    supervisor.stop();
}

#[cfg(unix)]
#[test]
fn stop_returns_without_waiting_for_engine_exit() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Ignores SIGTERM so the exit would take the full sleep if stop() waited.
    let script = write_stub_script(&dir, "trap '' TERM\necho 'Backend ready'\nsleep 3");
    let mut supervisor = Supervisor::new(spec_for(&script, Duration::from_secs(5)));
    supervisor.start().expect("engine ready");
    let started = Instant::now();
    supervisor.stop();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(supervisor.state(), EngineState::Terminated);
}

#[cfg(unix)]
#[test]
fn start_twice_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_stub_script(&dir, "echo 'Backend ready'\nsleep 2");
    let mut supervisor = Supervisor::new(spec_for(&script, Duration::from_secs(5)));
    supervisor.start().expect("engine ready");
    assert!(matches!(
        supervisor.start(),
        Err(StartupFailure::AlreadyStarted)
    ));
    supervisor.stop();
}
