//! OKTrix shell entrypoint: supervises the recognition engine and runs the surfaces
//! headless, speaking JSON lines on stdin/stdout.
//!
//! # Architecture
//!
//! - Main thread: engine startup, then the core loop (registry, system state, channel)
//! - Surface threads: one rendering context each for Main and Widget
//! - Session workers: one telemetry connection per surface
//! - Stdin reader: routes frontend commands to the core or a surface

use anyhow::Result;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::time::Duration;

use oktrix::config::AppConfig;
use oktrix::shell::{
    spawn_stdin_reader, EventWriter, FrameOptions, FrontendRoutes, JsonHost, JsonViewSink,
    RuntimeOptions, Shell, ShellEvent, SurfaceInput, SurfaceRuntime,
};
use oktrix::supervisor::Supervisor;
use oktrix::telemetry::ImageFrameDecoder;
use oktrix::{init_logging, init_tracing, install_panic_hook, log_debug, log_file_path};

const CHANNEL_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();
    log_debug("=== OKTrix shell started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let out = EventWriter::stdout();
    let mut supervisor = Supervisor::new(config.engine_spec());
    let engine = match supervisor.start() {
        Ok(engine) => engine,
        Err(err) => {
            out.emit(&ShellEvent::StartupFailed {
                message: err.to_string(),
            });
            return Err(err.into());
        }
    };
    out.emit(&ShellEvent::Startup {
        version: env!("CARGO_PKG_VERSION"),
        engine_pid: engine.pid(),
        port: engine.port(),
    });

    let (mut shell, surfaces) =
        Shell::launch(&engine, JsonHost::new(out.clone()), config.work_area());

    let widget_options = RuntimeOptions {
        session: config.session_config(),
        gesture_dwell: config.gesture_dwell(),
        frames: None,
        reply_timeout: CHANNEL_REPLY_TIMEOUT,
    };
    let main_options = RuntimeOptions {
        frames: Some(FrameOptions {
            decoder: Arc::new(ImageFrameDecoder::new(
                config.canvas_width,
                config.canvas_height,
            )),
            workers: config.frame_decode_workers,
        }),
        ..widget_options.clone()
    };

    let (main_tx, main_rx) = unbounded();
    let (widget_tx, widget_rx) = unbounded();
    let runtimes = [
        SurfaceRuntime::new(surfaces.main, main_options, JsonViewSink::new(out.clone()))
            .spawn(main_rx),
        SurfaceRuntime::new(
            surfaces.widget,
            widget_options,
            JsonViewSink::new(out.clone()),
        )
        .spawn(widget_rx),
    ];

    let (core_tx, core_rx) = unbounded();
    let routes = FrontendRoutes {
        core: core_tx,
        main: main_tx.clone(),
        widget: widget_tx.clone(),
    };
    // Left detached: a blocked stdin read must not hold up exit.
    let _stdin_reader = spawn_stdin_reader(routes, out.clone());

    shell.run(&core_rx);

    for tx in [&main_tx, &widget_tx] {
        let _ = tx.send(SurfaceInput::Shutdown);
    }
    for handle in runtimes {
        if handle.join().is_err() {
            log_debug("surface runtime panicked during shutdown");
        }
    }
    supervisor.stop();
    out.emit(&ShellEvent::Shutdown {
        reason: "quit".to_string(),
    });
    log_debug("=== OKTrix shell exited ===");
    Ok(())
}
