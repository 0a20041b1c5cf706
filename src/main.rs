//! ShaderSync - live configuration sync, headless host
//!
//! Main entry point for running the sync engine outside an editor.
//!
//! # Overview
//!
//! This binary plays the part of the host editor. It initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime (the remote connection lives here)
//! - Engine settings ([`EngineSettings`], `shadersync.yaml` + `SHADERSYNC_*` env vars)
//! - The sync engine ([`SyncEngine`]) with a [`HeadlessHost`]
//!
//! The main thread then behaves like a cooperative editor loop: it sends an
//! idle tick every 100 ms until Ctrl-C, then runs the teardown hook.
//!
//! # Execution Flow
//!
//! 1. Load settings (writing a template `shadersync.yaml` on first run)
//! 2. Initialize logging → logs/shadersync.<date>
//! 3. Create tokio runtime with 2 worker threads
//! 4. Start the engine (loads the backing file, connects)
//! 5. Tick until Ctrl-C
//! 6. Engine shutdown (cancel, drain, final flush)
//! 7. Shutdown tokio runtime with 5s timeout
//!
//! Pass `--debug` for debug-level logging.

use anyhow::Result;
use camino::Utf8Path;
use shadersync::{APP_NAME, EngineSettings, HeadlessHost, HostEvent, SyncEngine, VERSION};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const SETTINGS_FILE: &str = "shadersync.yaml";
const TICK_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let debug_mode = std::env::args().skip(1).any(|arg| arg == "--debug");

    // Guard must outlive everything that logs
    let _log_guard =
        shadersync::logging::setup_logging_with_console("logs", "shadersync", debug_mode, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let settings_path = Utf8Path::new(SETTINGS_FILE);
    let settings = EngineSettings::load(settings_path)?;
    if !settings_path.exists() {
        settings.write_template(settings_path)?;
    }

    tracing::info!(
        "Settings loaded - endpoint: {}, backing file: {}",
        settings.endpoint,
        settings.backing_file
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("shadersync-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 2);

    let stop_requested = Arc::new(AtomicBool::new(false));
    {
        let stop_requested = Arc::clone(&stop_requested);
        runtime.spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Ctrl-C received"),
                Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
            }
            stop_requested.store(true, Ordering::SeqCst);
        });
    }

    let host = Arc::new(HeadlessHost);
    let engine = SyncEngine::new(settings, runtime.handle().clone(), host.clone(), host);
    engine.start()?;

    // Cooperative main loop
    while !stop_requested.load(Ordering::SeqCst) {
        engine.on_host_event(HostEvent::IdleTick, Instant::now());
        std::thread::sleep(TICK_INTERVAL);
    }

    engine.on_host_event(HostEvent::ShuttingDown, Instant::now());

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    Ok(())
}
