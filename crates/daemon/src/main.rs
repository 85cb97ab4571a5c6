// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warden Daemon (wardend)
//!
//! Background process that owns the orchestrator, the job scheduler and the
//! policy engine, and serves them over a Unix socket.
//!
//! Architecture:
//! - Listener Task: accepts connections, authenticates them and dispatches requests
//! - Job drivers: one task per armed job, owned by the scheduler
//! - Main task: waits for a shutdown request or signal, then tears down

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::Path;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

use wd_daemon::lifecycle::{self, Config, LifecycleError, StartupResult};
use wd_daemon::listener::{DaemonCtx, Listener, ListenerConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("wardend {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("wardend {}", env!("CARGO_PKG_VERSION"));
                println!("Warden Daemon - operator control plane for agents, tasks and skills");
                println!();
                println!("USAGE:");
                println!("    wardend");
                println!();
                println!("Listens on <state_dir>/daemon.sock for newline-delimited JSON requests.");
                println!("Clients authenticate with the token in <state_dir>/ipc.token.");
                println!();
                println!("ENVIRONMENT:");
                println!("    WARDEN_STATE_DIR     State directory (default ~/.local/state/warden)");
                println!("    WARDEN_IPC_TOKEN     Shared token instead of the token file");
                println!("    WARDEN_LLM_URL       OpenAI-compatible endpoint");
                println!("    WARDEN_LLM_MODEL     Model name");
                println!("    WARDEN_LLM_API_KEY   Bearer token for the endpoint");
                println!("    RUST_LOG             Log filter (default info)");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: wardend [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Before tracing setup, so the marker precedes everything from this run
    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!("Starting warden daemon");

    let StartupResult {
        mut daemon,
        listener: unix_listener,
    } = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("wardend is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            // Tracing is non-blocking and may not flush before exit
            write_startup_error(&config, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let shutdown_notify = Arc::new(Notify::new());
    let ctx = Arc::new(DaemonCtx {
        orchestrator: Arc::clone(&daemon.orchestrator),
        start_time: daemon.start_time,
        shutdown: Arc::clone(&shutdown_notify),
    });
    let listener = Listener::new(
        unix_listener,
        ctx,
        ListenerConfig::new(daemon.token.clone()).handler_timeout(config.handler_timeout),
    );
    tokio::spawn(listener.run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        socket = %config.socket_path.display(),
        model = daemon.orchestrator.has_model(),
        "Daemon ready"
    );

    // Signal ready for the parent process
    println!("READY");

    tokio::select! {
        _ = shutdown_notify.notified() => info!("Shutdown requested via command"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
    }

    daemon.shutdown()?;
    info!("Daemon stopped");
    Ok(())
}

/// Rotate once the log passes this size.
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated files kept as `daemon.log.1` through `daemon.log.N`.
const MAX_ROTATIONS: u32 = 3;

/// Shift `log.1..log.N` up by one, dropping the oldest, and move the current
/// log to `log.1` if it is over [`MAX_LOG_SIZE`]. Failures are ignored.
fn rotate_log_if_needed(log_path: &Path) {
    let Ok(meta) = std::fs::metadata(log_path) else {
        return;
    };
    if meta.len() <= MAX_LOG_SIZE {
        return;
    }
    let rotated = |n: u32| {
        let mut name = log_path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        std::path::PathBuf::from(name)
    };
    for n in (1..MAX_ROTATIONS).rev() {
        let from = rotated(n);
        if from.exists() {
            let _ = std::fs::rename(&from, rotated(n + 1));
        }
    }
    let _ = std::fs::rename(log_path, rotated(1));
}

/// Startup marker prefix written to the log before anything else.
/// Full format: "--- wardend: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- wardend: starting (pid: ";

fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write a startup error synchronously so it is in the log even if the
/// process exits before the tracing writer flushes.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
