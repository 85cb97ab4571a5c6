// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup and shutdown.

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde_json::json;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};
use wd_adapters::{LlmClient, LlmError, OpenAiClient, OpenAiConfig, TracedLlm};
use wd_core::{names, Clock, IdGen, SystemClock, UuidIdGen};
use wd_engine::{
    EventBus, JobError, JobScheduler, Orchestrator, OrchestratorDeps, OrchestratorError,
    PolicyEngine, PolicyError, ToolRegistry,
};
use wd_storage::{JsonFileStorage, Storage, StorageError};

use crate::protocol::HANDLER_TIMEOUT;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/warden)
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Directory of the JSON table files
    pub data_dir: PathBuf,
    /// Path to the shared IPC token
    pub token_path: PathBuf,
    /// Model endpoint; `None` runs the built-in interpreter
    pub llm: Option<OpenAiConfig>,
    pub handler_timeout: Duration,
}

impl Config {
    /// Load configuration for the user-level daemon from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        let mut config = Self::for_state_dir(crate::env::state_dir()?);
        config.llm = match (crate::env::llm_url(), crate::env::llm_model()) {
            (Some(url), Some(model)) => {
                Some(OpenAiConfig::new(url, model).with_api_key(crate::env::llm_api_key()))
            }
            _ => None,
        };
        if let Some(timeout) = crate::env::handler_timeout() {
            config.handler_timeout = timeout;
        }
        Ok(config)
    }

    /// Fixed layout under `state_dir`, with no model configured.
    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            data_dir: state_dir.join("data"),
            token_path: state_dir.join("ipc.token"),
            llm: None,
            handler_timeout: HANDLER_TIMEOUT,
            state_dir,
        }
    }
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub orchestrator: Arc<Orchestrator>,
    /// Shared secret every connection must present
    pub token: String,
    pub start_time: Instant,
}

/// Result of daemon startup: the daemon state and the bound socket.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: UnixListener,
}

impl DaemonState {
    /// Announce shutdown, stop all jobs, and remove the socket and PID files.
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        self.orchestrator.bus().emit(
            names::DAEMON_SHUTDOWN,
            json!({ "uptime": self.start_time.elapsed().as_secs() }),
        );
        self.orchestrator.scheduler().shutdown();

        // Listener task stops when the tokio runtime exits
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            }
        }

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Model client error: {0}")]
    Model(#[from] LlmError),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock;
            // those files belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create state directory (needed for socket, lock, etc.)
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    // Use OpenOptions to avoid truncating the file before we hold the lock,
    // which would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Shared token
    let token = load_or_create_token(&config.token_path, crate::env::ipc_token())?;

    // 4. Storage, engine, and model client
    let storage: Arc<dyn Storage> = Arc::new(JsonFileStorage::open(&config.data_dir).await?);
    let llm: Option<Arc<dyn LlmClient>> = match &config.llm {
        Some(llm_config) => {
            info!(model = %llm_config.model, url = %llm_config.base_url, "using language model");
            Some(Arc::new(TracedLlm::new(OpenAiClient::new(
                llm_config.clone(),
            )?)))
        }
        None => {
            info!("no language model configured; using the built-in interpreter");
            None
        }
    };
    let orchestrator =
        build_orchestrator(storage, llm, Arc::new(SystemClock), Arc::new(UuidIdGen)).await?;

    // 5. Remove stale socket and bind (LAST - only after all validation passes)
    let listener = bind_socket(&config.socket_path)?;

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            orchestrator,
            token,
            start_time: Instant::now(),
        },
        listener,
    })
}

/// Wire the engine over `storage` and restore persisted jobs.
pub async fn build_orchestrator(
    storage: Arc<dyn Storage>,
    llm: Option<Arc<dyn LlmClient>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
) -> Result<Arc<Orchestrator>, LifecycleError> {
    let bus = EventBus::new(Arc::clone(&clock));
    let policy =
        PolicyEngine::init(bus.clone(), Arc::clone(&storage), Arc::clone(&ids)).await?;
    let scheduler = JobScheduler::new(
        bus.clone(),
        Arc::clone(&storage),
        Arc::clone(&clock),
        Arc::clone(&ids),
    );
    let orchestrator = Orchestrator::new(OrchestratorDeps {
        bus,
        storage,
        policy: Arc::new(policy),
        tools: ToolRegistry::new(),
        scheduler: scheduler.clone(),
        llm,
        clock,
        ids,
    })
    .await?;

    let restored = scheduler.rehydrate().await?;
    if restored > 0 {
        info!(restored, "restored stored tasks and skills (stopped until started)");
    }
    Ok(orchestrator)
}

/// Remove a stale socket file, bind, and restrict the socket to its owner.
pub fn bind_socket(path: &Path) -> Result<UnixListener, LifecycleError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener =
        UnixListener::bind(path).map_err(|e| LifecycleError::BindFailed(path.to_path_buf(), e))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// Use the override if given, else the token file, generating it on first run.
pub fn load_or_create_token(
    path: &Path,
    override_token: Option<String>,
) -> Result<String, LifecycleError> {
    if let Some(token) = override_token {
        return Ok(token);
    }
    if path.exists() {
        let token = std::fs::read_to_string(path)?.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
        warn!(path = %path.display(), "token file is empty; generating a new token");
    }

    let token = uuid::Uuid::new_v4().simple().to_string();
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    writeln!(file, "{token}")?;
    // `mode` only applies on creation
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    info!(path = %path.display(), "generated IPC token");
    Ok(token)
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }

    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
