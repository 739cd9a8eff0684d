//! Worker subprocess spawning.
//!
//! Workers are the `clusterd` binary itself, re-executed in `--internal-worker`
//! mode with stdin/stdout piped to the master for IPC.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;

use super::WorkerId;
use super::channel::{ReadySignal, WorkerChannel};
use super::signals::{TerminationReason, analyze_exit_status};
use crate::error::{ClusterError, Result};

/// Environment variable carrying the API username to workers.
pub const ENV_USERNAME: &str = "CLUSTERD_USERNAME";
/// Environment variable carrying the API password to workers.
pub const ENV_PASSWORD: &str = "CLUSTERD_PASSWORD";

/// Resolves when the worker terminates.
pub type ExitFuture = Pin<Box<dyn Future<Output = TerminationReason> + Send>>;

/// A freshly started worker that has not yet reported ready.
pub struct Launched {
    pub channel: WorkerChannel,
    pub ready: ReadySignal,
    pub pid: Option<u32>,
    pub exited: ExitFuture,
}

/// Starts workers on behalf of the supervisor.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self, id: WorkerId) -> Result<Launched>;
}

/// Configuration for worker processes.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Binary to execute (defaults to the current executable).
    pub exe: Option<PathBuf>,
    /// Each worker listens locally on `base_port + worker_id`.
    pub base_port: u16,
    /// Credentials for the worker's authorization check.
    pub username: String,
    pub password: String,
    /// Logging flags forwarded to workers (e.g., `-vv`, `--log-format json`).
    pub log_args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            exe: None,
            base_port: 4000,
            username: String::new(),
            password: String::new(),
            log_args: Vec::new(),
        }
    }
}

/// Local listener port for a worker.
pub fn worker_port(base_port: u16, id: WorkerId) -> Result<u16> {
    u16::try_from(id)
        .ok()
        .and_then(|id| base_port.checked_add(id))
        .ok_or_else(|| {
            ClusterError::Config(format!(
                "worker {} has no port: {} + {} exceeds 65535",
                id, base_port, id
            ))
        })
}

/// Launches real worker subprocesses.
pub struct ProcessLauncher {
    config: WorkerConfig,
}

impl ProcessLauncher {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, id: WorkerId) -> Result<Launched> {
        let port = worker_port(self.config.base_port, id)?;

        let exe_path = match &self.config.exe {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(|e| {
                ClusterError::Worker(format!("Failed to get current executable: {}", e))
            })?,
        };

        let mut cmd = Command::new(&exe_path);
        cmd.args(&self.config.log_args);
        cmd.arg("worker");
        cmd.arg("--internal-worker");
        cmd.arg("--worker-id").arg(id.to_string());
        cmd.arg("--port").arg(port.to_string());

        // Credentials travel through the environment so they stay out of `ps`.
        cmd.env(ENV_USERNAME, &self.config.username);
        cmd.env(ENV_PASSWORD, &self.config.password);

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ClusterError::Worker(format!("Failed to spawn worker {}: {}", id, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClusterError::Worker("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClusterError::Worker("Child stdout not captured".into()))?;

        let pid = child.id();
        let (channel, ready) = WorkerChannel::new(id, stdout, stdin);

        let exited: ExitFuture = Box::pin(async move {
            match child.wait().await {
                Ok(status) => analyze_exit_status(status),
                Err(_) => TerminationReason::Unknown,
            }
        });

        Ok(Launched {
            channel,
            ready,
            pid,
            exited,
        })
    }
}
