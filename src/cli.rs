//! Command-line interface definitions using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogFormat;
use crate::pool::{ENV_PASSWORD, ENV_USERNAME, WorkerId, default_worker_count};
use crate::server::DEFAULT_CALL_TIMEOUT;

/// Request router fronting a supervised pool of API worker processes.
#[derive(Parser, Debug)]
#[command(name = "clusterd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Also write logs to this file (rotated daily).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the master: spawn workers and route calls to them.
    Serve(ServeArgs),

    /// Run a single worker (started by the master, not by hand).
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Credentials every API call must present.
#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// Username accepted by the API.
    #[arg(long, env = ENV_USERNAME, default_value = "baxture")]
    pub username: String,

    /// Password accepted by the API.
    #[arg(long, env = ENV_PASSWORD, default_value = "ensuresers123", hide_env_values = true)]
    pub password: String,
}

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port for the master to listen on.
    #[arg(short, long, env = "CLUSTERD_PORT", default_value_t = 4000)]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "CLUSTERD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Workers listen on this port plus their id [default: --port].
    #[arg(long, env = "CLUSTERD_WORKER_BASE_PORT")]
    pub worker_base_port: Option<u16>,

    /// Number of worker processes.
    #[arg(short, long, env = "CLUSTERD_WORKERS", default_value_t = default_worker_count())]
    pub workers: usize,

    /// Milliseconds a worker has to answer a call.
    #[arg(
        long = "timeout",
        env = "CLUSTERD_TIMEOUT_MS",
        default_value_t = DEFAULT_CALL_TIMEOUT.as_millis() as u64
    )]
    pub timeout_ms: u64,

    /// Milliseconds a new worker has to report ready.
    #[arg(long = "startup-timeout", env = "CLUSTERD_STARTUP_TIMEOUT_MS", default_value_t = 10_000)]
    pub startup_timeout_ms: u64,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

impl ServeArgs {
    pub fn worker_base_port(&self) -> u16 {
        self.worker_base_port.unwrap_or(self.port)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

/// Arguments for the worker command.
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Guard against starting a worker by accident.
    #[arg(long, required = true)]
    pub internal_worker: bool,

    /// Identity assigned by the master.
    #[arg(long)]
    pub worker_id: WorkerId,

    /// Port for the worker's local listener.
    #[arg(long)]
    pub port: u16,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Verbosity level for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// -q: errors only.
    Quiet,
    /// Default: info and above.
    Normal,
    /// -v: include debug info (dispatch decisions, call ids).
    Debug,
    /// -vv: include protocol traffic.
    Trace,
}

impl Cli {
    /// Get the verbosity level based on -v and -q flags.
    pub fn verbosity(&self) -> Verbosity {
        match (self.quiet, self.verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            (false, 1) => Verbosity::Debug,
            (false, _) => Verbosity::Trace,
        }
    }

    /// Logging flags to pass on to worker processes.
    pub fn worker_log_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.quiet {
            args.push("-q".to_string());
        } else if self.verbose > 0 {
            args.push(format!("-{}", "v".repeat(self.verbose as usize)));
        }
        if let Some(format) = self.log_format {
            args.push("--log-format".to_string());
            args.push(format.to_string());
        }
        args
    }
}
