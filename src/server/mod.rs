//! Master HTTP front door.
//!
//! The master serves no business logic of its own: every call under `/api`
//! is handed to a worker through the [`Dispatcher`] and the worker's response
//! is relayed back unchanged.
//!
//! # Example
//!
//! ```bash
//! # Start a master with four workers
//! clusterd serve --port 4000 --workers 4
//!
//! # Call the API through the master
//! curl -u baxture:ensuresers123 http://localhost:4000/api/users
//!
//! # Inspect the pool
//! curl http://localhost:4000/health
//! ```

pub mod dispatcher;
pub mod handlers;
pub mod middleware;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{any, get},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use dispatcher::{DEFAULT_CALL_TIMEOUT, Dispatcher};

use crate::error::{ClusterError, Result};
use crate::pool::{PoolRegistry, ProcessLauncher, Supervisor, SupervisorConfig, WorkerConfig};

/// Largest request body the master will forward.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// How long workers get to exit on shutdown before they are killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Shared master state.
pub struct ServerState {
    pub registry: Arc<PoolRegistry>,
    pub dispatcher: Dispatcher,
    pub target_workers: usize,
}

impl ServerState {
    pub fn new(registry: Arc<PoolRegistry>, call_timeout: Duration, target_workers: usize) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry.clone(), call_timeout),
            registry,
            target_workers,
        }
    }
}

/// Master configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Workers listen locally on `worker_base_port + worker_id`.
    pub worker_base_port: u16,
    /// Number of workers to keep alive.
    pub workers: usize,
    /// How long a worker has to answer a call.
    pub call_timeout: Duration,
    /// How long a new worker has to report ready.
    pub startup_timeout: Duration,
    pub username: String,
    pub password: String,
    /// Logging flags passed on to worker processes.
    pub worker_log_args: Vec<String>,
}

/// Build the master router: `/api` forwarding plus `/health`.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api", any(handlers::forward))
        .route("/api/{*path}", any(handlers::forward))
        .fallback(handlers::route_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the worker pool and serve until interrupted.
///
/// The listener is bound before any worker is spawned, so a port conflict
/// fails fast.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    if config.workers == 0 {
        return Err(ClusterError::Config("--workers must be at least 1".into()));
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ClusterError::Config(format!("Failed to bind {}: {}", addr, e)))?;

    let registry = Arc::new(PoolRegistry::new());
    let launcher = ProcessLauncher::new(WorkerConfig {
        exe: None,
        base_port: config.worker_base_port,
        username: config.username.clone(),
        password: config.password.clone(),
        log_args: config.worker_log_args.clone(),
    });
    let supervisor = Supervisor::start(
        registry.clone(),
        launcher,
        SupervisorConfig {
            target_workers: config.workers,
            startup_timeout: config.startup_timeout,
        },
    );

    let state = Arc::new(ServerState::new(
        registry.clone(),
        config.call_timeout,
        supervisor.target_workers(),
    ));
    let app = build_router(state);

    info!(
        %addr,
        workers = config.workers,
        timeout_ms = config.call_timeout.as_millis() as u64,
        "Master {} is running on http://{}",
        std::process::id(),
        addr
    );

    let target = config.workers;
    let ready_registry = registry.clone();
    tokio::spawn(async move {
        ready_registry.wait_for_len(target).await;
        info!(workers = target, "All workers ready");
    });

    let result = tokio::select! {
        served = axum::serve(listener, app) => served.map_err(ClusterError::Io),
        _ = shutdown_signal() => {
            info!("Shutting down");
            Ok(())
        }
    };

    supervisor.shutdown(SHUTDOWN_GRACE).await;
    result
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
