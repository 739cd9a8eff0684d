//! Worker process entry point.
//!
//! This module runs when `clusterd worker --internal-worker` is invoked by the
//! master. The worker serves the user API on a local port and, concurrently,
//! answers calls the master forwards over stdin/stdout.

mod endpoint;

pub use endpoint::serve_calls;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info};

use crate::api::{self, AppState, Credentials};
use crate::error::{ClusterError, Result};
use crate::pool::WorkerId;

/// Settings a worker is started with.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub worker_id: WorkerId,
    pub port: u16,
    pub credentials: Credentials,
}

/// Run the worker until the master closes the channel or asks it to exit.
///
/// Failing to bind the local listener is fatal: the worker exits before
/// announcing `ready`, and the master retries with a new worker.
pub async fn run_worker(options: WorkerOptions) -> Result<()> {
    serve_worker(options, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Bind the local listener, then answer calls arriving on `input`.
async fn serve_worker<R, W>(options: WorkerOptions, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let WorkerOptions {
        worker_id,
        port,
        credentials,
    } = options;

    let router = api::build_router(Arc::new(AppState::new(credentials)));

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        ClusterError::Worker(format!(
            "Worker {} failed to bind {}: {}",
            worker_id, addr, e
        ))
    })?;

    let local = router.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, local).await {
            error!(worker_id, error = %e, "Local listener stopped");
        }
    });
    info!(worker_id, %addr, "Worker listening");

    serve_calls(worker_id, port, router, input, output).await
}
