//! Worker lifecycle supervision.
//!
//! The supervisor keeps the registry converged to a fixed number of workers.
//! Each pool slot is a task that launches a worker, waits for it to report
//! ready, registers it, waits for it to exit, unregisters it, and starts over
//! with a fresh id. Failed starts are retried immediately with no backoff and
//! no retry cap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::WorkerId;
use super::registry::{PoolRegistry, Worker};
use super::spawn::{ExitFuture, Launched, Launcher};
use crate::error::{ClusterError, Result};

/// Configuration for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Number of workers to keep alive.
    pub target_workers: usize,
    /// How long a new worker may take to report ready.
    pub startup_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            target_workers: default_worker_count(),
            startup_timeout: Duration::from_secs(10),
        }
    }
}

/// Host CPU count, falling back to 4 when it cannot be determined.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

struct Shared<L> {
    registry: Arc<PoolRegistry>,
    launcher: L,
    config: SupervisorConfig,
    next_id: AtomicU32,
    stopping: AtomicBool,
}

/// Owns the pool slots. Dropping the supervisor aborts every slot, which kills
/// the worker processes.
pub struct Supervisor<L: Launcher> {
    shared: Arc<Shared<L>>,
    slots: JoinSet<()>,
}

impl<L: Launcher> Supervisor<L> {
    /// Spawn `config.target_workers` slots. Workers register as they become ready.
    pub fn start(registry: Arc<PoolRegistry>, launcher: L, config: SupervisorConfig) -> Self {
        info!(
            workers = config.target_workers,
            startup_timeout_ms = config.startup_timeout.as_millis() as u64,
            "Starting worker pool"
        );

        let shared = Arc::new(Shared {
            registry,
            launcher,
            config,
            next_id: AtomicU32::new(1),
            stopping: AtomicBool::new(false),
        });

        let mut slots = JoinSet::new();
        for slot in 0..shared.config.target_workers {
            slots.spawn(run_slot(shared.clone(), slot));
        }

        Self { shared, slots }
    }

    pub fn target_workers(&self) -> usize {
        self.shared.config.target_workers
    }

    /// Stop respawning, ask every live worker to exit, and wait up to `grace`
    /// before killing whatever is left.
    pub async fn shutdown(mut self, grace: Duration) {
        self.shared.stopping.store(true, Ordering::SeqCst);

        for worker in self.shared.registry.snapshot() {
            if let Err(e) = worker.channel().request_exit() {
                debug!(worker_id = worker.id(), error = %e, "Worker already gone");
            }
        }

        let registry = self.shared.registry.clone();
        if !registry.is_empty()
            && tokio::time::timeout(grace, registry.wait_until_empty())
                .await
                .is_err()
        {
            warn!(
                remaining = registry.len(),
                "Workers did not exit in time, killing them"
            );
        }
        self.slots.shutdown().await;
    }
}

#[instrument(level = "debug", skip(shared))]
async fn run_slot<L: Launcher>(shared: Arc<Shared<L>>, slot: usize) {
    loop {
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);

        match start_worker(&shared, id).await {
            Ok(exited) => {
                let reason = exited.await;
                shared.registry.remove(id);
                if shared.stopping.load(Ordering::SeqCst) {
                    debug!(worker_id = id, reason = %reason, "Worker stopped");
                    return;
                }
                if reason.is_success() {
                    info!(worker_id = id, "Worker {} exited", id);
                } else {
                    warn!(worker_id = id, reason = %reason, "Worker {} died", id);
                }
            }
            Err(e) => {
                if shared.stopping.load(Ordering::SeqCst) {
                    return;
                }
                warn!(worker_id = id, error = %e, "Worker failed to start");
            }
        }

        info!(slot, "Spawning replacement worker");
        tokio::task::yield_now().await;
    }
}

/// Launch one worker and register it once ready. Returns its exit future.
async fn start_worker<L: Launcher>(shared: &Shared<L>, id: WorkerId) -> Result<ExitFuture> {
    let Launched {
        channel,
        ready,
        pid,
        mut exited,
    } = shared.launcher.launch(id)?;

    let timeout = shared.config.startup_timeout;
    let info = tokio::select! {
        ready = tokio::time::timeout(timeout, ready) => match ready {
            Ok(Ok(info)) => info,
            Ok(Err(_)) => {
                return Err(ClusterError::Worker(format!(
                    "Worker {} closed its channel before ready",
                    id
                )));
            }
            Err(_) => {
                return Err(ClusterError::Worker(format!(
                    "Worker {} not ready within {}ms",
                    id,
                    timeout.as_millis()
                )));
            }
        },
        reason = &mut exited => {
            return Err(ClusterError::Worker(format!(
                "Worker {} {} before ready",
                id, reason
            )));
        }
    };

    if info.worker_id != id {
        return Err(ClusterError::Worker(format!(
            "Worker {} announced itself as {}",
            id, info.worker_id
        )));
    }

    shared
        .registry
        .insert(Arc::new(Worker::new(id, pid, info.port, channel)));
    info!(
        worker_id = id,
        pid = pid,
        port = info.port,
        "Worker {} running on port {}",
        id,
        info.port
    );

    Ok(exited)
}
