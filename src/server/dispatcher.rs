//! Routes inbound calls to workers.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::pool::{CallReply, IncomingCall, PoolRegistry, RoundRobin, SelectionPolicy, WorkerId};

/// Default time a worker has to answer a call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Picks a live worker for each call and waits for its correlated reply.
pub struct Dispatcher {
    registry: Arc<PoolRegistry>,
    policy: Box<dyn SelectionPolicy>,
    timeout: Duration,
}

impl Dispatcher {
    /// A round-robin dispatcher.
    pub fn new(registry: Arc<PoolRegistry>, timeout: Duration) -> Self {
        Self::with_policy(registry, Box::new(RoundRobin::new()), timeout)
    }

    pub fn with_policy(
        registry: Arc<PoolRegistry>,
        policy: Box<dyn SelectionPolicy>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            policy,
            timeout,
        }
    }

    /// Forward one call. No retry on another worker.
    ///
    /// # Errors
    ///
    /// - [`ClusterError::NoWorkersAvailable`] if the registry is empty
    /// - [`ClusterError::WorkerTimeout`] if the worker stays silent
    /// - [`ClusterError::WorkerCrash`] if the worker dies mid-call
    /// - [`ClusterError::WorkerFailed`] if the worker could not replay the call
    pub async fn dispatch(&self, call: IncomingCall) -> Result<(WorkerId, CallReply)> {
        let mut workers = self.registry.snapshot();
        // A dead worker may linger until the supervisor notices its exit.
        workers.retain(|w| !w.channel().is_closed());
        let worker = self
            .policy
            .select(&workers)
            .ok_or(ClusterError::NoWorkersAvailable)?;

        debug!(
            worker_id = worker.id(),
            method = %call.method,
            path = %call.path,
            "Dispatching call"
        );
        let reply = worker.channel().call(call, self.timeout).await?;
        Ok((worker.id(), reply))
    }
}
