//! Live view of the worker pool.
//!
//! The registry maps worker ids to workers. Only the supervisor mutates it;
//! the dispatcher takes a snapshot on every call.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;

use super::WorkerId;
use super::channel::WorkerChannel;

/// A running worker as seen by the master.
pub struct Worker {
    id: WorkerId,
    pid: Option<u32>,
    port: u16,
    channel: WorkerChannel,
}

impl Worker {
    pub fn new(id: WorkerId, pid: Option<u32>, port: u16, channel: WorkerChannel) -> Self {
        debug_assert_eq!(channel.worker_id(), id);
        Self {
            id,
            pid,
            port,
            channel,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// OS process id, if the worker is a real process.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Port of the worker's local debugging listener.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn channel(&self) -> &WorkerChannel {
        &self.channel
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("port", &self.port)
            .finish()
    }
}

/// Registry of live workers, ordered by id.
pub struct PoolRegistry {
    workers: RwLock<BTreeMap<WorkerId, Arc<Worker>>>,
    live: watch::Sender<usize>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(BTreeMap::new()),
            live: watch::Sender::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<WorkerId, Arc<Worker>>> {
        self.workers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<WorkerId, Arc<Worker>>> {
        self.workers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a worker. Replaces any entry with the same id.
    pub fn insert(&self, worker: Arc<Worker>) {
        let len = {
            let mut workers = self.write();
            workers.insert(worker.id(), worker);
            workers.len()
        };
        self.live.send_replace(len);
    }

    /// Remove a worker, returning it if it was present.
    pub fn remove(&self, id: WorkerId) -> Option<Arc<Worker>> {
        let (removed, len) = {
            let mut workers = self.write();
            let removed = workers.remove(&id);
            (removed, workers.len())
        };
        self.live.send_replace(len);
        removed
    }

    /// Live workers in id order.
    pub fn snapshot(&self) -> Vec<Arc<Worker>> {
        self.read().values().cloned().collect()
    }

    #[cfg(test)]
    pub fn get(&self, id: WorkerId) -> Option<Arc<Worker>> {
        self.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Wait until at least `count` workers are live.
    pub async fn wait_for_len(&self, count: usize) {
        self.wait_live(|len| len >= count).await;
    }

    /// Wait until no workers are live.
    pub async fn wait_until_empty(&self) {
        self.wait_live(|len| len == 0).await;
    }

    async fn wait_live(&self, mut done: impl FnMut(usize) -> bool) {
        let mut live = self.live.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed.
        let _ = live.wait_for(|len| done(*len)).await;
    }
}
