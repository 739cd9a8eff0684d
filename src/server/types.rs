//! Master response types.

use serde::{Deserialize, Serialize};

use crate::pool::{Worker, WorkerId};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"ok"` when every slot has a live worker, `"degraded"` otherwise.
    pub status: String,
    pub target_workers: usize,
    pub live_workers: usize,
    pub workers: Vec<WorkerStatus>,
}

/// One live worker as seen by the master.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub pid: Option<u32>,
    pub port: u16,
    /// Calls currently waiting on this worker.
    pub in_flight: usize,
}

impl From<&Worker> for WorkerStatus {
    fn from(worker: &Worker) -> Self {
        Self {
            id: worker.id(),
            pid: worker.pid(),
            port: worker.port(),
            in_flight: worker.channel().in_flight(),
        }
    }
}

impl HealthResponse {
    pub fn new(target_workers: usize, workers: Vec<WorkerStatus>) -> Self {
        let live_workers = workers.len();
        let status = if live_workers >= target_workers {
            "ok"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            target_workers,
            live_workers,
            workers,
        }
    }
}
