//! Error types for clusterd.

use std::time::Duration;

use thiserror::Error;

use crate::pool::WorkerId;

/// Main error type for clusterd.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No workers available to handle the request")]
    NoWorkersAvailable,

    #[error("Worker {worker_id} did not respond within {}ms", timeout.as_millis())]
    WorkerTimeout { worker_id: WorkerId, timeout: Duration },

    #[error("Worker {worker_id} terminated before responding")]
    WorkerCrash { worker_id: WorkerId },

    #[error("Worker {worker_id} failed to handle the request: {message}")]
    WorkerFailed { worker_id: WorkerId, message: String },
}

/// Result type alias for clusterd operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
