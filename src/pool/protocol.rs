//! IPC protocol for master/worker communication.
//!
//! Messages are JSON-serialized and newline-delimited. The master writes
//! [`WorkRequest`] lines to a worker's stdin; the worker writes
//! [`WorkResponse`] lines to its stdout.

use serde::{Deserialize, Serialize};

use super::WorkerId;

/// Correlation identifier for an in-flight call on one worker channel.
pub type CallId = u64;

/// An inbound HTTP call, serialized for replay inside a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Correlation id, echoed back in the matching response.
    pub id: CallId,
    /// HTTP method (e.g., "GET").
    pub method: String,
    /// Request path including the query string.
    pub path: String,
    /// Request headers in arrival order.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Request body.
    #[serde(default)]
    pub body: String,
}

/// Request from master to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkRequest {
    /// Replay an HTTP call through the worker's handlers.
    #[serde(rename = "call")]
    Call(CallEnvelope),

    /// Graceful shutdown request.
    #[serde(rename = "exit")]
    Exit,
}

/// Response from worker to master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkResponse {
    /// Worker is serving and ready for calls.
    #[serde(rename = "ready")]
    Ready {
        /// Identity the worker was started with.
        worker_id: WorkerId,
        /// Port of the worker's local listener.
        port: u16,
    },

    /// The handler produced a response.
    #[serde(rename = "result")]
    Result {
        /// Correlation id of the originating call.
        id: CallId,
        /// HTTP status code.
        status: u16,
        /// Response headers.
        #[serde(default)]
        headers: Vec<(String, String)>,
        /// Response body.
        #[serde(default)]
        body: String,
    },

    /// The call could not be replayed.
    #[serde(rename = "error")]
    Error {
        /// Correlation id of the originating call.
        id: CallId,
        /// Error message
        message: String,
    },
}

impl WorkRequest {
    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl WorkResponse {
    /// Create an error response for a call.
    pub fn error(id: CallId, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            message: message.into(),
        }
    }

    /// Correlation id of the call this response answers, if any.
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            Self::Result { id, .. } | Self::Error { id, .. } => Some(*id),
            Self::Ready { .. } => None,
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Best-effort recovery of the correlation id from a line that failed to parse.
pub fn salvage_call_id(line: &str) -> Option<CallId> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    value.get("id")?.as_u64()
}
