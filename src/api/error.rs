//! API error handling.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// API error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

/// API error type that converts to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 401 for missing or rejected credentials.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 404 Not Found.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let err = ApiError::not_found("User not found");
    /// assert_eq!(err.status, StatusCode::NOT_FOUND);
    /// ```
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    /// 413 when an inbound body exceeds the forwarding limit.
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 502 when a worker crashed or could not handle the call.
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// 503 when no worker can take the call.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// 504 when a worker did not answer in time.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }
}

impl IntoResponse for ApiError {
    /// Render as `{"message": ...}` with the error's status code.
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ClusterError> for ApiError {
    /// Map transport failures to gateway-style statuses:
    /// - `NoWorkersAvailable` -> 503
    /// - `WorkerTimeout` -> 504
    /// - `WorkerCrash` / `WorkerFailed` -> 502
    /// - everything else -> 500
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NoWorkersAvailable => ApiError::unavailable(err.to_string()),
            ClusterError::WorkerTimeout { .. } => ApiError::timeout(err.to_string()),
            ClusterError::WorkerCrash { .. } | ClusterError::WorkerFailed { .. } => {
                ApiError::bad_gateway(err.to_string())
            }
            _ => ApiError::internal(err.to_string()),
        }
    }
}
