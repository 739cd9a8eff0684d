//! HTTP request handlers for the master.

use std::sync::Arc;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::Response,
};
use tracing::{debug, instrument};

use super::ServerState;
use super::types::{HealthResponse, WorkerStatus};
use crate::api::ApiError;
use crate::pool::{CallReply, IncomingCall};

/// Headers that describe a single hop and are not forwarded either way.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

/// Forward an `/api` call to a worker and relay its response.
pub async fn forward(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(format!(
                "Request body exceeds {} bytes",
                super::MAX_BODY_BYTES
            ))
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })?;

    let call = IncomingCall {
        method: method.to_string(),
        path: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers: headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name))
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };

    let (worker_id, reply) = state.dispatcher.dispatch(call).await?;
    debug!(worker_id, status = reply.status, "Worker replied");
    into_response(reply)
}

fn into_response(reply: CallReply) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(reply.status).map_err(|_| {
        ApiError::bad_gateway(format!("Worker returned invalid status {}", reply.status))
    })?;

    let mut response = Response::new(Body::from(reply.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in reply.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            debug!(header = %name, "Dropping invalid header from worker");
            continue;
        };
        if !is_hop_by_hop(&name) {
            headers.append(name, value);
        }
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }

    Ok(response)
}

/// Pool status.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let workers = state
        .registry
        .snapshot()
        .iter()
        .map(|w| WorkerStatus::from(w.as_ref()))
        .collect();
    Json(HealthResponse::new(state.target_workers, workers))
}

/// Fallback for paths outside `/api` and `/health`.
pub async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
