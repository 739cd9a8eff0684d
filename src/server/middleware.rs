//! HTTP middleware for the master.
//!
//! Provides request correlation IDs that follow a call into its worker.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for request correlation IDs.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Middleware that gives every request an `X-Request-ID`.
///
/// A valid incoming header is kept; otherwise a UUIDv4 is generated and
/// written into the request headers, so it is forwarded to the worker along
/// with the rest of the call. The id is echoed in the response and recorded
/// on a tracing span covering the request.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = match request
        .headers()
        .get(&X_REQUEST_ID)
        .filter(|v| !v.is_empty())
    {
        Some(value) => value.clone(),
        None => {
            let generated = HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
            request
                .headers_mut()
                .insert(X_REQUEST_ID.clone(), generated.clone());
            generated
        }
    };

    let span = tracing::info_span!(
        "request",
        request_id = %String::from_utf8_lossy(request_id.as_bytes()),
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = next.run(request).instrument(span).await;
    response
        .headers_mut()
        .insert(X_REQUEST_ID.clone(), request_id);
    response
}
