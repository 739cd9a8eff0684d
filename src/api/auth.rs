//! HTTP Basic authorization against a single static credential pair.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::AppState;
use super::error::ApiError;

pub const MISSING_HEADER: &str = "Authorization header is missing";
pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// The username/password pair every request must present.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check an `Authorization` header value.
    ///
    /// A missing header and a rejected one produce different messages; every
    /// kind of rejection (wrong scheme, bad base64, wrong pair) looks the same.
    pub fn verify(&self, header: Option<&HeaderValue>) -> Result<(), ApiError> {
        let header = header.ok_or_else(|| ApiError::unauthorized(MISSING_HEADER))?;
        let (username, password) =
            decode_basic(header).ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

        let user_ok = constant_time_eq(&username, &self.username);
        let pass_ok = constant_time_eq(&password, &self.password);
        if user_ok & pass_ok {
            Ok(())
        } else {
            Err(ApiError::unauthorized(INVALID_CREDENTIALS))
        }
    }
}

/// Split `Basic base64(user:pass)` into its two halves.
fn decode_basic(header: &HeaderValue) -> Option<(String, String)> {
    let value = header.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(token.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Compare two strings without short-circuiting on the first differing byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Middleware rejecting requests that lack valid credentials.
pub async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(err) = state
        .credentials
        .verify(request.headers().get(header::AUTHORIZATION))
    {
        tracing::debug!(reason = %err.message, "Rejected request");
        return Err(err);
    }
    Ok(next.run(request).await)
}

/// Build an `Authorization` header value for the given pair.
#[cfg(test)]
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}
