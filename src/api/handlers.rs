//! HTTP request handlers for the user API.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};

use super::AppState;
use super::error::ApiError;
use super::types::{ApiResponse, User, UserInput};

const USER_NOT_FOUND: &str = "User not found";

fn parse_input(body: &Bytes) -> Result<UserInput, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

/// List every user.
pub async fn list_users(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<User>>> {
    let store = state.store.read().await;
    Json(ApiResponse::new(
        store.list().to_vec(),
        "Data received successfully",
    ))
}

/// Fetch one user by id.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let store = state.store.read().await;
    let user = store
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;
    Ok(Json(ApiResponse::new(user, "Data received successfully")))
}

/// Create a user from `{username, age, hobbies}`.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let input = parse_input(&body)?;
    let user = state.store.write().await.create(input);
    tracing::debug!(user_id = %user.id, "Created user");
    Ok(Json(ApiResponse::new(user, "User Created Successfully")))
}

/// Replace a user's fields.
///
/// An unknown id is reported before the body is looked at.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let mut store = state.store.write().await;
    if !store.contains(&id) {
        return Err(ApiError::not_found(USER_NOT_FOUND));
    }
    let input = parse_input(&body)?;
    let user = store
        .update(&id, input)
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;
    Ok(Json(ApiResponse::new(user, "User updated successfully")))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state
        .store
        .write()
        .await
        .delete(&id)
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;
    Ok(Json(ApiResponse::message("Record deleted successfully")))
}

/// Fallback for anything outside the user routes.
pub async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// Fallback for an unsupported method on a user route.
pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed("Method not allowed")
}
