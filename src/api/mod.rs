//! User CRUD API served by every worker.
//!
//! The same [`Router`] answers both the worker's local listener and calls
//! replayed from the master, so the two paths cannot drift apart.
//!
//! # Routes
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/api/users` | list |
//! | POST | `/api/users` | create |
//! | GET | `/api/users/{id}` | fetch |
//! | PUT | `/api/users/{id}` | replace |
//! | DELETE | `/api/users/{id}` | delete |
//!
//! All of them require HTTP Basic credentials. Anything else is a 404.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod store;
pub mod types;

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub use auth::Credentials;
pub use error::ApiError;
pub use store::UserStore;

/// Shared state of one worker's API.
pub struct AppState {
    pub store: RwLock<UserStore>,
    pub credentials: Credentials,
}

impl AppState {
    /// State with the seeded user list.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_store(credentials, UserStore::seeded())
    }

    pub fn with_store(credentials: Credentials, store: UserStore) -> Self {
        Self {
            store: RwLock::new(store),
            credentials,
        }
    }
}

/// Build the API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/users",
            get(handlers::list_users)
                .post(handlers::create_user)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user)
                .fallback(handlers::method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ))
        .fallback(handlers::route_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
