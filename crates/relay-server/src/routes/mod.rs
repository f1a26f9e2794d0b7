//! API routes

use axum::Router;

use crate::AppState;

mod servers;
mod tools;

/// Build the API router with all endpoints
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/servers", servers::router())
        .nest("/tools", tools::router())
}
