//! Route definitions for the Field Health Analysis Platform

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/analysis", post(handlers::analyze_field))
        .nest("/fields", field_routes())
}

/// Observed field routes
fn field_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_field_statuses).put(handlers::set_observed_fields),
        )
        .route("/:field_id", get(handlers::get_field_status))
}
