//! Web server module for receiving build notifications.
//!
//! This module provides a thin, fast web server that:
//! - Receives build notifications from the CI server
//! - Decodes them and places them in the in-memory buffer
//! - Answers immediately, without touching the broker
//!
//! Publishing happens in the background forwarder.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{receive_notification, status, AppState};

/// Build the router for the intake and status endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/notifications", post(receive_notification))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
