//! HTTP endpoint handlers.
//!
//! The intake handler only decodes the body and tries to buffer it. It never
//! waits on the broker: a full buffer is answered with 503 straight away.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::queue::{BufferSender, EnqueueError, Notification};
use crate::stats::BridgeStats;

/// Seconds a client is asked to wait after a 503.
const RETRY_AFTER_SECS: &str = "1";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub buffer: BufferSender,
    pub stats: Arc<BridgeStats>,
}

impl AppState {
    pub fn new(buffer: BufferSender, stats: Arc<BridgeStats>) -> Self {
        Self { buffer, stats }
    }
}

/// Liveness endpoint. Always 200 with an empty body.
pub async fn status() -> StatusCode {
    StatusCode::OK
}

/// Notification intake endpoint.
///
/// - 200 when the notification was buffered
/// - 400 when the body is not a notification
/// - 503 when the buffer is full or shutting down
pub async fn receive_notification(State(state): State<AppState>, body: Bytes) -> Response {
    let notification: Notification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            state.stats.record_decode_failed();
            warn!(
                error = %e,
                body_length = body.len(),
                body_preview = %String::from_utf8_lossy(&body[..body.len().min(200)]),
                "notification_decode_failed"
            );
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let name = notification.name.clone();
    let number = notification.build.number.clone();
    let phase = notification.build.phase.clone();

    match state.buffer.try_enqueue(notification) {
        Ok(()) => {
            state.stats.record_accepted();
            info!(
                name = %name,
                number = %number,
                phase = %phase,
                buffered = state.buffer.len(),
                "notification_enqueued"
            );
            StatusCode::OK.into_response()
        }
        Err(EnqueueError::Full(_)) => {
            state.stats.record_rejected_full();
            warn!(
                name = %name,
                number = %number,
                phase = %phase,
                capacity = state.buffer.capacity(),
                "notification_buffer_full"
            );
            service_unavailable()
        }
        Err(EnqueueError::Closed(_)) => {
            state.stats.record_rejected_closed();
            warn!(name = %name, number = %number, "notification_buffer_closed");
            service_unavailable()
        }
    }
}

fn service_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
    )
        .into_response()
}
