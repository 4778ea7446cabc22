//! Forwarding loop draining the notification buffer into the broker.
//!
//! One forwarder task runs for the lifetime of the process. It takes the
//! oldest buffered notification, waits until the sink has a session,
//! encodes the notification as JSON, and publishes it once. Failed publishes
//! are logged, counted, and dropped so one bad message never stalls the
//! pipeline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::queue::{BufferReceiver, Notification, NotificationSink};
use crate::stats::BridgeStats;

/// Single consumer of the notification buffer.
pub struct Forwarder<S> {
    receiver: BufferReceiver,
    sink: S,
    routing_key: String,
    stats: Arc<BridgeStats>,
    cancel: CancellationToken,
}

impl<S: NotificationSink> Forwarder<S> {
    pub fn new(
        receiver: BufferReceiver,
        sink: S,
        routing_key: impl Into<String>,
        stats: Arc<BridgeStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            sink,
            routing_key: routing_key.into(),
            stats,
            cancel,
        }
    }

    /// Run until every producer is gone or `cancel` fires.
    ///
    /// On cancellation the notifications already buffered get one publish
    /// attempt each. The sink is closed and handed back when the loop ends.
    pub async fn run(mut self) -> S {
        info!(routing_key = %self.routing_key, "forwarder_started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("forwarder_stopping");
                    self.drain().await;
                    break;
                }
                next = self.receiver.dequeue() => {
                    match next {
                        Some(notification) => self.forward(notification).await,
                        None => {
                            info!("forwarder_buffer_closed");
                            break;
                        }
                    }
                }
            }
        }

        self.sink.close().await;
        info!("forwarder_stopped");

        self.sink
    }

    /// Publish whatever is still buffered without waiting for a reconnect.
    async fn drain(&mut self) {
        self.receiver.close();

        let mut drained: u64 = 0;
        while let Some(notification) = self.receiver.try_dequeue() {
            drained += 1;
            self.forward(notification).await;
        }

        info!(drained = drained, "forwarder_drained");
    }

    async fn forward(&mut self, notification: Notification) {
        if !self.sink.ready(&self.cancel).await {
            self.stats.record_abandoned();
            warn!(
                name = %notification.name,
                number = %notification.build.number,
                phase = %notification.build.phase,
                "notification_abandoned"
            );
            return;
        }

        let body = match serde_json::to_vec(&notification) {
            Ok(body) => body,
            Err(e) => {
                self.stats.record_encode_failed();
                error!(
                    name = %notification.name,
                    number = %notification.build.number,
                    error = %e,
                    "notification_encode_failed"
                );
                return;
            }
        };

        match self.sink.publish(&self.routing_key, &body).await {
            Ok(()) => {
                self.stats.record_published();
                info!(
                    routing_key = %self.routing_key,
                    name = %notification.name,
                    number = %notification.build.number,
                    phase = %notification.build.phase,
                    body_length = body.len(),
                    "notification_published"
                );
            }
            Err(e) => {
                self.stats.record_publish_failed();
                error!(
                    routing_key = %self.routing_key,
                    name = %notification.name,
                    number = %notification.build.number,
                    error = %e,
                    "notification_publish_failed"
                );
            }
        }
    }
}
