//! Publish seam between the forwarder and the broker.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::broker::BrokerError;

/// Destination for encoded notifications.
///
/// The forwarder owns its sink exclusively, so implementations take
/// `&mut self` and need no internal locking.
#[async_trait]
pub trait NotificationSink: Send {
    /// Wait until the sink can accept a publish.
    ///
    /// Returns `false` if `cancel` fires before the sink becomes usable.
    async fn ready(&mut self, _cancel: &CancellationToken) -> bool {
        true
    }

    /// Publish one message body under `routing_key` without waiting for a
    /// delivery confirmation.
    async fn publish(&mut self, routing_key: &str, body: &[u8]) -> Result<(), BrokerError>;

    /// Release any held resources.
    async fn close(&mut self) {}
}
