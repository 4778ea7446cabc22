//! Queue module for the notification pipeline.
//!
//! This module provides:
//! - The notification message type
//! - The bounded in-memory buffer between intake and forwarding
//! - The RabbitMQ broker session the forwarder publishes through
//!
//! ## Architecture
//!
//! ```text
//! POST /notifications → BufferSender → BufferReceiver → Forwarder → Broker → exchange
//! ```

pub mod broker;
pub mod buffer;
pub mod sink;
pub mod types;

pub use broker::{Broker, BrokerError, BrokerSettings, ExchangeTopology, ReconnectPolicy};
pub use buffer::{channel, BufferReceiver, BufferSender, EnqueueError};
pub use sink::NotificationSink;
pub use types::{Build, Notification, CONTENT_TYPE_JSON, DEFAULT_EXCHANGE, DEFAULT_ROUTING_KEY};
