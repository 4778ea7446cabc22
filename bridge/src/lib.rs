//! Build notification bridge.
//!
//! Accepts CI build notifications over HTTP and forwards them to a RabbitMQ
//! exchange. A bounded in-memory buffer decouples the HTTP intake from the
//! broker, so a slow or unavailable broker never blocks the CI server.
//!
//! ## Architecture
//!
//! ```text
//! CI webhook → POST /notifications → buffer → Forwarder → Broker → exchange
//! ```

pub mod config;
pub mod forwarder;
pub mod queue;
pub mod stats;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use forwarder::Forwarder;
pub use queue::{
    Broker, BrokerError, BrokerSettings, BufferReceiver, BufferSender, Notification,
    NotificationSink,
};
pub use stats::{BridgeStats, StatsSnapshot};
pub use web::{router, AppState};
