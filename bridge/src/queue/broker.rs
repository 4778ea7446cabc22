//! RabbitMQ session owning the notification exchange.
//!
//! The broker holds one connection and one channel, declares the durable
//! exchange on every (re)connect, and publishes fire-and-forget. It is owned
//! by the forwarder task alone, so there is no locking around the session.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::sink::NotificationSink;
use super::types::CONTENT_TYPE_JSON;
use crate::Config;

/// AMQP delivery mode for messages the broker need not persist.
const DELIVERY_MODE_TRANSIENT: u8 = 1;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to connect to RabbitMQ: {0}")]
    Connect(lapin::Error),

    #[error("failed to create channel: {0}")]
    Channel(lapin::Error),

    #[error("failed to declare exchange {exchange}: {source}")]
    DeclareExchange {
        exchange: String,
        source: lapin::Error,
    },

    #[error("failed to publish to exchange {exchange}: {source}")]
    Publish {
        exchange: String,
        source: lapin::Error,
    },

    #[error("no open broker session")]
    Disconnected,
}

// =============================================================================
// Settings
// =============================================================================

/// Exchange topologies the bridge can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeTopology {
    Fanout,
    Topic,
}

impl FromStr for ExchangeTopology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fanout" => Ok(ExchangeTopology::Fanout),
            "topic" => Ok(ExchangeTopology::Topic),
            other => Err(format!("unsupported exchange kind '{}'", other)),
        }
    }
}

impl fmt::Display for ExchangeTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeTopology::Fanout => f.write_str("fanout"),
            ExchangeTopology::Topic => f.write_str("topic"),
        }
    }
}

impl From<ExchangeTopology> for ExchangeKind {
    fn from(topology: ExchangeTopology) -> Self {
        match topology {
            ExchangeTopology::Fanout => ExchangeKind::Fanout,
            ExchangeTopology::Topic => ExchangeKind::Topic,
        }
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor per failed attempt
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay
    pub add_jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait after failed attempt number `attempt` (zero based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let mut backoff = Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()));

        if self.add_jitter {
            let jitter: f64 = rand::thread_rng().gen_range(0.0..=0.25);
            backoff = backoff.mul_f64(1.0 + jitter);
        }

        backoff.min(self.max_backoff)
    }
}

/// Everything needed to open a broker session.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub url: String,
    pub exchange: String,
    pub topology: ExchangeTopology,
    pub reconnect: ReconnectPolicy,
}

impl From<&Config> for BrokerSettings {
    fn from(config: &Config) -> Self {
        Self {
            url: config.amqp_url.clone(),
            exchange: config.exchange_name.clone(),
            topology: config.exchange_kind,
            reconnect: ReconnectPolicy {
                initial_backoff: config.reconnect_initial,
                max_backoff: config.reconnect_max,
                ..ReconnectPolicy::default()
            },
        }
    }
}

/// Properties attached to every published notification.
pub fn message_properties() -> BasicProperties {
    BasicProperties::default()
        .with_content_type(CONTENT_TYPE_JSON.into())
        .with_delivery_mode(DELIVERY_MODE_TRANSIENT)
        .with_priority(0)
}

// =============================================================================
// Broker
// =============================================================================

struct Session {
    connection: Connection,
    channel: Channel,
}

/// Owner of the RabbitMQ connection, channel, and exchange declaration.
pub struct Broker {
    settings: BrokerSettings,
    session: Option<Session>,
}

impl Broker {
    /// Create a broker with no open session (lazy connect).
    ///
    /// Nothing is contacted until the first [`NotificationSink::ready`],
    /// which opens the session under the reconnect policy. Use this instead
    /// of [`Broker::connect`] when the bridge should start serving before the
    /// broker is reachable.
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    /// Connect, open a channel, and declare the exchange.
    ///
    /// Any failure is returned to the caller; at startup it is fatal.
    pub async fn connect(settings: BrokerSettings) -> Result<Self, BrokerError> {
        let session = open_session(&settings).await?;
        Ok(Self {
            settings,
            session: Some(session),
        })
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Whether the channel is currently usable.
    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.channel.status().connected())
            .unwrap_or(false)
    }

    fn channel(&self) -> Result<&Channel, BrokerError> {
        match self.session.as_ref() {
            Some(session) if session.channel.status().connected() => Ok(&session.channel),
            _ => Err(BrokerError::Disconnected),
        }
    }
}

async fn open_session(settings: &BrokerSettings) -> Result<Session, BrokerError> {
    info!(url_length = settings.url.len(), "rabbitmq_connecting");

    let connection = Connection::connect(&settings.url, ConnectionProperties::default())
        .await
        .map_err(BrokerError::Connect)?;

    info!("rabbitmq_connected");

    let channel = connection
        .create_channel()
        .await
        .map_err(BrokerError::Channel)?;

    info!("rabbitmq_channel_created");

    channel
        .exchange_declare(
            &settings.exchange,
            settings.topology.into(),
            ExchangeDeclareOptions {
                durable: true,
                auto_delete: false,
                internal: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| BrokerError::DeclareExchange {
            exchange: settings.exchange.clone(),
            source,
        })?;

    info!(
        exchange = %settings.exchange,
        kind = %settings.topology,
        "rabbitmq_exchange_declared"
    );

    Ok(Session {
        connection,
        channel,
    })
}

#[async_trait]
impl NotificationSink for Broker {
    async fn ready(&mut self, cancel: &CancellationToken) -> bool {
        if self.is_connected() {
            return true;
        }

        if self.session.take().is_some() {
            warn!("rabbitmq_session_lost");
        }

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return false;
            }

            let opened = tokio::select! {
                _ = cancel.cancelled() => return false,
                opened = open_session(&self.settings) => opened,
            };

            match opened {
                Ok(session) => {
                    info!(attempts = attempt + 1, "rabbitmq_reconnected");
                    self.session = Some(session);
                    return true;
                }
                Err(e) => {
                    let delay = self.settings.reconnect.backoff_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "rabbitmq_reconnect_failed"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = sleep(delay) => {}
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn publish(&mut self, routing_key: &str, body: &[u8]) -> Result<(), BrokerError> {
        let channel = self.channel()?;

        // No confirm_select on this channel, so the returned confirm is not awaited.
        channel
            .basic_publish(
                &self.settings.exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                message_properties(),
            )
            .await
            .map_err(|source| BrokerError::Publish {
                exchange: self.settings.exchange.clone(),
                source,
            })?;

        Ok(())
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(e) = session.channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }

        if let Err(e) = session.connection.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_connection_close_error");
        }

        info!("rabbitmq_broker_closed");
    }
}
