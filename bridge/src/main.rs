//! Build notification bridge - HTTP intake in front of a RabbitMQ exchange.
//!
//! This binary:
//! - Loads and validates configuration from the environment
//! - Connects to RabbitMQ and declares the notification exchange
//! - Starts the forwarder that publishes buffered notifications
//! - Serves the intake and status endpoints until SIGINT/SIGTERM
//!
//! Configuration and broker setup failures abort startup before the
//! listener is bound.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notify_bridge::queue;
use notify_bridge::{router, AppState, BridgeStats, Broker, BrokerSettings, Config, Forwarder};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("bridge_starting");

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        port = config.port,
        queue_size = config.queue_size.get(),
        exchange = %config.exchange_name,
        exchange_kind = %config.exchange_kind,
        routing_key = %config.routing_key,
        "config_loaded"
    );

    let broker = Broker::connect(BrokerSettings::from(&config))
        .await
        .context("Failed to set up RabbitMQ exchange")?;
    info!(exchange = %broker.settings().exchange, "rabbitmq_broker_ready");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let stats = Arc::new(BridgeStats::new());
    let (buffer, receiver) = queue::channel(config.queue_size);
    let cancel = CancellationToken::new();

    let forwarder = Forwarder::new(
        receiver,
        broker,
        config.routing_key.clone(),
        Arc::clone(&stats),
        cancel.clone(),
    );
    let forwarder = tokio::spawn(forwarder.run());

    let app = router(AppState::new(buffer, Arc::clone(&stats)));

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Intake is closed; let the forwarder drain and close the broker
    cancel.cancel();
    if let Err(e) = forwarder.await {
        error!(error = %e, "forwarder_task_failed");
    }

    let snapshot = stats.snapshot();
    info!(
        accepted = snapshot.accepted,
        rejected_full = snapshot.rejected_full,
        rejected_closed = snapshot.rejected_closed,
        decode_failed = snapshot.decode_failed,
        published = snapshot.published,
        publish_failed = snapshot.publish_failed,
        encode_failed = snapshot.encode_failed,
        abandoned = snapshot.abandoned,
        "bridge_stats"
    );

    served.context("Server error")?;

    info!("bridge_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("bridge_shutting_down");
}
