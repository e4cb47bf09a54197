//! tallyd
//!
//! Moves ledger events from the outbox table to the message broker until
//! Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tally_db::{OutboxRepository, connect};
use tally_relay::{Broker, InMemoryBroker, OutboxRelay, RedisStreamsBroker};
use tally_shared::AppConfig;
use tally_shared::config::{BrokerConfig, BrokerKind, LogFormat, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    let db = connect(&config.database)
        .await
        .context("failed to connect to database")?;
    info!("Connected to database");

    let broker = build_broker(&config.broker)?;
    let relay = OutboxRelay::from_config(
        Arc::new(OutboxRepository::new(db)),
        broker,
        &config.relay,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    relay.run(cancel).await;
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn build_broker(config: &BrokerConfig) -> anyhow::Result<Arc<dyn Broker>> {
    match config.kind {
        BrokerKind::Redis => {
            let broker = RedisStreamsBroker::new(&config.url, config.stream_max_len)
                .context("invalid broker configuration")?;
            info!(max_len = ?config.stream_max_len, "Publishing to Redis Streams");
            Ok(Arc::new(broker))
        }
        BrokerKind::Memory => {
            tracing::warn!("Using in-memory broker; events are not delivered anywhere");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
