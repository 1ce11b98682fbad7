//! financeTracker - Outbox Relay Worker
//!
//! Long-lived worker that drains the transactional outbox into Kafka.
//! The event store itself is a library consumed by the API edge; this
//! binary owns the delivery side.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finance_tracker::bus::KafkaEventPublisher;
use finance_tracker::outbox::{OutboxRelay, RelayScheduler};
use finance_tracker::{db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finance_tracker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting financeTracker outbox relay");

    let pool = db::create_pool(&config).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Schema is missing required tables. Run the migrations first.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database pool ready");

    let publisher = KafkaEventPublisher::from_config(&config)?;

    // In-process embedders share this handle with their EventStore so
    // appends cut publish latency; the standalone worker only polls.
    let wake = Arc::new(Notify::new());

    let relay = OutboxRelay::with_config(pool.clone(), publisher, config.relay_config());
    let scheduler = RelayScheduler::new(relay, config.outbox_poll_interval, wake);
    let handle = scheduler.start();

    shutdown_signal().await;

    tracing::info!("Relay shutting down...");
    handle.abort();
    let _ = handle.await;

    // Give an in-flight batch transaction a moment to unwind before the
    // pool closes its connections.
    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.close().await;
    tracing::info!("Outbox relay stopped");

    Ok(())
}

/// Wait for SIGINT or SIGTERM before stopping the relay
async fn shutdown_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl+C");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {
            tracing::info!("Ctrl+C received, stopping outbox relay...");
        },
        _ = sigterm => {
            tracing::info!("SIGTERM received, stopping outbox relay...");
        },
    }
}
