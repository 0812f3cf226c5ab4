//! # Chambers Worker
//!
//! Runs the entitlement reconciler on a fixed interval: expiring add-on
//! grants, applying deferred downgrades, driving timer-based subscription
//! transitions, recomputing firm ceilings, and sending trial-ending alerts.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run -p chambers-worker
//! ```

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chambers_shared::db::pool::{create_pool, DatabaseConfig};
use chambers_shared::notify::LogSender;
use chambers_worker::scheduler::{ReconcilerScheduler, SchedulerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chambers_worker=info,chambers_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Chambers worker v{} starting...", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

    let pool = create_pool(DatabaseConfig {
        url: database_url,
        ..Default::default()
    })
    .await?;

    let sweep_interval_secs = std::env::var("RECONCILER_INTERVAL_SECS")
        .unwrap_or_else(|_| "3600".to_string())
        .parse::<u64>()?;

    let scheduler = ReconcilerScheduler::with_config(
        pool,
        Arc::new(LogSender),
        SchedulerConfig {
            sweep_interval_secs,
            ..Default::default()
        },
    );

    let shutdown_token = scheduler.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown_token.cancel();
        }
    });

    scheduler.run().await?;

    Ok(())
}
