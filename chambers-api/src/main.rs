//! # Chambers API Server
//!
//! HTTP surface of the legal-practice management platform. Every mutating
//! route runs the tenant entitlement pipeline: session authentication,
//! permission resolution, the subscription read-only gate, and atomic
//! quota reservations.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... JWT_SECRET=... cargo run -p chambers-api
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chambers_api::app::{build_router, AppState};
use chambers_api::config::Config;
use chambers_shared::db::migrations::run_migrations;
use chambers_shared::db::pool::{create_pool, DatabaseConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chambers_api=info,chambers_shared=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Chambers API v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;

    run_migrations(&pool).await?;

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let state = AppState::new(pool, config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
