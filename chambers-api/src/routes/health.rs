/// Health check endpoint
///
/// Public, unauthenticated. Reports process liveness and database
/// reachability so load balancers can pull a bad instance.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::app::AppState;
use chambers_shared::db::pool;

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match pool::health_check(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "database": "unreachable",
                })),
            )
        }
    }
}
