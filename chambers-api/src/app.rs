/// Application state and router builder
///
/// Defines the shared application state and assembles the Axum router with
/// all routes and middleware. Firm scoping is carried by the session
/// descriptor: authenticated routes operate on the firm named in the
/// caller's access token, never on a firm ID taken from the request body.
///
/// # Example
///
/// ```no_run
/// use chambers_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config)?;
/// let app = chambers_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Config;
use crate::middleware::rate_limit::{LocalRateLimitStore, RateLimitStore, RedisRateLimitStore};
use chambers_shared::auth::context::AuthContext;
use chambers_shared::auth::session;
use chambers_shared::authz::gate::{OwnershipStore, PgOwnershipStore};
use chambers_shared::billing::provider::{
    BillingProvider, HttpBillingProvider, MockBillingProvider,
};
use chambers_shared::quota::QuotaGuard;

/// Shared application state
///
/// Cloned per request via Axum's `State` extractor; everything inside is an
/// `Arc` or a pool handle, so clones are cheap.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Quota guard over the shared usage counters
    pub quota: Arc<QuotaGuard>,

    /// Ownership lookups for the resource gate
    pub ownership: Arc<dyn OwnershipStore>,

    /// Rate limit bucket store
    pub rate_limiter: Arc<dyn RateLimitStore>,

    /// Billing provider client
    pub billing: Arc<dyn BillingProvider>,
}

impl AppState {
    /// Creates new application state
    ///
    /// Picks the Redis rate-limit backend when configured; otherwise falls
    /// back to the in-process store, which is only sound for a
    /// single-instance deployment.
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let rate_limiter: Arc<dyn RateLimitStore> = match &config.rate_limit.redis_url {
            Some(url) => Arc::new(RedisRateLimitStore::new(url)?),
            None => {
                tracing::warn!(
                    "No REDIS_URL configured; using in-process rate limiting \
                     (not valid across multiple API instances)"
                );
                Arc::new(LocalRateLimitStore::new())
            }
        };

        let billing: Arc<dyn BillingProvider> =
            match (&config.billing.api_url, &config.billing.api_key) {
                (Some(url), Some(key)) => {
                    Arc::new(HttpBillingProvider::new(url.clone(), key.clone())?)
                }
                _ => {
                    tracing::warn!(
                        "No billing provider configured; using mock provider (development only)"
                    );
                    Arc::new(MockBillingProvider::new())
                }
            };

        Ok(Self {
            quota: Arc::new(QuotaGuard::postgres(db.clone())),
            ownership: Arc::new(PgOwnershipStore::new(db.clone())),
            rate_limiter,
            billing,
            db,
            config: Arc::new(config),
        })
    }

    /// Gets the session token signing secret
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                       # Health check (public)
/// └── /v1/
///     ├── /auth/
///     │   ├── POST /register        # New user + firm + trial subscription
///     │   ├── POST /login
///     │   ├── POST /refresh
///     │   └── POST /switch-firm     # Reissues the session descriptor
///     ├── /firm                     # Current firm info (authenticated)
///     ├── /members/...              # Seat-quota-gated membership ops
///     ├── /cases/...                # Resource-gated case ops
///     ├── /documents/...            # Storage-quota-gated document ops
///     └── /billing/
///         ├── POST /plan            # Plan change (upgrade/downgrade)
///         ├── POST /cancel          # Cancel the subscription
///         ├── POST /reactivate      # New subscription for a lapsed firm
///         └── POST /webhooks        # Billing provider events
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Public auth endpoints
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    // Firm switch needs a valid session but no firm-scoped checks
    let session_routes = Router::new()
        .route("/switch-firm", post(routes::auth::switch_firm))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session_auth_layer,
        ));

    // Firm-scoped operations: authentication, then plan-based rate limiting
    let firm_routes = Router::new()
        .route("/firm", get(routes::firm::get_firm))
        .route("/members", post(routes::members::add_member))
        .route(
            "/members/:user_id",
            axum::routing::delete(routes::members::remove_member),
        )
        .route(
            "/members/:user_id/role",
            axum::routing::patch(routes::members::change_role),
        )
        .route("/cases", post(routes::cases::create_case))
        .route("/cases/:case_id", get(routes::cases::get_case))
        .route(
            "/cases/:case_id",
            axum::routing::patch(routes::cases::update_case),
        )
        .route("/documents", post(routes::documents::register_document))
        .route(
            "/documents/:document_id",
            axum::routing::delete(routes::documents::delete_document),
        )
        .route("/billing/plan", post(routes::billing::change_plan))
        .route("/billing/cancel", post(routes::billing::cancel_subscription))
        .route("/billing/reactivate", post(routes::billing::reactivate))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::rate_limit_layer,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session_auth_layer,
        ));

    // Webhooks authenticate with the shared provider secret, not a session
    let webhook_routes = Router::new().route(
        "/billing/webhooks",
        post(routes::billing::ingest_webhook),
    );

    let v1_routes = Router::new()
        .nest("/auth", auth_routes.merge(session_routes))
        .merge(firm_routes)
        .merge(webhook_routes);

    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let security_layer = axum::middleware::from_fn_with_state(
        state.clone(),
        crate::middleware::security::security_headers,
    );

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(security_layer)
        .with_state(state)
}

/// Session authentication middleware
///
/// Validates the bearer token and injects the (user, firm) context into
/// request extensions.
async fn session_auth_layer(
    state: axum::extract::State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, crate::error::ApiError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            crate::error::ApiError::Unauthorized("Missing authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        crate::error::ApiError::BadRequest("Expected Bearer token".to_string())
    })?;

    let claims = session::validate_access_token(token, state.jwt_secret())?;

    req.extensions_mut()
        .insert(AuthContext::new(claims.sub, claims.firm_id));

    Ok(next.run(req).await)
}
