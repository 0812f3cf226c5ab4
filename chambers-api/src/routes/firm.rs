/// Current-firm endpoint
///
/// `GET /v1/firm` returns the session firm's profile, subscription status,
/// and quota usage. Reads are unguarded by the read-only gate (status
/// display must work precisely when the firm is locked out) but still
/// require an active membership.

use axum::{extract::State, Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use chambers_shared::auth::context::AuthContext;
use chambers_shared::authz::resolver::resolve;
use chambers_shared::models::firm::Firm;

/// Firm profile and usage response
#[derive(Debug, Serialize)]
pub struct FirmResponse {
    /// Firm ID
    pub id: Uuid,

    /// Firm name
    pub name: String,

    /// Subscription status string
    pub subscription_status: String,

    /// Whether mutating operations are currently blocked
    pub read_only: bool,

    /// Seat ceiling (null = unlimited)
    pub max_users: Option<i32>,

    /// Seats in use
    pub current_users: i32,

    /// Storage ceiling in bytes (null = unlimited)
    pub max_storage_bytes: Option<i64>,

    /// Storage in use, bytes
    pub storage_used_bytes: i64,

    /// The caller's effective permission keys in this firm
    pub permissions: Vec<String>,
}

/// `GET /v1/firm`
pub async fn get_firm(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<FirmResponse>> {
    // Membership check doubles as the permission resolution
    let permissions = resolve(&state.db, auth.user_id, auth.firm_id).await?;

    let firm = Firm::find_by_id(&state.db, auth.firm_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Firm not found".to_string()))?;

    let read_only = firm.status().is_read_only();

    Ok(Json(FirmResponse {
        id: firm.id,
        name: firm.name,
        subscription_status: firm.subscription_status,
        read_only,
        max_users: firm.max_users,
        current_users: firm.current_users,
        max_storage_bytes: firm.max_storage_bytes,
        storage_used_bytes: firm.storage_used_bytes,
        permissions: permissions.to_strings(),
    }))
}
