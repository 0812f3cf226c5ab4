/// Firm membership endpoints
///
/// Membership mutations run the full entitlement pipeline in order:
/// permission check, subscription read-only gate, then the seat quota.
/// Adding a member reserves a seat atomically *before* the row is
/// inserted; if the insert fails the seat is released, so the counter
/// never drifts from the membership table by more than a logged anomaly.
///
/// - `POST /v1/members`: add an existing user to the firm
/// - `DELETE /v1/members/:user_id`: remove a member (releases the seat
///   and clears the member's active-firm pointer)
/// - `PATCH /v1/members/:user_id/role`: change a member's role

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use chambers_shared::auth::context::AuthContext;
use chambers_shared::authz::catalog::PermissionKey;
use chambers_shared::authz::resolver::require_permission;
use chambers_shared::billing::state::require_writable;
use chambers_shared::models::membership::{CreateMembership, Membership, MembershipStatus};
use chambers_shared::models::role::Role;
use chambers_shared::models::user::User;

/// Add-member request
#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    /// Email of an existing user to add
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Role to attach (defaults to the built-in attorney role)
    pub role_id: Option<Uuid>,
}

/// Membership response body
#[derive(Debug, Serialize)]
pub struct MemberResponse {
    /// Member's user ID
    pub user_id: Uuid,

    /// Firm ID
    pub firm_id: Uuid,

    /// Attached role
    pub role_id: Option<Uuid>,

    /// Membership status
    pub status: MembershipStatus,
}

impl From<Membership> for MemberResponse {
    fn from(m: Membership) -> Self {
        MemberResponse {
            user_id: m.user_id,
            firm_id: m.firm_id,
            role_id: m.role_id,
            status: m.status,
        }
    }
}

/// `POST /v1/members`
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<Json<MemberResponse>> {
    req.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // Pipeline: authorization, then eligibility, then capacity
    require_permission(&state.db, auth.user_id, auth.firm_id, PermissionKey::MemberInvite).await?;
    require_writable(&state.db, auth.firm_id).await?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No user with email {}", req.email)))?;

    if Membership::find(&state.db, user.id, auth.firm_id).await?.is_some() {
        return Err(ApiError::Conflict {
            code: "conflict",
            message: "User is already a member of this firm".to_string(),
        });
    }

    let role_id = match req.role_id {
        Some(role_id) => {
            let role = Role::find_by_id(&state.db, role_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;
            // Only this firm's roles or built-ins may be attached
            if role.firm_id.is_some() && role.firm_id != Some(auth.firm_id) {
                return Err(ApiError::NotFound("Role not found".to_string()));
            }
            Some(role.id)
        }
        None => Role::find_builtin(&state.db, "attorney").await?.map(|r| r.id),
    };

    // The seat reservation is the guarded mutation: it only succeeds if
    // capacity exists at commit time
    state.quota.reserve_seat(auth.firm_id).await?;

    let membership = match Membership::create(
        &state.db,
        CreateMembership {
            user_id: user.id,
            firm_id: auth.firm_id,
            role_id,
            status: MembershipStatus::Active,
        },
    )
    .await
    {
        Ok(membership) => membership,
        Err(e) => {
            // Give the seat back; the insert never happened
            if let Err(release_err) = state.quota.release_seat(auth.firm_id).await {
                tracing::error!(
                    firm_id = %auth.firm_id,
                    error = %release_err,
                    "Failed to release seat after membership insert failure"
                );
            }
            return Err(e.into());
        }
    };

    tracing::info!(firm_id = %auth.firm_id, user_id = %user.id, "Member added");

    Ok(Json(MemberResponse::from(membership)))
}

/// `DELETE /v1/members/:user_id`
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    require_permission(&state.db, auth.user_id, auth.firm_id, PermissionKey::MemberRemove).await?;
    require_writable(&state.db, auth.firm_id).await?;

    let removed = Membership::delete(&state.db, user_id, auth.firm_id).await?;
    if !removed {
        return Err(ApiError::NotFound("Membership not found".to_string()));
    }

    state.quota.release_seat(auth.firm_id).await?;

    // The removed member must not keep a session context for this firm
    User::clear_active_firm(&state.db, user_id, auth.firm_id).await?;

    tracing::info!(firm_id = %auth.firm_id, user_id = %user_id, "Member removed");

    Ok(Json(serde_json::json!({ "removed": true })))
}

/// Change-role request
#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    /// New role (None clears the firm role, falling back to global-role
    /// defaults)
    pub role_id: Option<Uuid>,
}

/// `PATCH /v1/members/:user_id/role`
pub async fn change_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<MemberResponse>> {
    require_permission(&state.db, auth.user_id, auth.firm_id, PermissionKey::MemberEditRole)
        .await?;
    require_writable(&state.db, auth.firm_id).await?;

    if let Some(role_id) = req.role_id {
        let role = Role::find_by_id(&state.db, role_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;
        if role.firm_id.is_some() && role.firm_id != Some(auth.firm_id) {
            return Err(ApiError::NotFound("Role not found".to_string()));
        }
    }

    let membership = Membership::update_role(&state.db, user_id, auth.firm_id, req.role_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Membership not found".to_string()))?;

    Ok(Json(MemberResponse::from(membership)))
}
