/// Case (matter) endpoints
///
/// Reads go through the resource gate; writes additionally pass the
/// subscription read-only check. The gate is what lets a role with an
/// `"own"`-scoped edit rule touch its own matters while everyone else
/// needs the firm-wide `case:edit` key.
///
/// - `POST /v1/cases`: open a case
/// - `GET /v1/cases/:case_id`: read a case
/// - `PATCH /v1/cases/:case_id`: edit a case

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use chambers_shared::auth::context::AuthContext;
use chambers_shared::authz::catalog::PermissionKey;
use chambers_shared::authz::gate::{
    require_resource_permission, ResourceAction, ResourceKind,
};
use chambers_shared::authz::resolver::{require_permission, resolve_access};
use chambers_shared::billing::state::require_writable;
use chambers_shared::models::case::{CreateCase, LegalCase};

/// Create-case request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCaseRequest {
    /// Matter title
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    /// Client the matter is for
    pub client_name: Option<String>,

    /// Member to assign
    pub assigned_to: Option<Uuid>,
}

/// `POST /v1/cases`
pub async fn create_case(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateCaseRequest>,
) -> ApiResult<Json<LegalCase>> {
    req.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    require_permission(&state.db, auth.user_id, auth.firm_id, PermissionKey::CaseCreate).await?;
    require_writable(&state.db, auth.firm_id).await?;

    let case = LegalCase::create(
        &state.db,
        CreateCase {
            firm_id: auth.firm_id,
            title: req.title,
            client_name: req.client_name,
            created_by: auth.user_id,
            assigned_to: req.assigned_to,
        },
    )
    .await?;

    Ok(Json(case))
}

/// `GET /v1/cases/:case_id`
pub async fn get_case(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(case_id): Path<Uuid>,
) -> ApiResult<Json<LegalCase>> {
    let access = resolve_access(&state.db, auth.user_id, auth.firm_id).await?;
    require_resource_permission(
        &access,
        state.ownership.as_ref(),
        auth.user_id,
        auth.firm_id,
        ResourceKind::Case,
        case_id,
        ResourceAction::View,
    )
    .await?;

    let case = LegalCase::find_in_firm(&state.db, auth.firm_id, case_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Case not found".to_string()))?;

    Ok(Json(case))
}

/// Update-case request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCaseRequest {
    /// New title
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    /// New client name
    pub client_name: Option<String>,

    /// New assignee
    pub assigned_to: Option<Uuid>,
}

/// `PATCH /v1/cases/:case_id`
pub async fn update_case(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(case_id): Path<Uuid>,
    Json(req): Json<UpdateCaseRequest>,
) -> ApiResult<Json<LegalCase>> {
    req.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let access = resolve_access(&state.db, auth.user_id, auth.firm_id).await?;
    require_resource_permission(
        &access,
        state.ownership.as_ref(),
        auth.user_id,
        auth.firm_id,
        ResourceKind::Case,
        case_id,
        ResourceAction::Edit,
    )
    .await?;
    require_writable(&state.db, auth.firm_id).await?;

    let case = LegalCase::update(
        &state.db,
        auth.firm_id,
        case_id,
        req.title,
        req.client_name,
        req.assigned_to,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Case not found".to_string()))?;

    Ok(Json(case))
}
