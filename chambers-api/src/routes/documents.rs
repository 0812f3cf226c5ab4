/// Document metadata endpoints
///
/// Registration is the storage-quota write path: the declared size is
/// reserved atomically before the metadata row exists, and deletion
/// releases exactly what the row holds. Byte transport happens elsewhere;
/// this system only accounts for it.
///
/// - `POST /v1/documents`: register an upload (reserves storage)
/// - `DELETE /v1/documents/:document_id`: delete (releases storage)

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
use chambers_shared::models::document::{CreateDocument, Document};

/// Register-document request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterDocumentRequest {
    /// File name
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    /// Declared size in bytes
    #[validate(range(min = 1, message = "Size must be positive"))]
    pub size_bytes: i64,

    /// Case to attach the document to
    pub case_id: Option<Uuid>,
}

/// `POST /v1/documents`
pub async fn register_document(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<RegisterDocumentRequest>,
) -> ApiResult<Json<Document>> {
    req.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    require_permission(&state.db, auth.user_id, auth.firm_id, PermissionKey::DocumentUpload)
        .await?;
    require_writable(&state.db, auth.firm_id).await?;

    // Atomic reserve: either the whole declared size fits or nothing is
    // committed
    state.quota.reserve_storage(auth.firm_id, req.size_bytes).await?;

    let document = match Document::create(
        &state.db,
        CreateDocument {
            firm_id: auth.firm_id,
            case_id: req.case_id,
            name: req.name,
            size_bytes: req.size_bytes,
            created_by: auth.user_id,
        },
    )
    .await
    {
        Ok(document) => document,
        Err(e) => {
            if let Err(release_err) = state
                .quota
                .release_storage(auth.firm_id, req.size_bytes)
                .await
            {
                tracing::error!(
                    firm_id = %auth.firm_id,
                    error = %release_err,
                    "Failed to release storage after document insert failure"
                );
            }
            return Err(e.into());
        }
    };

    Ok(Json(document))
}

/// `DELETE /v1/documents/:document_id`
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let access = resolve_access(&state.db, auth.user_id, auth.firm_id).await?;
    require_resource_permission(
        &access,
        state.ownership.as_ref(),
        auth.user_id,
        auth.firm_id,
        ResourceKind::Document,
        document_id,
        ResourceAction::Delete,
    )
    .await?;
    require_writable(&state.db, auth.firm_id).await?;

    let document = Document::delete(&state.db, auth.firm_id, document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    // Deletion frees capacity; no ceiling check applies
    state
        .quota
        .release_storage(auth.firm_id, document.size_bytes)
        .await?;

    Ok(Json(serde_json::json!({
        "deleted": true,
        "released_bytes": document.size_bytes,
    })))
}
