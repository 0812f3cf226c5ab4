/// Legal case model and database operations
///
/// Cases are the firm-scoped matter records that the resource permission
/// gate protects. Each case carries two ownership fields, `created_by` and
/// `assigned_to`, which back the `"own"` scope check for roles that may
/// only touch their own matters.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE cases (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     firm_id UUID NOT NULL REFERENCES firms(id) ON DELETE CASCADE,
///     title VARCHAR(255) NOT NULL,
///     client_name VARCHAR(255),
///     created_by UUID NOT NULL REFERENCES users(id),
///     assigned_to UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Legal case (matter) record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LegalCase {
    /// Unique case ID
    pub id: Uuid,

    /// Owning firm
    pub firm_id: Uuid,

    /// Matter title
    pub title: String,

    /// Client the matter is for
    pub client_name: Option<String>,

    /// Member who opened the case
    pub created_by: Uuid,

    /// Member currently assigned
    pub assigned_to: Option<Uuid>,

    /// When the case was opened
    pub created_at: DateTime<Utc>,

    /// When the case was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for opening a case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCase {
    /// Owning firm
    pub firm_id: Uuid,

    /// Matter title
    pub title: String,

    /// Client the matter is for
    pub client_name: Option<String>,

    /// Member opening the case
    pub created_by: Uuid,

    /// Initial assignee
    pub assigned_to: Option<Uuid>,
}

impl LegalCase {
    /// Opens a new case
    pub async fn create(pool: &PgPool, data: CreateCase) -> Result<Self, sqlx::Error> {
        let case = sqlx::query_as::<_, LegalCase>(
            r#"
            INSERT INTO cases (firm_id, title, client_name, created_by, assigned_to)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, firm_id, title, client_name, created_by, assigned_to,
                      created_at, updated_at
            "#,
        )
        .bind(data.firm_id)
        .bind(data.title)
        .bind(data.client_name)
        .bind(data.created_by)
        .bind(data.assigned_to)
        .fetch_one(pool)
        .await?;

        Ok(case)
    }

    /// Finds a case within a firm
    ///
    /// Scoped by firm so a stale or forged case ID from another tenant
    /// resolves to nothing.
    pub async fn find_in_firm(
        pool: &PgPool,
        firm_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let case = sqlx::query_as::<_, LegalCase>(
            r#"
            SELECT id, firm_id, title, client_name, created_by, assigned_to,
                   created_at, updated_at
            FROM cases
            WHERE firm_id = $1 AND id = $2
            "#,
        )
        .bind(firm_id)
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(case)
    }

    /// Updates title/client/assignee
    pub async fn update(
        pool: &PgPool,
        firm_id: Uuid,
        id: Uuid,
        title: Option<String>,
        client_name: Option<String>,
        assigned_to: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let case = sqlx::query_as::<_, LegalCase>(
            r#"
            UPDATE cases
            SET title = COALESCE($3, title),
                client_name = COALESCE($4, client_name),
                assigned_to = COALESCE($5, assigned_to),
                updated_at = NOW()
            WHERE firm_id = $1 AND id = $2
            RETURNING id, firm_id, title, client_name, created_by, assigned_to,
                      created_at, updated_at
            "#,
        )
        .bind(firm_id)
        .bind(id)
        .bind(title)
        .bind(client_name)
        .bind(assigned_to)
        .fetch_optional(pool)
        .await?;

        Ok(case)
    }

    /// Lists a firm's cases, newest first
    pub async fn list_by_firm(
        pool: &PgPool,
        firm_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let cases = sqlx::query_as::<_, LegalCase>(
            r#"
            SELECT id, firm_id, title, client_name, created_by, assigned_to,
                   created_at, updated_at
            FROM cases
            WHERE firm_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(firm_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(cases)
    }

    /// Deletes a case within a firm
    pub async fn delete(pool: &PgPool, firm_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cases WHERE firm_id = $1 AND id = $2")
            .bind(firm_id)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
