/// Document metadata model
///
/// Only metadata lives here; the bytes themselves move through object
/// storage outside this system. `size_bytes` is what the quota guard
/// reserves on registration and releases on deletion, so the row is the
/// source of truth for how much of the firm's storage ceiling a document
/// holds.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE documents (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     firm_id UUID NOT NULL REFERENCES firms(id) ON DELETE CASCADE,
///     case_id UUID REFERENCES cases(id) ON DELETE SET NULL,
///     name VARCHAR(255) NOT NULL,
///     size_bytes BIGINT NOT NULL,
///     created_by UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Document metadata record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,

    /// Owning firm
    pub firm_id: Uuid,

    /// Case the document belongs to, if any
    pub case_id: Option<Uuid>,

    /// File name
    pub name: String,

    /// Size counted against the firm's storage quota
    pub size_bytes: i64,

    /// Member who uploaded it
    pub created_by: Uuid,

    /// When the document was registered
    pub created_at: DateTime<Utc>,
}

/// Input for registering a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocument {
    /// Owning firm
    pub firm_id: Uuid,

    /// Case to attach to
    pub case_id: Option<Uuid>,

    /// File name
    pub name: String,

    /// Declared size in bytes
    pub size_bytes: i64,

    /// Uploading member
    pub created_by: Uuid,
}

impl Document {
    /// Registers document metadata
    ///
    /// The caller must have reserved `size_bytes` through the quota guard
    /// first.
    pub async fn create(pool: &PgPool, data: CreateDocument) -> Result<Self, sqlx::Error> {
        let doc = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (firm_id, case_id, name, size_bytes, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, firm_id, case_id, name, size_bytes, created_by, created_at
            "#,
        )
        .bind(data.firm_id)
        .bind(data.case_id)
        .bind(data.name)
        .bind(data.size_bytes)
        .bind(data.created_by)
        .fetch_one(pool)
        .await?;

        Ok(doc)
    }

    /// Finds a document within a firm
    pub async fn find_in_firm(
        pool: &PgPool,
        firm_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let doc = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, firm_id, case_id, name, size_bytes, created_by, created_at
            FROM documents
            WHERE firm_id = $1 AND id = $2
            "#,
        )
        .bind(firm_id)
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(doc)
    }

    /// Deletes a document, returning its row so the caller can release the
    /// reserved storage
    pub async fn delete(
        pool: &PgPool,
        firm_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let doc = sqlx::query_as::<_, Document>(
            r#"
            DELETE FROM documents
            WHERE firm_id = $1 AND id = $2
            RETURNING id, firm_id, case_id, name, size_bytes, created_by, created_at
            "#,
        )
        .bind(firm_id)
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(doc)
    }

    /// Lists documents for a case
    pub async fn list_by_case(
        pool: &PgPool,
        firm_id: Uuid,
        case_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let docs = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, firm_id, case_id, name, size_bytes, created_by, created_at
            FROM documents
            WHERE firm_id = $1 AND case_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(firm_id)
        .bind(case_id)
        .fetch_all(pool)
        .await?;

        Ok(docs)
    }
}
