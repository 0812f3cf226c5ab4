/// Storage add-on attachments
///
/// An add-on is a supplementary, time-limited storage grant attached to a
/// firm. Active grants are summed into the firm's `max_storage_bytes` by the
/// limit recompute; the reconciler's entitlement pass marks lapsed grants
/// expired and triggers that recompute.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE addons (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     firm_id UUID NOT NULL REFERENCES firms(id) ON DELETE CASCADE,
///     status addon_status NOT NULL DEFAULT 'active',
///     storage_bytes BIGINT NOT NULL,
///     expires_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Lifecycle state of an add-on grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "addon_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AddOnStatus {
    /// Grant counts toward the firm's storage ceiling
    Active,

    /// Grant has lapsed and no longer counts
    Expired,
}

/// AddOn model: a time-limited storage grant
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AddOn {
    /// Unique add-on ID
    pub id: Uuid,

    /// Owning firm
    pub firm_id: Uuid,

    /// Lifecycle status
    pub status: AddOnStatus,

    /// Granted storage, in bytes
    pub storage_bytes: i64,

    /// When the grant lapses
    pub expires_at: DateTime<Utc>,

    /// When the grant was attached
    pub created_at: DateTime<Utc>,
}

impl AddOn {
    /// Attaches a new active grant to a firm
    pub async fn attach(
        pool: &PgPool,
        firm_id: Uuid,
        storage_bytes: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        let addon = sqlx::query_as::<_, AddOn>(
            r#"
            INSERT INTO addons (firm_id, storage_bytes, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, firm_id, status, storage_bytes, expires_at, created_at
            "#,
        )
        .bind(firm_id)
        .bind(storage_bytes)
        .bind(expires_at)
        .fetch_one(pool)
        .await?;

        Ok(addon)
    }

    /// Lists a firm's add-ons, newest first
    pub async fn list_by_firm(pool: &PgPool, firm_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let addons = sqlx::query_as::<_, AddOn>(
            r#"
            SELECT id, firm_id, status, storage_bytes, expires_at, created_at
            FROM addons
            WHERE firm_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(firm_id)
        .fetch_all(pool)
        .await?;

        Ok(addons)
    }

    /// Batch-expires all active grants whose expiry has passed
    ///
    /// Returns the distinct firms that were touched, so the caller can
    /// recompute their storage ceilings. Re-running is a no-op once the
    /// grants are marked expired, which is what makes the expiry pass
    /// idempotent.
    pub async fn expire_lapsed(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE addons
            SET status = 'expired'
            WHERE status = 'active' AND expires_at < $1
            RETURNING firm_id
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await?;

        let mut firm_ids: Vec<Uuid> = rows.into_iter().map(|(id,)| id).collect();
        firm_ids.sort();
        firm_ids.dedup();
        Ok(firm_ids)
    }

    /// Sums the active grants of a firm, in bytes
    pub async fn sum_active_storage(pool: &PgPool, firm_id: Uuid) -> Result<i64, sqlx::Error> {
        let (sum,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(storage_bytes), 0)
            FROM addons
            WHERE firm_id = $1 AND status = 'active'
            "#,
        )
        .bind(firm_id)
        .fetch_one(pool)
        .await?;

        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    // AddOn is pure persistence; its behavior is covered by the reconciler
    // unit tests (limit recompute) and the database integration tests.
}
