/// Firm model and database operations
///
/// This module provides the Firm model for multi-tenant isolation. Firms are
/// the unit of billing, membership, and resource quota: every case, document,
/// and invoice belongs to a firm, and all of them are gated by the firm's
/// subscription status and quota counters.
///
/// The usage counters (`current_users`, `storage_used_bytes`) and the
/// denormalized ceilings (`max_users`, `max_storage_bytes`) live directly on
/// the firm row so quota reservations can be expressed as a single
/// conditional UPDATE (see the `quota` module). A NULL ceiling means
/// unlimited.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE firms (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     subscription_status VARCHAR(50) NOT NULL DEFAULT 'trial',
///     plan_id UUID NOT NULL REFERENCES plans(id),
///     max_users INTEGER,
///     current_users INTEGER NOT NULL DEFAULT 0,
///     max_storage_bytes BIGINT,
///     storage_used_bytes BIGINT NOT NULL DEFAULT 0,
///     trial_ends_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use chambers_shared::models::firm::{Firm, CreateFirm};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, plan_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let firm = Firm::create(&pool, CreateFirm {
///     name: "Dewey & Howe LLP".to_string(),
///     plan_id,
///     max_users: Some(3),
///     max_storage_bytes: Some(3 * 1024 * 1024 * 1024),
///     trial_ends_at: None,
/// }).await?;
/// println!("Created firm: {}", firm.id);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::billing::state::SubscriptionStatus;

/// Firm model representing a tenant organization
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Firm {
    /// Unique firm ID (UUID v4)
    pub id: Uuid,

    /// Firm name
    pub name: String,

    /// Denormalized mirror of the subscription status
    ///
    /// Kept in lockstep with the subscriptions row by the state machine so
    /// the read-only gate is a single-row read on the hot path.
    pub subscription_status: String,

    /// Current billing plan
    pub plan_id: Uuid,

    /// Seat ceiling (NULL = unlimited)
    pub max_users: Option<i32>,

    /// Active memberships currently counted against the seat ceiling
    pub current_users: i32,

    /// Storage ceiling in bytes (NULL = unlimited)
    pub max_storage_bytes: Option<i64>,

    /// Storage currently reserved, in bytes
    pub storage_used_bytes: i64,

    /// When the firm's trial ends (None once converted)
    pub trial_ends_at: Option<DateTime<Utc>>,

    /// When the firm was created
    pub created_at: DateTime<Utc>,

    /// When the firm was last updated
    pub updated_at: DateTime<Utc>,
}

impl Firm {
    /// Gets the parsed subscription status
    ///
    /// Unknown values are treated as read-only, which fails closed.
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str(&self.subscription_status)
            .unwrap_or(SubscriptionStatus::ReadOnly)
    }
}

/// Input for creating a new firm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFirm {
    /// Firm name
    pub name: String,

    /// Initial billing plan
    pub plan_id: Uuid,

    /// Initial seat ceiling from the plan (NULL = unlimited)
    pub max_users: Option<i32>,

    /// Initial storage ceiling from the plan (NULL = unlimited)
    pub max_storage_bytes: Option<i64>,

    /// Trial end, for trial firms
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl Firm {
    /// Creates a new firm
    pub async fn create(pool: &PgPool, data: CreateFirm) -> Result<Self, sqlx::Error> {
        let firm = sqlx::query_as::<_, Firm>(
            r#"
            INSERT INTO firms (name, plan_id, max_users, max_storage_bytes, trial_ends_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, subscription_status, plan_id, max_users, current_users,
                      max_storage_bytes, storage_used_bytes, trial_ends_at,
                      created_at, updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.plan_id)
        .bind(data.max_users)
        .bind(data.max_storage_bytes)
        .bind(data.trial_ends_at)
        .fetch_one(pool)
        .await?;

        Ok(firm)
    }

    /// Finds a firm by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let firm = sqlx::query_as::<_, Firm>(
            r#"
            SELECT id, name, subscription_status, plan_id, max_users, current_users,
                   max_storage_bytes, storage_used_bytes, trial_ends_at,
                   created_at, updated_at
            FROM firms
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(firm)
    }

    /// Updates the denormalized subscription status mirror
    pub async fn set_subscription_status(
        pool: &PgPool,
        id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE firms SET subscription_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the firm's derived limits
    ///
    /// Used by plan upgrades and by the reconciler when it recomputes
    /// `max_storage_bytes` from the plan base plus active add-on grants.
    /// Never touches the usage counters.
    pub async fn update_limits(
        pool: &PgPool,
        id: Uuid,
        plan_id: Uuid,
        max_users: Option<i32>,
        max_storage_bytes: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE firms
            SET plan_id = $2, max_users = $3, max_storage_bytes = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(plan_id)
        .bind(max_users)
        .bind(max_storage_bytes)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clears the trial marker after conversion
    pub async fn clear_trial(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE firms SET trial_ends_at = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a firm by ID
    ///
    /// Cascades to memberships, cases, documents, and the subscription.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM firms WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_firm(status: &str) -> Firm {
        Firm {
            id: Uuid::new_v4(),
            name: "Test Firm".to_string(),
            subscription_status: status.to_string(),
            plan_id: Uuid::new_v4(),
            max_users: Some(5),
            current_users: 1,
            max_storage_bytes: Some(1_000_000),
            storage_used_bytes: 0,
            trial_ends_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(sample_firm("active").status(), SubscriptionStatus::Active);
        assert_eq!(sample_firm("trial").status(), SubscriptionStatus::Trial);
        assert_eq!(sample_firm("past_due").status(), SubscriptionStatus::PastDue);
    }

    #[test]
    fn test_unknown_status_fails_closed() {
        // A corrupt status must never open the write path
        let firm = sample_firm("garbage");
        assert_eq!(firm.status(), SubscriptionStatus::ReadOnly);
        assert!(firm.status().is_read_only());
    }

    // Integration tests for database operations are in tests/ with a live database
}
