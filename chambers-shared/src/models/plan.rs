/// Plan model: immutable billing reference data
///
/// Plans define the seat ceiling and the per-seat storage grant for a tier.
/// Rows are seeded by migration and never mutated at runtime; plan changes
/// re-point a firm's `plan_id`, they do not edit the plan.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE plans (
///     id UUID PRIMARY KEY,
///     name VARCHAR(100) NOT NULL UNIQUE,
///     tier VARCHAR(50) NOT NULL,
///     max_seats INTEGER,
///     storage_per_seat_bytes BIGINT NOT NULL,
///     price_cents INTEGER NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Plan tier, used for rate limiting and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Time-limited evaluation tier
    #[serde(rename = "trial")]
    Trial,

    /// Solo and small practices
    #[serde(rename = "starter")]
    Starter,

    /// Mid-size practices
    #[serde(rename = "practice")]
    Practice,

    /// Unlimited seats, custom pricing
    #[serde(rename = "enterprise")]
    Enterprise,
}

impl PlanTier {
    /// Tier string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Trial => "trial",
            PlanTier::Starter => "starter",
            PlanTier::Practice => "practice",
            PlanTier::Enterprise => "enterprise",
        }
    }

    /// Parses a tier from its stored string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(PlanTier::Trial),
            "starter" => Some(PlanTier::Starter),
            "practice" => Some(PlanTier::Practice),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }
}

/// Plan model: a priced tier defining seat and storage ceilings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plan {
    /// Plan ID (fixed UUIDs seeded by migration)
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Tier string (see [`PlanTier`])
    pub tier: String,

    /// Seat ceiling template (NULL = unlimited)
    pub max_seats: Option<i32>,

    /// Storage granted per seat, in bytes
    pub storage_per_seat_bytes: i64,

    /// Monthly price in cents
    pub price_cents: i32,

    /// When the row was seeded
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Gets the parsed tier, defaulting to trial
    pub fn get_tier(&self) -> PlanTier {
        PlanTier::from_str(&self.tier).unwrap_or(PlanTier::Trial)
    }

    /// Base storage ceiling for the plan (seats × per-seat grant)
    ///
    /// None (unlimited seats) yields an unlimited storage ceiling. Add-on
    /// grants are layered on top of this by the limit recompute.
    pub fn base_storage_bytes(&self) -> Option<i64> {
        self.max_seats
            .map(|seats| i64::from(seats) * self.storage_per_seat_bytes)
    }

    /// Finds a plan by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT id, name, tier, max_seats, storage_per_seat_bytes, price_cents, created_at
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(plan)
    }

    /// Finds the plan for a tier
    pub async fn find_by_tier(pool: &PgPool, tier: PlanTier) -> Result<Option<Self>, sqlx::Error> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT id, name, tier, max_seats, storage_per_seat_bytes, price_cents, created_at
            FROM plans
            WHERE tier = $1
            "#,
        )
        .bind(tier.as_str())
        .fetch_optional(pool)
        .await?;

        Ok(plan)
    }

    /// Lists all plans, cheapest first
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let plans = sqlx::query_as::<_, Plan>(
            r#"
            SELECT id, name, tier, max_seats, storage_per_seat_bytes, price_cents, created_at
            FROM plans
            ORDER BY price_cents ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan(max_seats: Option<i32>, per_seat: i64) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            name: "Starter".to_string(),
            tier: "starter".to_string(),
            max_seats,
            storage_per_seat_bytes: per_seat,
            price_cents: 4900,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tier_roundtrip() {
        for tier in [
            PlanTier::Trial,
            PlanTier::Starter,
            PlanTier::Practice,
            PlanTier::Enterprise,
        ] {
            assert_eq!(PlanTier::from_str(tier.as_str()), Some(tier));
        }
        assert_eq!(PlanTier::from_str("gold"), None);
    }

    #[test]
    fn test_base_storage() {
        let plan = sample_plan(Some(5), 10_000_000);
        assert_eq!(plan.base_storage_bytes(), Some(50_000_000));
    }

    #[test]
    fn test_unlimited_seats_means_unlimited_storage() {
        let plan = sample_plan(None, 10_000_000);
        assert_eq!(plan.base_storage_bytes(), None);
    }

    // Integration tests for database operations are in tests/ with a live database
}
