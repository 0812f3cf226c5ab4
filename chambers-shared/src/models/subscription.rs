/// Subscription model and database operations
///
/// One subscription row per firm. The `status` field is the authoritative
/// copy of the subscription state machine's state; the firm row carries a
/// denormalized mirror for the hot-path read-only check, and the two are
/// updated together by `billing::state::apply_event`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE subscriptions (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     firm_id UUID NOT NULL UNIQUE REFERENCES firms(id) ON DELETE CASCADE,
///     plan_id UUID NOT NULL REFERENCES plans(id),
///     status VARCHAR(50) NOT NULL DEFAULT 'trial',
///     current_period_start TIMESTAMPTZ,
///     current_period_end TIMESTAMPTZ,
///     trial_ends_at TIMESTAMPTZ,
///     canceled_at TIMESTAMPTZ,
///     downgrade_to_plan_id UUID REFERENCES plans(id),
///     provider_ref VARCHAR(255),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Deferred Downgrades
///
/// A downgrade never changes limits mid-period: it only records
/// `downgrade_to_plan_id`, and the reconciler applies it once
/// `current_period_end` has passed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::billing::state::SubscriptionStatus;

/// Subscription model (1:1 with firms)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    /// Unique subscription ID
    pub id: Uuid,

    /// Owning firm
    pub firm_id: Uuid,

    /// Current billing plan
    pub plan_id: Uuid,

    /// State machine status (see [`SubscriptionStatus`])
    pub status: String,

    /// Start of the current billing period
    pub current_period_start: Option<DateTime<Utc>>,

    /// End of the current billing period
    pub current_period_end: Option<DateTime<Utc>>,

    /// When the trial ends (trial subscriptions only)
    pub trial_ends_at: Option<DateTime<Utc>>,

    /// When the subscription was canceled
    pub canceled_at: Option<DateTime<Utc>>,

    /// Deferred plan change applied at period end (None = no change pending)
    pub downgrade_to_plan_id: Option<Uuid>,

    /// Billing provider's subscription reference
    pub provider_ref: Option<String>,

    /// When the row was created
    pub created_at: DateTime<Utc>,

    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Gets the parsed status
    ///
    /// Unknown values are treated as read-only, which fails closed.
    pub fn get_status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str(&self.status).unwrap_or(SubscriptionStatus::ReadOnly)
    }

    /// Reference instant for the post-resolution grace window
    ///
    /// Grace runs from cancellation for canceled subscriptions, from the
    /// period end for past-due ones, and from the trial end for expired
    /// trials.
    pub fn grace_reference(&self) -> Option<DateTime<Utc>> {
        self.canceled_at
            .or(self.current_period_end)
            .or(self.trial_ends_at)
    }
}

/// Input for creating a subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscription {
    /// Owning firm
    pub firm_id: Uuid,

    /// Billing plan
    pub plan_id: Uuid,

    /// Initial status
    pub status: SubscriptionStatus,

    /// Billing period start
    pub current_period_start: Option<DateTime<Utc>>,

    /// Billing period end
    pub current_period_end: Option<DateTime<Utc>>,

    /// Trial end (trial subscriptions)
    pub trial_ends_at: Option<DateTime<Utc>>,

    /// Billing provider reference
    pub provider_ref: Option<String>,
}

const SELECT_COLUMNS: &str = "id, firm_id, plan_id, status, current_period_start, \
     current_period_end, trial_ends_at, canceled_at, downgrade_to_plan_id, provider_ref, \
     created_at, updated_at";

impl Subscription {
    /// Creates a subscription for a firm
    pub async fn create(pool: &PgPool, data: CreateSubscription) -> Result<Self, sqlx::Error> {
        let sub = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions
                (firm_id, plan_id, status, current_period_start, current_period_end,
                 trial_ends_at, provider_ref)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SELECT_COLUMNS}
            "#,
        ))
        .bind(data.firm_id)
        .bind(data.plan_id)
        .bind(data.status.as_str())
        .bind(data.current_period_start)
        .bind(data.current_period_end)
        .bind(data.trial_ends_at)
        .bind(data.provider_ref)
        .fetch_one(pool)
        .await?;

        Ok(sub)
    }

    /// Finds the subscription of a firm
    pub async fn find_by_firm(pool: &PgPool, firm_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let sub = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions WHERE firm_id = $1",
        ))
        .bind(firm_id)
        .fetch_optional(pool)
        .await?;

        Ok(sub)
    }

    /// Updates the subscription status
    ///
    /// Stamps `canceled_at` when entering the canceled state and clears it
    /// on reactivation.
    pub async fn update_status(
        pool: &PgPool,
        firm_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2,
                canceled_at = CASE
                    WHEN $2 = 'canceled' THEN NOW()
                    WHEN $2 IN ('active', 'trial') THEN NULL
                    ELSE canceled_at
                END,
                updated_at = NOW()
            WHERE firm_id = $1
            "#,
        )
        .bind(firm_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Re-points the subscription at a new plan immediately (upgrade path)
    ///
    /// Clears any pending deferred downgrade: an explicit upgrade supersedes
    /// a scheduled change.
    pub async fn set_plan(pool: &PgPool, firm_id: Uuid, plan_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET plan_id = $2, downgrade_to_plan_id = NULL, updated_at = NOW()
            WHERE firm_id = $1
            "#,
        )
        .bind(firm_id)
        .bind(plan_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records a deferred downgrade (no limit change until period end)
    pub async fn schedule_downgrade(
        pool: &PgPool,
        firm_id: Uuid,
        plan_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET downgrade_to_plan_id = $2, updated_at = NOW()
            WHERE firm_id = $1
            "#,
        )
        .bind(firm_id)
        .bind(plan_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Applies a previously scheduled downgrade
    ///
    /// Conditional on the downgrade still being pending, so a concurrent
    /// reconciler run applies it at most once.
    pub async fn apply_scheduled_downgrade(
        pool: &PgPool,
        subscription_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sub = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET plan_id = downgrade_to_plan_id, downgrade_to_plan_id = NULL, updated_at = NOW()
            WHERE id = $1 AND downgrade_to_plan_id IS NOT NULL
            RETURNING {SELECT_COLUMNS}
            "#,
        ))
        .bind(subscription_id)
        .fetch_optional(pool)
        .await?;

        Ok(sub)
    }

    /// Stores the provider's subscription reference
    pub async fn set_provider_ref(
        pool: &PgPool,
        firm_id: Uuid,
        provider_ref: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriptions SET provider_ref = $2, updated_at = NOW() WHERE firm_id = $1",
        )
        .bind(firm_id)
        .bind(provider_ref)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Rolls the billing period forward
    pub async fn set_period(
        pool: &PgPool,
        firm_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET current_period_start = $2, current_period_end = $3, updated_at = NOW()
            WHERE firm_id = $1
            "#,
        )
        .bind(firm_id)
        .bind(start)
        .bind(end)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Subscriptions with a deferred downgrade whose period has ended
    pub async fn find_downgrades_due(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let subs = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM subscriptions
            WHERE downgrade_to_plan_id IS NOT NULL
              AND current_period_end IS NOT NULL
              AND current_period_end <= $1
            "#,
        ))
        .bind(now)
        .fetch_all(pool)
        .await?;

        Ok(subs)
    }

    /// Trial subscriptions whose trial window has fully elapsed
    pub async fn find_lapsed_trials(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let subs = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM subscriptions
            WHERE status = 'trial'
              AND trial_ends_at IS NOT NULL
              AND trial_ends_at < $1
            "#,
        ))
        .bind(now)
        .fetch_all(pool)
        .await?;

        Ok(subs)
    }

    /// Trial subscriptions ending inside the given window
    ///
    /// Used by the trial-alert pass; the window is one calendar day.
    pub async fn find_trials_ending_between(
        pool: &PgPool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let subs = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM subscriptions
            WHERE status = 'trial'
              AND trial_ends_at IS NOT NULL
              AND trial_ends_at >= $1
              AND trial_ends_at <= $2
            "#,
        ))
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

        Ok(subs)
    }

    /// Unresolved subscriptions (past_due, canceled, expired) that may have
    /// outlived their grace window
    pub async fn find_grace_candidates(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let subs = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM subscriptions
            WHERE status IN ('past_due', 'canceled', 'expired')
            "#,
        ))
        .fetch_all(pool)
        .await?;

        Ok(subs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_sub(status: &str) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            firm_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            status: status.to_string(),
            current_period_start: Some(now - Duration::days(10)),
            current_period_end: Some(now + Duration::days(20)),
            trial_ends_at: None,
            canceled_at: None,
            downgrade_to_plan_id: None,
            provider_ref: Some("sub_123".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_get_status() {
        assert_eq!(sample_sub("active").get_status(), SubscriptionStatus::Active);
        assert_eq!(sample_sub("trial").get_status(), SubscriptionStatus::Trial);
    }

    #[test]
    fn test_unknown_status_fails_closed() {
        assert_eq!(sample_sub("mystery").get_status(), SubscriptionStatus::ReadOnly);
    }

    #[test]
    fn test_grace_reference_prefers_cancellation() {
        let mut sub = sample_sub("canceled");
        let canceled = Utc::now() - Duration::days(3);
        sub.canceled_at = Some(canceled);
        assert_eq!(sub.grace_reference(), Some(canceled));
    }

    #[test]
    fn test_grace_reference_falls_back_to_period_end() {
        let sub = sample_sub("past_due");
        assert_eq!(sub.grace_reference(), sub.current_period_end);
    }

    #[test]
    fn test_grace_reference_uses_trial_end_last() {
        let mut sub = sample_sub("expired");
        sub.current_period_end = None;
        let trial_end = Utc::now() - Duration::days(5);
        sub.trial_ends_at = Some(trial_end);
        assert_eq!(sub.grace_reference(), Some(trial_end));
    }

    // Integration tests for database operations are in tests/ with a live database
}
