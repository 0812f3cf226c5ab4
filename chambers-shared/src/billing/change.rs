/// Plan changes: immediate upgrades, deferred downgrades, limit recompute
///
/// Upgrades take effect the moment the change event lands: the subscription
/// re-points at the new plan and the firm's ceilings are recomputed right
/// away. Downgrades only record `downgrade_to_plan_id`; the reconciler
/// applies them once the current billing period ends, so in-period usage is
/// never truncated mid-cycle.
///
/// [`effective_limits`] is the single place ceilings are derived from a plan
/// plus the firm's active add-on grants; the upgrade path and the reconciler
/// both call it so the two can never disagree.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::EntitlementError;
use crate::models::addon::AddOn;
use crate::models::firm::Firm;
use crate::models::plan::Plan;
use crate::models::subscription::Subscription;

/// When a plan change takes effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTiming {
    /// Applied now: plan and ceilings change immediately
    Immediate,

    /// Recorded now, applied by the reconciler at period end
    Deferred,
}

/// Classifies a plan change as upgrade (immediate) or downgrade (deferred)
///
/// Price is the tiebreaker the billing provider uses; a lateral move counts
/// as an upgrade and applies immediately.
pub fn classify_change(current: &Plan, next: &Plan) -> ChangeTiming {
    if next.price_cents >= current.price_cents {
        ChangeTiming::Immediate
    } else {
        ChangeTiming::Deferred
    }
}

/// Derived ceilings for a firm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveLimits {
    /// Seat ceiling (None = unlimited)
    pub max_users: Option<i32>,

    /// Storage ceiling in bytes (None = unlimited)
    pub max_storage_bytes: Option<i64>,
}

/// Derives a firm's ceilings from its plan and active add-on storage
///
/// `max_storage_bytes = plan base (seats × per-seat) + Σ active add-ons`.
/// Unlimited seats imply an unlimited storage ceiling; add-on grants are
/// meaningless there and ignored.
pub fn effective_limits(plan: &Plan, active_addon_bytes: i64) -> EffectiveLimits {
    EffectiveLimits {
        max_users: plan.max_seats,
        max_storage_bytes: plan
            .base_storage_bytes()
            .map(|base| base + active_addon_bytes),
    }
}

/// Recomputes and persists a firm's ceilings from a plan
///
/// Reads the firm's active add-on grants, derives the ceilings, and writes
/// them (and the plan pointer) onto the firm row.
pub async fn recompute_firm_limits(
    pool: &PgPool,
    firm_id: Uuid,
    plan: &Plan,
) -> Result<EffectiveLimits, EntitlementError> {
    let addon_bytes = AddOn::sum_active_storage(pool, firm_id).await?;
    let limits = effective_limits(plan, addon_bytes);

    let updated = Firm::update_limits(
        pool,
        firm_id,
        plan.id,
        limits.max_users,
        limits.max_storage_bytes,
    )
    .await?;

    if !updated {
        return Err(EntitlementError::FirmNotFound(firm_id));
    }

    Ok(limits)
}

/// Applies a plan change for a firm
///
/// Immediate changes re-point the subscription and recompute ceilings now.
/// Deferred changes only record the target plan; ceilings are untouched
/// until the reconciler observes `now >= current_period_end`.
pub async fn apply_plan_change(
    pool: &PgPool,
    firm_id: Uuid,
    next_plan: &Plan,
    timing: ChangeTiming,
) -> Result<(), EntitlementError> {
    match timing {
        ChangeTiming::Immediate => {
            let updated = Subscription::set_plan(pool, firm_id, next_plan.id).await?;
            if !updated {
                return Err(EntitlementError::FirmNotFound(firm_id));
            }
            recompute_firm_limits(pool, firm_id, next_plan).await?;
            tracing::info!(
                firm_id = %firm_id,
                plan = %next_plan.name,
                "Plan upgrade applied immediately"
            );
        }
        ChangeTiming::Deferred => {
            let updated = Subscription::schedule_downgrade(pool, firm_id, next_plan.id).await?;
            if !updated {
                return Err(EntitlementError::FirmNotFound(firm_id));
            }
            tracing::info!(
                firm_id = %firm_id,
                plan = %next_plan.name,
                "Plan downgrade recorded, deferred to period end"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plan(max_seats: Option<i32>, per_seat: i64, price_cents: i32) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            tier: "starter".to_string(),
            max_seats,
            storage_per_seat_bytes: per_seat,
            price_cents,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_classify_upgrade() {
        let starter = plan(Some(5), 1_000, 4900);
        let practice = plan(Some(25), 2_000, 14900);

        assert_eq!(classify_change(&starter, &practice), ChangeTiming::Immediate);
        assert_eq!(classify_change(&practice, &starter), ChangeTiming::Deferred);
    }

    #[test]
    fn test_lateral_move_is_immediate() {
        let a = plan(Some(5), 1_000, 4900);
        let b = plan(Some(10), 500, 4900);
        assert_eq!(classify_change(&a, &b), ChangeTiming::Immediate);
    }

    #[test]
    fn test_effective_limits_with_addons() {
        let p = plan(Some(5), 1_000_000, 4900);
        let limits = effective_limits(&p, 2_500_000);

        assert_eq!(limits.max_users, Some(5));
        assert_eq!(limits.max_storage_bytes, Some(5_000_000 + 2_500_000));
    }

    #[test]
    fn test_effective_limits_without_addons() {
        let p = plan(Some(3), 1_000_000, 0);
        let limits = effective_limits(&p, 0);
        assert_eq!(limits.max_storage_bytes, Some(3_000_000));
    }

    #[test]
    fn test_effective_limits_unlimited_plan() {
        let p = plan(None, 1_000_000, 99900);
        let limits = effective_limits(&p, 5_000_000);

        assert_eq!(limits.max_users, None);
        // Add-ons do not bound an unlimited plan
        assert_eq!(limits.max_storage_bytes, None);
    }

    #[test]
    fn test_effective_limits_is_deterministic() {
        // Recomputing with unchanged inputs yields identical ceilings; this
        // is what makes the reconciler's recompute step idempotent.
        let p = plan(Some(10), 750_000, 9900);
        let first = effective_limits(&p, 1_000_000);
        let second = effective_limits(&p, 1_000_000);
        assert_eq!(first, second);
    }
}
