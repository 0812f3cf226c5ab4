/// Subscription state machine
///
/// A firm's subscription status is a single field driven by discrete
/// events: webhook events from the billing provider (charges, cancellation)
/// and timer events raised by the reconciler (trial window elapsed, grace
/// period elapsed). There is no persisted transition log; [`apply`] is the
/// pure transition function and [`apply_event`] persists its result to both
/// the subscriptions row and the denormalized mirror on the firm row.
///
/// # States
///
/// `trial, active, past_due, canceled, expired, read_only`
///
/// # Read-Only Gate
///
/// [`SubscriptionStatus::is_read_only`] is a pure function of status alone.
/// It gates all mutating operations uniformly: callers check it before any
/// tenant-scoped write and return `ReadOnlyModeActive`, never proceeding
/// partially. Billing operations themselves (plan change, webhooks) bypass
/// the gate: a firm must be able to pay its way out of read-only mode.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::EntitlementError;
use crate::models::firm::Firm;
use crate::models::subscription::Subscription;

/// Subscription status, the machine's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Evaluation window, fully functional
    Trial,

    /// Paid and current
    Active,

    /// A charge attempt failed; retries pending
    PastDue,

    /// Retry budget exhausted or explicitly canceled
    Canceled,

    /// Trial elapsed without a successful charge
    Expired,

    /// Grace period elapsed without resolution; writes blocked
    ReadOnly,
}

/// All states, for truth-table style tests
pub const ALL_STATUSES: &[SubscriptionStatus] = &[
    SubscriptionStatus::Trial,
    SubscriptionStatus::Active,
    SubscriptionStatus::PastDue,
    SubscriptionStatus::Canceled,
    SubscriptionStatus::Expired,
    SubscriptionStatus::ReadOnly,
];

impl SubscriptionStatus {
    /// Status string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::ReadOnly => "read_only",
        }
    }

    /// Parses a status from its stored string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(SubscriptionStatus::Trial),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "expired" => Some(SubscriptionStatus::Expired),
            "read_only" => Some(SubscriptionStatus::ReadOnly),
            _ => None,
        }
    }

    /// Whether tenant-scoped writes are blocked in this status
    ///
    /// Pure function of status; no other field affects it.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::PastDue
                | SubscriptionStatus::Canceled
                | SubscriptionStatus::Expired
                | SubscriptionStatus::ReadOnly
        )
    }
}

/// Events that drive status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEvent {
    /// A charge succeeded (first charge or a successful retry)
    ChargeSucceeded,

    /// A charge attempt failed
    ChargeFailed,

    /// The provider canceled the subscription: retry budget exhausted, or
    /// an explicit cancellation went through
    ProviderCanceled,

    /// The trial window elapsed with no successful charge (timer)
    TrialElapsed,

    /// The grace period elapsed without resolution (timer)
    GraceElapsed,

    /// A new subscription reactivated the firm
    Reactivated {
        /// Whether the new subscription starts in trial
        trial: bool,
    },
}

/// Pure transition function
///
/// Returns the next status, or `None` when the event does not apply in the
/// current status (e.g. a replayed webhook); callers log and ignore those.
pub fn apply(status: SubscriptionStatus, event: SubscriptionEvent) -> Option<SubscriptionStatus> {
    use SubscriptionEvent::*;
    use SubscriptionStatus::*;

    match (status, event) {
        (Trial, ChargeSucceeded) => Some(Active),
        (Trial, TrialElapsed) => Some(Expired),
        (Active, ChargeFailed) => Some(PastDue),
        (PastDue, ChargeSucceeded) => Some(Active),
        (Active | PastDue, ProviderCanceled) => Some(Canceled),
        (PastDue | Canceled | Expired, GraceElapsed) => Some(ReadOnly),
        // Reactivation via a new subscription applies from every state
        (_, Reactivated { trial: true }) => Some(Trial),
        (_, Reactivated { trial: false }) => Some(Active),
        _ => None,
    }
}

/// Applies an event to a firm's subscription and persists the result
///
/// Updates the subscriptions row and the firm's status mirror together.
/// Events that do not apply in the current status are logged and dropped,
/// which makes webhook replays harmless.
///
/// Returns the new status when a transition happened.
pub async fn apply_event(
    pool: &PgPool,
    firm_id: Uuid,
    event: SubscriptionEvent,
) -> Result<Option<SubscriptionStatus>, EntitlementError> {
    let subscription = Subscription::find_by_firm(pool, firm_id)
        .await?
        .ok_or(EntitlementError::FirmNotFound(firm_id))?;

    let current = subscription.get_status();
    let next = match apply(current, event) {
        Some(next) => next,
        None => {
            tracing::debug!(
                firm_id = %firm_id,
                status = current.as_str(),
                ?event,
                "Subscription event does not apply in current status, ignoring"
            );
            return Ok(None);
        }
    };

    Subscription::update_status(pool, firm_id, next).await?;
    Firm::set_subscription_status(pool, firm_id, next).await?;

    tracing::info!(
        firm_id = %firm_id,
        from = current.as_str(),
        to = next.as_str(),
        ?event,
        "Subscription status transition"
    );

    Ok(Some(next))
}

/// Rejects tenant-scoped writes for firms whose status is read-only
///
/// Every mutating handler calls this after authorization and before any
/// side effect. Reads the firm's denormalized mirror, one row.
pub async fn require_writable(pool: &PgPool, firm_id: Uuid) -> Result<(), EntitlementError> {
    let firm = Firm::find_by_id(pool, firm_id)
        .await?
        .ok_or(EntitlementError::FirmNotFound(firm_id))?;

    if firm.status().is_read_only() {
        return Err(EntitlementError::ReadOnlyModeActive(firm_id));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubscriptionEvent::*;
    use SubscriptionStatus::*;

    #[test]
    fn test_status_roundtrip() {
        for status in ALL_STATUSES {
            assert_eq!(SubscriptionStatus::from_str(status.as_str()), Some(*status));
        }
        assert_eq!(SubscriptionStatus::from_str("paused"), None);
    }

    #[test]
    fn test_read_only_truth_table() {
        // Direct truth table over all six states
        assert!(!Trial.is_read_only());
        assert!(!Active.is_read_only());
        assert!(PastDue.is_read_only());
        assert!(Canceled.is_read_only());
        assert!(Expired.is_read_only());
        assert!(ReadOnly.is_read_only());
    }

    #[test]
    fn test_trial_transitions() {
        assert_eq!(apply(Trial, ChargeSucceeded), Some(Active));
        assert_eq!(apply(Trial, TrialElapsed), Some(Expired));
        // A failed charge during trial is not a defined transition
        assert_eq!(apply(Trial, ChargeFailed), None);
    }

    #[test]
    fn test_dunning_cycle() {
        assert_eq!(apply(Active, ChargeFailed), Some(PastDue));
        assert_eq!(apply(PastDue, ChargeSucceeded), Some(Active));
        assert_eq!(apply(PastDue, ProviderCanceled), Some(Canceled));
        // Explicit cancellation of a healthy subscription
        assert_eq!(apply(Active, ProviderCanceled), Some(Canceled));
    }

    #[test]
    fn test_grace_elapse() {
        assert_eq!(apply(PastDue, GraceElapsed), Some(ReadOnly));
        assert_eq!(apply(Canceled, GraceElapsed), Some(ReadOnly));
        assert_eq!(apply(Expired, GraceElapsed), Some(ReadOnly));
        // Healthy states have no grace window
        assert_eq!(apply(Active, GraceElapsed), None);
        assert_eq!(apply(Trial, GraceElapsed), None);
        assert_eq!(apply(ReadOnly, GraceElapsed), None);
    }

    #[test]
    fn test_reactivation_from_every_state() {
        for status in ALL_STATUSES {
            assert_eq!(apply(*status, Reactivated { trial: false }), Some(Active));
            assert_eq!(apply(*status, Reactivated { trial: true }), Some(Trial));
        }
    }

    #[test]
    fn test_replayed_events_do_not_transition() {
        // A duplicate charge.succeeded after the firm is already active
        assert_eq!(apply(Active, ChargeSucceeded), None);
        // A stale charge.failed after cancellation
        assert_eq!(apply(Canceled, ChargeFailed), None);
        // TrialElapsed after conversion
        assert_eq!(apply(Active, TrialElapsed), None);
    }
}
