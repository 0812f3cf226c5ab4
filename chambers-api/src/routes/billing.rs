/// Billing endpoints
///
/// - `POST /v1/billing/plan`: change the firm's plan. Upgrades apply
///   immediately (limits recomputed now); downgrades only record the
///   target plan and the reconciler applies them at period end.
/// - `POST /v1/billing/webhooks`: inbound provider events
///   (`charge.succeeded`, `charge.failed`, `subscription.canceled`)
///   driving the subscription state machine.
///
/// Neither endpoint checks the read-only gate: a firm in read-only mode
/// must still be able to pay its way back out, and provider events must
/// always land. Plan changes are forwarded to the provider with an
/// idempotency key before local state moves, so a retried request cannot
/// double-apply.

use axum::{extract::State, http::HeaderMap, Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use chambers_shared::auth::context::AuthContext;
use chambers_shared::authz::catalog::PermissionKey;
use chambers_shared::authz::resolver::require_permission;
use chambers_shared::billing::change::{apply_plan_change, classify_change, ChangeTiming};
use chambers_shared::billing::provider::{ProviderChangeTiming, WebhookPayload};
use chambers_shared::billing::state::apply_event;
use chambers_shared::models::plan::Plan;
use chambers_shared::models::subscription::Subscription;

/// Plan-change request
#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    /// Target plan
    pub plan_id: Uuid,
}

/// Plan-change response
#[derive(Debug, Serialize)]
pub struct ChangePlanResponse {
    /// Target plan
    pub plan_id: Uuid,

    /// "immediate" or "deferred"
    pub applied: &'static str,
}

/// `POST /v1/billing/plan`
pub async fn change_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ChangePlanRequest>,
) -> ApiResult<Json<ChangePlanResponse>> {
    require_permission(&state.db, auth.user_id, auth.firm_id, PermissionKey::BillingManage)
        .await?;

    let subscription = Subscription::find_by_firm(&state.db, auth.firm_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No subscription for firm".to_string()))?;

    let current_plan = Plan::find_by_id(&state.db, subscription.plan_id)
        .await?
        .ok_or_else(|| ApiError::InternalError("Current plan missing".to_string()))?;
    let next_plan = Plan::find_by_id(&state.db, req.plan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Plan not found".to_string()))?;

    if current_plan.id == next_plan.id {
        return Err(ApiError::BadRequest("Firm is already on this plan".to_string()));
    }

    let timing = classify_change(&current_plan, &next_plan);

    // Tell the provider first; the idempotency key makes a retry after a
    // timeout safe on their side
    if let Some(provider_ref) = &subscription.provider_ref {
        let provider_timing = match timing {
            ChangeTiming::Immediate => ProviderChangeTiming::Immediate,
            ChangeTiming::Deferred => ProviderChangeTiming::Deferred,
        };
        let idempotency_key = format!("plan-change-{}-{}", auth.firm_id, next_plan.id);

        state
            .billing
            .change_plan(provider_ref, next_plan.id, provider_timing, &idempotency_key)
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("Billing provider: {}", e)))?;
    }

    apply_plan_change(&state.db, auth.firm_id, &next_plan, timing).await?;

    Ok(Json(ChangePlanResponse {
        plan_id: next_plan.id,
        applied: match timing {
            ChangeTiming::Immediate => "immediate",
            ChangeTiming::Deferred => "deferred",
        },
    }))
}

/// `POST /v1/billing/cancel`
///
/// Cancels the firm's subscription: the provider is told first, then the
/// local status moves to `canceled` through the same transition the
/// provider's own `subscription.canceled` webhook would drive, so the
/// eventual webhook replays as a no-op.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<WebhookResponse>> {
    require_permission(&state.db, auth.user_id, auth.firm_id, PermissionKey::BillingManage)
        .await?;

    let subscription = Subscription::find_by_firm(&state.db, auth.firm_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No subscription for firm".to_string()))?;

    if let Some(provider_ref) = &subscription.provider_ref {
        state
            .billing
            .cancel_subscription(provider_ref)
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("Billing provider: {}", e)))?;
    }

    let new_status = apply_event(
        &state.db,
        auth.firm_id,
        chambers_shared::billing::state::SubscriptionEvent::ProviderCanceled,
    )
    .await?;

    Ok(Json(WebhookResponse {
        received: true,
        status: new_status.map(|s| s.as_str().to_string()),
    }))
}

/// Reactivation request
#[derive(Debug, Deserialize)]
pub struct ReactivateRequest {
    /// Plan for the new subscription
    pub plan_id: Uuid,
}

/// `POST /v1/billing/reactivate`
///
/// Creates a new subscription for a lapsed firm (canceled, expired, or
/// read-only) and returns it to `active`. Works from any status; limits
/// are recomputed from the chosen plan immediately.
pub async fn reactivate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ReactivateRequest>,
) -> ApiResult<Json<ChangePlanResponse>> {
    use chambers_shared::billing::change::recompute_firm_limits;
    use chambers_shared::billing::state::SubscriptionEvent;
    use chrono::{Duration, Utc};

    require_permission(&state.db, auth.user_id, auth.firm_id, PermissionKey::BillingManage)
        .await?;

    let plan = Plan::find_by_id(&state.db, req.plan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Plan not found".to_string()))?;

    // A fresh provider subscription; the idempotency key makes retried
    // reactivations converge on one subscription
    let idempotency_key = format!("reactivate-{}-{}", auth.firm_id, plan.id);
    let provider_ref = state
        .billing
        .create_subscription(&auth.firm_id.to_string(), plan.id, &idempotency_key)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("Billing provider: {}", e)))?;

    Subscription::set_provider_ref(&state.db, auth.firm_id, &provider_ref).await?;
    Subscription::set_plan(&state.db, auth.firm_id, plan.id).await?;

    let now = Utc::now();
    Subscription::set_period(&state.db, auth.firm_id, now, now + Duration::days(30)).await?;

    apply_event(&state.db, auth.firm_id, SubscriptionEvent::Reactivated { trial: false })
        .await?;
    recompute_firm_limits(&state.db, auth.firm_id, &plan).await?;

    Ok(Json(ChangePlanResponse {
        plan_id: plan.id,
        applied: "immediate",
    }))
}

/// Webhook acknowledgment
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always true once the event was processed (or dropped as stale)
    pub received: bool,

    /// Status after the event, if a transition happened
    pub status: Option<String>,
}

/// `POST /v1/billing/webhooks`
///
/// Authenticated by the shared webhook secret, not a user session. Stale
/// or replayed events are acknowledged without a transition; returning an
/// error would only make the provider retry them forever.
pub async fn ingest_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Json<WebhookResponse>> {
    let secret = headers
        .get("X-Webhook-Secret")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing webhook secret".to_string()))?;

    if secret != state.config.billing.webhook_secret {
        return Err(ApiError::Unauthorized("Invalid webhook secret".to_string()));
    }

    let event = payload.to_subscription_event();
    let new_status = apply_event(&state.db, payload.firm_id, event).await?;

    Ok(Json(WebhookResponse {
        received: true,
        status: new_status.map(|s| s.as_str().to_string()),
    }))
}
