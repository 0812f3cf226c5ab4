/// Authentication endpoints
///
/// - `POST /v1/auth/register`: new user + firm + trial subscription
/// - `POST /v1/auth/login`: password login, issues a session pair
/// - `POST /v1/auth/refresh`: exchanges a refresh token
/// - `POST /v1/auth/switch-firm`: atomically reissues the session
///   descriptor for another firm the user belongs to
///
/// Registration bootstraps a complete tenant: the firm starts on the trial
/// plan with ceilings derived from it, an owner membership consumes the
/// first seat, and the subscription row starts in `trial`.

use axum::{extract::State, Extension, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult, ValidationErrorDetail};
use chambers_shared::auth::context::AuthContext;
use chambers_shared::auth::password;
use chambers_shared::auth::session::{self, SessionTokens};
use chambers_shared::billing::change::effective_limits;
use chambers_shared::billing::state::SubscriptionStatus;
use chambers_shared::models::firm::{CreateFirm, Firm};
use chambers_shared::models::membership::{CreateMembership, Membership, MembershipStatus};
use chambers_shared::models::plan::{Plan, PlanTier};
use chambers_shared::models::role::Role;
use chambers_shared::models::subscription::{CreateSubscription, Subscription};
use chambers_shared::models::user::{CreateUser, User};

/// Length of the trial window for new firms
const TRIAL_DAYS: i64 = 14;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (validated for strength)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// Optional display name
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,

    /// Name of the firm to create
    #[validate(length(
        min = 1,
        max = 255,
        message = "Firm name must be between 1 and 255 characters"
    ))]
    pub firm_name: String,
}

/// Register response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// New user ID
    pub user_id: Uuid,

    /// New firm ID
    pub firm_id: Uuid,

    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

/// `POST /v1/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    validate_request(&req)?;
    password::validate_password_strength(&req.password).map_err(ApiError::BadRequest)?;

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::Conflict {
            code: "conflict",
            message: "Email already registered".to_string(),
        });
    }

    let password_hash = password::hash_password(&req.password)?;
    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
            name: req.name,
        },
    )
    .await?;

    let trial_plan = Plan::find_by_tier(&state.db, PlanTier::Trial)
        .await?
        .ok_or_else(|| ApiError::InternalError("Trial plan missing from reference data".into()))?;

    let limits = effective_limits(&trial_plan, 0);
    let trial_ends_at = Utc::now() + Duration::days(TRIAL_DAYS);

    let firm = Firm::create(
        &state.db,
        CreateFirm {
            name: req.firm_name,
            plan_id: trial_plan.id,
            max_users: limits.max_users,
            max_storage_bytes: limits.max_storage_bytes,
            trial_ends_at: Some(trial_ends_at),
        },
    )
    .await?;

    Subscription::create(
        &state.db,
        CreateSubscription {
            firm_id: firm.id,
            plan_id: trial_plan.id,
            status: SubscriptionStatus::Trial,
            current_period_start: Some(Utc::now()),
            current_period_end: None,
            trial_ends_at: Some(trial_ends_at),
            provider_ref: None,
        },
    )
    .await?;

    let owner_role = Role::find_builtin(&state.db, "owner")
        .await?
        .ok_or_else(|| ApiError::InternalError("Built-in owner role missing".into()))?;

    // The founder takes the first seat
    state.quota.reserve_seat(firm.id).await?;
    Membership::create(
        &state.db,
        CreateMembership {
            user_id: user.id,
            firm_id: firm.id,
            role_id: Some(owner_role.id),
            status: MembershipStatus::Active,
        },
    )
    .await?;

    User::set_active_firm(&state.db, user.id, firm.id).await?;

    let tokens = session::issue_session(user.id, firm.id, state.jwt_secret())?;

    tracing::info!(user_id = %user.id, firm_id = %firm.id, "New firm registered");

    Ok(Json(RegisterResponse {
        user_id: user.id,
        firm_id: firm.id,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    pub password: String,
}

/// Token pair response (login, refresh, switch-firm)
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// The firm the session operates in
    pub firm_id: Uuid,

    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

impl From<(Uuid, SessionTokens)> for TokenResponse {
    fn from((firm_id, tokens): (Uuid, SessionTokens)) -> Self {
        TokenResponse {
            firm_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }
}

/// `POST /v1/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    validate_request(&req)?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
    }

    // Session firm: the remembered active firm, or the first membership
    let firm_id = match user.active_firm_id {
        Some(firm_id) => firm_id,
        None => Membership::list_by_user(&state.db, user.id)
            .await?
            .into_iter()
            .find(|m| m.status == MembershipStatus::Active)
            .map(|m| m.firm_id)
            .ok_or_else(|| ApiError::forbidden("User belongs to no firm"))?,
    };

    User::update_last_login(&state.db, user.id).await?;
    if user.active_firm_id.is_none() {
        User::set_active_firm(&state.db, user.id, firm_id).await?;
    }

    let tokens = session::issue_session(user.id, firm_id, state.jwt_secret())?;
    Ok(Json(TokenResponse::from((firm_id, tokens))))
}

/// Refresh request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token from a previous login/switch
    pub refresh_token: String,
}

/// Refresh response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token
    pub access_token: String,
}

/// `POST /v1/auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = session::refresh_access_token(&req.refresh_token, state.jwt_secret())?;
    Ok(Json(RefreshResponse { access_token }))
}

/// Switch-firm request
#[derive(Debug, Deserialize)]
pub struct SwitchFirmRequest {
    /// Firm to switch the session into
    pub firm_id: Uuid,
}

/// `POST /v1/auth/switch-firm`
///
/// Validates the caller's membership in the target firm, re-points the
/// active-firm marker, and issues a brand-new descriptor pair for the
/// target. The old descriptor is simply abandoned; nothing is mutated in
/// place, so no request can ever observe a half-switched session.
pub async fn switch_firm(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<SwitchFirmRequest>,
) -> ApiResult<Json<TokenResponse>> {
    Membership::find_active(&state.db, auth.user_id, req.firm_id)
        .await?
        .ok_or(chambers_shared::error::EntitlementError::NoMembership(
            req.firm_id,
        ))?;

    User::set_active_firm(&state.db, auth.user_id, req.firm_id).await?;

    let tokens = session::issue_session(auth.user_id, req.firm_id, state.jwt_secret())?;

    tracing::info!(user_id = %auth.user_id, firm_id = %req.firm_id, "Session switched firm");

    Ok(Json(TokenResponse::from((req.firm_id, tokens))))
}

/// Maps validator output onto the API error shape
fn validate_request<T: Validate>(req: &T) -> ApiResult<()> {
    req.validate().map_err(|errors| {
        let details = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Invalid value".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(details)
    })
}
