/// Plan-based request rate limiting
///
/// Token bucket rate limiting applied per firm, with limits keyed off the
/// firm's plan tier. Bucket state lives behind the [`RateLimitStore`]
/// interface:
///
/// - [`RedisRateLimitStore`]: shared state, correct across any number of
///   API instances
/// - [`LocalRateLimitStore`]: a per-process map. Correct only for a
///   single-instance deployment; each instance counts requests it alone
///   saw, so N instances admit up to N× the configured rate. Chosen
///   automatically when no Redis URL is configured, and the weakening is
///   logged at startup.
///
/// # Rate Limits by Tier
///
/// - **Trial**: 10 requests/minute
/// - **Starter**: 60 requests/minute
/// - **Practice**: 300 requests/minute
/// - **Enterprise**: 1000 requests/minute
///
/// # Headers
///
/// 429 responses carry `Retry-After` with the seconds until a token frees
/// up.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Extension,
};

use crate::app::AppState;
use crate::error::ApiError;
use chambers_shared::auth::context::AuthContext;
use chambers_shared::models::firm::Firm;
use chambers_shared::models::plan::{Plan, PlanTier};

/// Rate limit parameters for a plan tier
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Requests allowed per minute (also the burst capacity)
    pub requests_per_minute: u32,

    /// Token refill rate, tokens per second
    pub refill_rate: f64,
}

impl RateLimit {
    /// Gets the rate limit for a plan tier
    pub fn for_tier(tier: PlanTier) -> Self {
        let requests_per_minute = match tier {
            PlanTier::Trial => 10,
            PlanTier::Starter => 60,
            PlanTier::Practice => 300,
            PlanTier::Enterprise => 1000,
        };

        RateLimit {
            requests_per_minute,
            refill_rate: f64::from(requests_per_minute) / 60.0,
        }
    }
}

/// Token bucket state
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBucket {
    /// Tokens currently available
    pub tokens: f64,

    /// Last refill timestamp (Unix seconds)
    pub last_refill: u64,
}

impl TokenBucket {
    /// A full bucket as of `now`
    fn full(limit: &RateLimit, now: u64) -> Self {
        TokenBucket {
            tokens: f64::from(limit.requests_per_minute),
            last_refill: now,
        }
    }

    /// Refills based on elapsed time, capped at capacity
    fn refill(&mut self, limit: &RateLimit, now: u64) {
        let elapsed = now.saturating_sub(self.last_refill) as f64;
        self.tokens =
            (self.tokens + elapsed * limit.refill_rate).min(f64::from(limit.requests_per_minute));
        self.last_refill = now;
    }

    /// Consumes one token if available
    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until one token is available
    fn seconds_until_available(&self, limit: &RateLimit) -> u64 {
        let deficit = 1.0 - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / limit.refill_rate).ceil() as u64
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted
    Allowed,

    /// Request rejected; retry after this many seconds
    Limited {
        /// Seconds until a token frees up
        retry_after: u64,
    },
}

/// Bucket state backend
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Refills the firm's bucket, attempts to consume one token, and
    /// persists the result
    async fn try_acquire(
        &self,
        firm_id: Uuid,
        limit: &RateLimit,
        now: u64,
    ) -> Result<RateDecision, ApiError>;
}

/// Redis-backed bucket store (cross-instance)
///
/// Buckets are stored as JSON under `ratelimit:firm:{id}` with a 2-minute
/// TTL for self-cleanup. The read-modify-write is per-firm; contention on
/// one firm's key across instances can admit a marginal extra request,
/// which is acceptable for throttling (unlike the storage quota, which
/// uses conditional updates for a hard guarantee).
pub struct RedisRateLimitStore {
    client: redis::Client,
}

impl RedisRateLimitStore {
    /// Creates a store from a Redis URL
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        Ok(RedisRateLimitStore {
            client: redis::Client::open(redis_url)?,
        })
    }

    fn key(firm_id: Uuid) -> String {
        format!("ratelimit:firm:{}", firm_id)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn try_acquire(
        &self,
        firm_id: Uuid,
        limit: &RateLimit,
        now: u64,
    ) -> Result<RateDecision, ApiError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("Rate limit backend: {}", e)))?;

        let key = Self::key(firm_id);
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("Rate limit backend: {}", e)))?;

        let mut bucket = raw
            .and_then(|s| serde_json::from_str::<TokenBucket>(&s).ok())
            .unwrap_or_else(|| TokenBucket::full(limit, now));

        bucket.refill(limit, now);
        let decision = if bucket.try_consume() {
            RateDecision::Allowed
        } else {
            RateDecision::Limited {
                retry_after: bucket.seconds_until_available(limit),
            }
        };

        let serialized = serde_json::to_string(&bucket)
            .map_err(|e| ApiError::InternalError(format!("Bucket serialization: {}", e)))?;
        let _: () = conn
            .set_ex(&key, serialized, 120)
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("Rate limit backend: {}", e)))?;

        Ok(decision)
    }
}

/// In-process bucket store (single-instance fallback)
///
/// Used when no Redis URL is configured. State is process-local: with more
/// than one API instance, each enforces the limit independently and the
/// effective global rate multiplies accordingly.
#[derive(Default)]
pub struct LocalRateLimitStore {
    buckets: Mutex<HashMap<Uuid, TokenBucket>>,
}

impl LocalRateLimitStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for LocalRateLimitStore {
    async fn try_acquire(
        &self,
        firm_id: Uuid,
        limit: &RateLimit,
        now: u64,
    ) -> Result<RateDecision, ApiError> {
        let mut buckets = self.buckets.lock().expect("rate limit lock");
        let bucket = buckets
            .entry(firm_id)
            .or_insert_with(|| TokenBucket::full(limit, now));

        bucket.refill(limit, now);
        if bucket.try_consume() {
            Ok(RateDecision::Allowed)
        } else {
            Ok(RateDecision::Limited {
                retry_after: bucket.seconds_until_available(limit),
            })
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Rate limiting middleware
///
/// Resolves the firm's plan tier, then admits or rejects through the
/// configured store. Returns 429 with `Retry-After` when limited.
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let firm = Firm::find_by_id(&state.db, auth.firm_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Firm not found".to_string()))?;

    let plan = Plan::find_by_id(&state.db, firm.plan_id).await?;
    let tier = plan.map(|p| p.get_tier()).unwrap_or(PlanTier::Trial);
    let limit = RateLimit::for_tier(tier);

    match state
        .rate_limiter
        .try_acquire(auth.firm_id, &limit, unix_now())
        .await?
    {
        RateDecision::Allowed => Ok(next.run(request).await),
        RateDecision::Limited { retry_after } => Err(ApiError::RateLimitExceeded {
            retry_after,
            message: format!(
                "Rate limit of {} requests/minute exceeded",
                limit.requests_per_minute
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_scale_with_tier() {
        assert_eq!(RateLimit::for_tier(PlanTier::Trial).requests_per_minute, 10);
        assert_eq!(RateLimit::for_tier(PlanTier::Starter).requests_per_minute, 60);
        assert_eq!(RateLimit::for_tier(PlanTier::Practice).requests_per_minute, 300);
        assert_eq!(
            RateLimit::for_tier(PlanTier::Enterprise).requests_per_minute,
            1000
        );
    }

    #[test]
    fn test_bucket_consume_and_refill() {
        let limit = RateLimit::for_tier(PlanTier::Trial); // 10/min
        let mut bucket = TokenBucket::full(&limit, 1000);

        for _ in 0..10 {
            assert!(bucket.try_consume());
        }
        assert!(!bucket.try_consume());
        assert!(bucket.seconds_until_available(&limit) > 0);

        // One minute later the bucket is full again
        bucket.refill(&limit, 1060);
        assert!(bucket.try_consume());
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let limit = RateLimit::for_tier(PlanTier::Starter);
        let mut bucket = TokenBucket::full(&limit, 0);

        bucket.refill(&limit, 10_000);
        assert_eq!(bucket.tokens, f64::from(limit.requests_per_minute));
    }

    #[tokio::test]
    async fn test_local_store_enforces_limit() {
        let store = LocalRateLimitStore::new();
        let firm = Uuid::new_v4();
        let limit = RateLimit::for_tier(PlanTier::Trial);
        let now = 5_000;

        for _ in 0..10 {
            assert_eq!(
                store.try_acquire(firm, &limit, now).await.unwrap(),
                RateDecision::Allowed
            );
        }

        match store.try_acquire(firm, &limit, now).await.unwrap() {
            RateDecision::Limited { retry_after } => assert!(retry_after >= 1),
            RateDecision::Allowed => panic!("11th request within the same second must be limited"),
        }

        // A different firm has its own bucket
        assert_eq!(
            store.try_acquire(Uuid::new_v4(), &limit, now).await.unwrap(),
            RateDecision::Allowed
        );
    }
}
