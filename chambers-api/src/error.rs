/// Error handling for the API server
///
/// A unified error type that maps to HTTP responses. Handlers return
/// `ApiResult<T>`; conversions from the shared entitlement error preserve
/// its stable error codes, so every denial kind (no membership, forbidden,
/// read-only mode, each quota kind) stays distinguishable by clients.
///
/// # Example
///
/// ```
/// use chambers_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     Ok(Json(json!({ "ok": true })))
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use chambers_shared::error::{EntitlementError, QuotaKind};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403) with a stable error code
    Forbidden {
        /// Stable code ("forbidden", "no_membership", "read_only_mode")
        code: &'static str,
        /// Human-readable message
        message: String,
    },

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) with a stable error code (quota kinds, duplicates)
    Conflict {
        /// Stable code ("conflict", "quota_exceeded_seats", ...)
        code: &'static str,
        /// Human-readable message
        message: String,
    },

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    RateLimitExceeded {
        /// Seconds until a token is available
        retry_after: u64,
        /// Human-readable message
        message: String,
    },

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code (e.g. "quota_exceeded_storage")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Plain 403 with the generic "forbidden" code
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            code: "forbidden",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Rate limiting carries a Retry-After header on top of the body
        if let ApiError::RateLimitExceeded {
            retry_after,
            message,
        } = &self
        {
            let body = Json(ErrorResponse {
                error: "rate_limit_exceeded".to_string(),
                message: message.clone(),
                details: None,
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            response.headers_mut().insert(
                "Retry-After",
                axum::http::HeaderValue::from_str(&retry_after.to_string())
                    .unwrap_or(axum::http::HeaderValue::from_static("1")),
            );
            return response;
        }

        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request".to_string(), msg, None),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated".to_string(), msg, None)
            }
            ApiError::Forbidden { code, message } => {
                (StatusCode::FORBIDDEN, code.to_string(), message, None)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found".to_string(), msg, None),
            ApiError::Conflict { code, message } => {
                (StatusCode::CONFLICT, code.to_string(), message, None)
            }
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error".to_string(),
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::RateLimitExceeded { message, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded".to_string(),
                message,
                None,
            ),
            ApiError::InternalError(msg) => {
                // Log internals, never expose them to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error".to_string(),
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable".to_string(),
                msg,
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code,
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Maps entitlement denials onto HTTP, preserving their stable codes
impl From<EntitlementError> for ApiError {
    fn from(err: EntitlementError) -> Self {
        let code = err.code();
        match err {
            EntitlementError::Unauthenticated => {
                ApiError::Unauthorized("No authenticated principal".to_string())
            }
            EntitlementError::NoMembership(_)
            | EntitlementError::Forbidden(_)
            | EntitlementError::ReadOnlyModeActive(_) => ApiError::Forbidden {
                code,
                message: err.to_string(),
            },
            EntitlementError::QuotaExceeded(kind) => ApiError::Conflict {
                code,
                message: match kind {
                    QuotaKind::Seats => "User seat quota exceeded".to_string(),
                    QuotaKind::Storage => "Storage quota exceeded".to_string(),
                },
            },
            EntitlementError::FirmNotFound(id) => ApiError::NotFound(format!("Firm {} not found", id)),
            EntitlementError::InvalidPermissionData(msg) => ApiError::InternalError(msg),
            EntitlementError::Database(e) => ApiError::InternalError(format!("Database error: {}", e)),
        }
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("email") {
                        return ApiError::Conflict {
                            code: "conflict",
                            message: "Email already exists".to_string(),
                        };
                    }
                    return ApiError::Conflict {
                        code: "conflict",
                        message: format!("Constraint violation: {}", constraint),
                    };
                }
                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert session token errors to API errors
impl From<chambers_shared::auth::session::SessionError> for ApiError {
    fn from(err: chambers_shared::auth::session::SessionError) -> Self {
        use chambers_shared::auth::session::SessionError;
        match err {
            SessionError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            SessionError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            other => ApiError::Unauthorized(format!("Invalid token: {}", other)),
        }
    }
}

/// Convert password errors to API errors
impl From<chambers_shared::auth::password::PasswordError> for ApiError {
    fn from(err: chambers_shared::auth::password::PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::forbidden("nope");
        assert_eq!(err.to_string(), "Forbidden: nope");
    }

    #[test]
    fn test_entitlement_codes_survive_mapping() {
        use uuid::Uuid;

        let err: ApiError = EntitlementError::QuotaExceeded(QuotaKind::Seats).into();
        assert!(matches!(
            err,
            ApiError::Conflict {
                code: "quota_exceeded_seats",
                ..
            }
        ));

        let err: ApiError = EntitlementError::ReadOnlyModeActive(Uuid::nil()).into();
        assert!(matches!(
            err,
            ApiError::Forbidden {
                code: "read_only_mode",
                ..
            }
        ));

        let err: ApiError = EntitlementError::NoMembership(Uuid::nil()).into();
        assert!(matches!(
            err,
            ApiError::Forbidden {
                code: "no_membership",
                ..
            }
        ));
    }

    #[test]
    fn test_validation_error_display() {
        let errors = vec![ValidationErrorDetail {
            field: "email".to_string(),
            message: "Invalid email format".to_string(),
        }];

        let err = ApiError::ValidationError(errors);
        assert_eq!(err.to_string(), "Validation failed: 1 errors");
    }
}
