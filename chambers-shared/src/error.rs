/// Entitlement and access-control error types
///
/// Every mutating or sensitive operation runs the same check pipeline:
/// authentication, permission resolution, subscription read-only check,
/// quota reservation. Each way that pipeline can refuse an operation has
/// its own variant here, and each variant maps to a stable machine-readable
/// code so API clients can distinguish denial kinds without parsing
/// human-readable messages.
///
/// # Example
///
/// ```
/// use chambers_shared::error::{EntitlementError, QuotaKind};
///
/// let err = EntitlementError::QuotaExceeded(QuotaKind::Seats);
/// assert_eq!(err.code(), "quota_exceeded_seats");
/// ```

use uuid::Uuid;

/// Which quota ceiling was hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    /// User seat ceiling (`max_users`)
    Seats,

    /// Storage byte ceiling (`max_storage_bytes`)
    Storage,
}

impl QuotaKind {
    /// Human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::Seats => "seats",
            QuotaKind::Storage => "storage",
        }
    }
}

/// Unified denial type for the entitlement pipeline
///
/// Checks are evaluated synchronously at the boundary of each operation.
/// On failure the operation must not proceed partially: no side effects
/// occur before all checks pass.
#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    /// No valid principal on the request
    #[error("No authenticated principal")]
    Unauthenticated,

    /// Principal has no active membership in the requested firm
    #[error("No active membership in firm {0}")]
    NoMembership(Uuid),

    /// Principal lacks the required permission or resource scope
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// The firm's subscription status forbids mutating operations
    #[error("Firm {0} is in read-only mode")]
    ReadOnlyModeActive(Uuid),

    /// A seat or storage ceiling would be exceeded
    #[error("{} quota exceeded", .0.as_str())]
    QuotaExceeded(QuotaKind),

    /// Firm record missing (stale session, deleted tenant)
    #[error("Firm not found: {0}")]
    FirmNotFound(Uuid),

    /// Stored permission keys failed catalog validation (data corruption)
    #[error("Invalid permission data: {0}")]
    InvalidPermissionData(String),

    /// Database error during a check
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EntitlementError {
    /// Stable error code for API clients
    ///
    /// These strings are part of the public contract; UI messaging keys
    /// off them.
    pub fn code(&self) -> &'static str {
        match self {
            EntitlementError::Unauthenticated => "unauthenticated",
            EntitlementError::NoMembership(_) => "no_membership",
            EntitlementError::Forbidden(_) => "forbidden",
            EntitlementError::ReadOnlyModeActive(_) => "read_only_mode",
            EntitlementError::QuotaExceeded(QuotaKind::Seats) => "quota_exceeded_seats",
            EntitlementError::QuotaExceeded(QuotaKind::Storage) => "quota_exceeded_storage",
            EntitlementError::FirmNotFound(_) => "firm_not_found",
            EntitlementError::InvalidPermissionData(_) => "internal_error",
            EntitlementError::Database(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_kind_as_str() {
        assert_eq!(QuotaKind::Seats.as_str(), "seats");
        assert_eq!(QuotaKind::Storage.as_str(), "storage");
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            EntitlementError::Unauthenticated,
            EntitlementError::NoMembership(Uuid::nil()),
            EntitlementError::Forbidden("case:edit".to_string()),
            EntitlementError::ReadOnlyModeActive(Uuid::nil()),
            EntitlementError::QuotaExceeded(QuotaKind::Seats),
            EntitlementError::QuotaExceeded(QuotaKind::Storage),
            EntitlementError::FirmNotFound(Uuid::nil()),
        ];

        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_display() {
        let err = EntitlementError::QuotaExceeded(QuotaKind::Storage);
        assert_eq!(err.to_string(), "storage quota exceeded");

        let err = EntitlementError::Forbidden("case:edit".to_string());
        assert!(err.to_string().contains("case:edit"));
    }
}
