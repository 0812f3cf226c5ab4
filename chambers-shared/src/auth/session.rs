/// Session descriptor creation and validation
///
/// A session descriptor is a signed, immutable JWT binding a user to their
/// current firm context. All fields are fixed at construction: switching
/// firms never mutates a live descriptor: the old one is discarded and a
/// whole new descriptor is issued for the target firm, so a session can
/// never observe a half-updated (user, firm) pair.
///
/// # Security
///
/// - **Algorithm**: HS256 (HMAC-SHA256)
/// - **Expiration**: 24 hours for access descriptors, 30 days for refresh
/// - **Validation**: signature, expiration, issuer, and not-before checks
/// - **Secret**: at least 32 bytes, from configuration
///
/// # Example
///
/// ```
/// use chambers_shared::auth::session::{create_token, validate_token, SessionClaims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let firm_id = Uuid::new_v4();
///
/// let claims = SessionClaims::new(user_id, firm_id, TokenType::Access);
/// let token = create_token(&claims, "a-secret-key-at-least-32-bytes-long")?;
///
/// let validated = validate_token(&token, "a-secret-key-at-least-32-bytes-long")?;
/// assert_eq!(validated.sub, user_id);
/// assert_eq!(validated.firm_id, firm_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token issuer claim
const ISSUER: &str = "chambers";

/// Error type for session token operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Invalid issuer
    #[error("Invalid token issuer")]
    InvalidIssuer,
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Access token (short-lived, 24 hours)
    Access,

    /// Refresh token (long-lived, 30 days)
    Refresh,
}

impl TokenType {
    /// Default expiration duration for the token type
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
        }
    }
}

/// Session descriptor claims
///
/// Standard JWT claims plus the firm context. The struct is a value: a
/// firm switch builds a new one with [`SessionClaims::new`] rather than
/// editing `firm_id` on an existing descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: user ID
    pub sub: Uuid,

    /// Issuer: always "chambers"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// The firm this session operates in (custom claim)
    pub firm_id: Uuid,

    /// Token type (custom claim)
    pub token_type: TokenType,
}

impl SessionClaims {
    /// Creates claims with the default expiration for the token type
    pub fn new(user_id: Uuid, firm_id: Uuid, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, firm_id, token_type, token_type.default_expiration())
    }

    /// Creates claims with a custom expiration
    pub fn with_expiration(
        user_id: Uuid,
        firm_id: Uuid,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();
        let expiration = now + expires_in;

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            nbf: now.timestamp(),
            firm_id,
            token_type,
        }
    }

    /// Whether the descriptor has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// A freshly issued access/refresh token pair
///
/// Issued on login, on refresh, and on firm switch (where both tokens are
/// reissued for the new firm atomically).
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

/// Issues a full token pair for a (user, firm) context
pub fn issue_session(
    user_id: Uuid,
    firm_id: Uuid,
    secret: &str,
) -> Result<SessionTokens, SessionError> {
    let access = create_token(&SessionClaims::new(user_id, firm_id, TokenType::Access), secret)?;
    let refresh = create_token(
        &SessionClaims::new(user_id, firm_id, TokenType::Refresh),
        secret,
    )?;

    Ok(SessionTokens {
        access_token: access,
        refresh_token: refresh,
    })
}

/// Signs a descriptor with HS256
pub fn create_token(claims: &SessionClaims, secret: &str) -> Result<String, SessionError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| SessionError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates a descriptor and extracts its claims
///
/// Verifies the signature, expiration, issuer, and not-before time.
pub fn validate_token(token: &str, secret: &str) -> Result<SessionClaims, SessionError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => SessionError::InvalidIssuer,
            _ => SessionError::ValidationError(format!("Token validation failed: {}", e)),
        }
    })?;

    Ok(token_data.claims)
}

/// Validates a token and checks it is an access token
pub fn validate_access_token(token: &str, secret: &str) -> Result<SessionClaims, SessionError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != TokenType::Access {
        return Err(SessionError::ValidationError(
            "Expected access token, got refresh token".to_string(),
        ));
    }

    Ok(claims)
}

/// Validates a token and checks it is a refresh token
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<SessionClaims, SessionError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != TokenType::Refresh {
        return Err(SessionError::ValidationError(
            "Expected refresh token, got access token".to_string(),
        ));
    }

    Ok(claims)
}

/// Exchanges a valid refresh token for a new access token
///
/// The new access token carries the same (user, firm) context.
pub fn refresh_access_token(refresh_token: &str, secret: &str) -> Result<String, SessionError> {
    let refresh_claims = validate_refresh_token(refresh_token, secret)?;

    let access_claims = SessionClaims::new(
        refresh_claims.sub,
        refresh_claims.firm_id,
        TokenType::Access,
    );

    create_token(&access_claims, secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_token_type_expiration() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::hours(24));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
    }

    #[test]
    fn test_create_and_validate() {
        let user_id = Uuid::new_v4();
        let firm_id = Uuid::new_v4();

        let claims = SessionClaims::new(user_id, firm_id, TokenType::Access);
        let token = create_token(&claims, SECRET).expect("create");

        let validated = validate_token(&token, SECRET).expect("validate");
        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.firm_id, firm_id);
        assert_eq!(validated.iss, "chambers");
        assert_eq!(validated.token_type, TokenType::Access);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = SessionClaims::new(Uuid::new_v4(), Uuid::new_v4(), TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();

        assert!(validate_token(&token, "another-secret-of-enough-length!").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = SessionClaims::with_expiration(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TokenType::Access,
            Duration::seconds(-3600),
        );
        assert!(claims.is_expired());

        let token = create_token(&claims, SECRET).unwrap();
        let result = validate_token(&token, SECRET);
        assert!(matches!(result, Err(SessionError::Expired)));
    }

    #[test]
    fn test_token_type_enforcement() {
        let access = create_token(
            &SessionClaims::new(Uuid::new_v4(), Uuid::new_v4(), TokenType::Access),
            SECRET,
        )
        .unwrap();
        let refresh = create_token(
            &SessionClaims::new(Uuid::new_v4(), Uuid::new_v4(), TokenType::Refresh),
            SECRET,
        )
        .unwrap();

        assert!(validate_access_token(&access, SECRET).is_ok());
        assert!(validate_access_token(&refresh, SECRET).is_err());
        assert!(validate_refresh_token(&refresh, SECRET).is_ok());
        assert!(validate_refresh_token(&access, SECRET).is_err());
    }

    #[test]
    fn test_refresh_preserves_context() {
        let user_id = Uuid::new_v4();
        let firm_id = Uuid::new_v4();

        let refresh = create_token(
            &SessionClaims::new(user_id, firm_id, TokenType::Refresh),
            SECRET,
        )
        .unwrap();

        let new_access = refresh_access_token(&refresh, SECRET).unwrap();
        let validated = validate_access_token(&new_access, SECRET).unwrap();
        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.firm_id, firm_id);
    }

    #[test]
    fn test_refresh_with_access_token_fails() {
        let access = create_token(
            &SessionClaims::new(Uuid::new_v4(), Uuid::new_v4(), TokenType::Access),
            SECRET,
        )
        .unwrap();

        assert!(refresh_access_token(&access, SECRET).is_err());
    }

    #[test]
    fn test_firm_switch_issues_new_descriptor() {
        let user_id = Uuid::new_v4();
        let firm_a = Uuid::new_v4();
        let firm_b = Uuid::new_v4();

        let before = issue_session(user_id, firm_a, SECRET).unwrap();
        let after = issue_session(user_id, firm_b, SECRET).unwrap();

        // The old descriptor still names firm A; the new one names firm B.
        // Nothing was mutated in place.
        let old = validate_access_token(&before.access_token, SECRET).unwrap();
        let new = validate_access_token(&after.access_token, SECRET).unwrap();
        assert_eq!(old.firm_id, firm_a);
        assert_eq!(new.firm_id, firm_b);
        assert_eq!(old.sub, new.sub);
    }
}
