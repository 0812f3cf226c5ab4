/// Per-request authentication context
///
/// After the API layer validates a session descriptor, it attaches an
/// [`AuthContext`] to the request extensions. Handlers extract it to learn
/// which principal is acting and in which firm, then run the entitlement
/// pipeline (permission → read-only → quota) against that pair.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated principal and firm context for one request
///
/// Built from validated session claims; immutable for the request's
/// lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// Firm the session operates in
    pub firm_id: Uuid,
}

impl AuthContext {
    /// Creates a context from validated session claims
    pub fn new(user_id: Uuid, firm_id: Uuid) -> Self {
        Self { user_id, firm_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_carries_pair() {
        let user_id = Uuid::new_v4();
        let firm_id = Uuid::new_v4();
        let ctx = AuthContext::new(user_id, firm_id);
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.firm_id, firm_id);
    }
}
