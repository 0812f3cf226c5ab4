/// Resource-scoped permission gate
///
/// The gate answers "may this member perform this action on this specific
/// resource" on top of the firm-wide permission resolver:
///
/// 1. If the member's effective permission set contains the firm-wide key
///    for `(resource, action)`, allow.
/// 2. Otherwise, if the member's role carries an `"own"`-scoped rule for
///    `(resource, action)`, look up the resource's ownership fields
///    (`created_by` / `assigned_to`) and allow only when one of them is the
///    member.
/// 3. Otherwise deny.
///
/// The gate has no side effects; callers surface the denial as `Forbidden`.
/// Ownership lookups go through the [`OwnershipStore`] trait so the decision
/// logic never touches raw rows: the Postgres implementation reads the
/// resource tables, and an in-memory implementation backs the unit tests.
///
/// # Example
///
/// ```
/// use chambers_shared::authz::gate::{
///     evaluate_resource_access, AccessScope, ResourceAction, ResourceKind, ResourceOwnership,
///     RolePolicy, ScopeRule,
/// };
/// use chambers_shared::authz::resolver::ResolvedAccess;
/// use chambers_shared::authz::catalog::PermissionSet;
/// use uuid::Uuid;
///
/// let me = Uuid::new_v4();
/// let access = ResolvedAccess {
///     permissions: PermissionSet::empty(),
///     policy: RolePolicy::new(vec![ScopeRule {
///         resource: ResourceKind::Case,
///         action: ResourceAction::Edit,
///         scope: AccessScope::Own,
///     }]),
/// };
///
/// let mine = ResourceOwnership { created_by: Some(me), assigned_to: None };
/// assert!(evaluate_resource_access(&access, me, ResourceKind::Case, ResourceAction::Edit, Some(&mine)));
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::catalog::PermissionKey;
use crate::authz::resolver::ResolvedAccess;
use crate::error::EntitlementError;
use crate::models::case::LegalCase;
use crate::models::document::Document;

/// Resource types the gate can scope access to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Legal case / matter
    Case,

    /// Document metadata
    Document,
}

/// Actions on a scoped resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAction {
    /// Read the resource
    View,

    /// Create a resource of this kind
    Create,

    /// Modify the resource
    Edit,

    /// Remove the resource
    Delete,

    /// Register an upload (documents)
    Upload,
}

/// Scope qualifier on a role policy rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    /// Only resources the member created or is assigned to
    Own,
}

/// One scope rule of a role policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRule {
    /// Resource the rule applies to
    pub resource: ResourceKind,

    /// Action the rule applies to
    pub action: ResourceAction,

    /// Granted scope
    pub scope: AccessScope,
}

/// A role's resource-scope policy: a list of scope rules
///
/// Absence of a rule means the action is simply not grantable through
/// scoping; there is no implicit widening.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePolicy {
    rules: Vec<ScopeRule>,
}

impl RolePolicy {
    /// Builds a policy from rules
    pub fn new(rules: Vec<ScopeRule>) -> Self {
        RolePolicy { rules }
    }

    /// Parses a policy from its JSONB representation
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(RolePolicy::default());
        }
        serde_json::from_value(value.clone())
    }

    /// The scope granted for `(resource, action)`, if any
    pub fn scope_for(&self, resource: ResourceKind, action: ResourceAction) -> Option<AccessScope> {
        self.rules
            .iter()
            .find(|r| r.resource == resource && r.action == action)
            .map(|r| r.scope)
    }

    /// Whether the policy has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The firm-wide permission key for `(resource, action)`
///
/// Combinations without a key (e.g. editing a document's bytes) cannot be
/// granted firm-wide and fall through to scope rules, which will also find
/// nothing for them.
pub fn firm_wide_key(resource: ResourceKind, action: ResourceAction) -> Option<PermissionKey> {
    match (resource, action) {
        (ResourceKind::Case, ResourceAction::View) => Some(PermissionKey::CaseView),
        (ResourceKind::Case, ResourceAction::Create) => Some(PermissionKey::CaseCreate),
        (ResourceKind::Case, ResourceAction::Edit) => Some(PermissionKey::CaseEdit),
        (ResourceKind::Case, ResourceAction::Delete) => Some(PermissionKey::CaseDelete),
        (ResourceKind::Document, ResourceAction::View) => Some(PermissionKey::DocumentView),
        (ResourceKind::Document, ResourceAction::Upload) => Some(PermissionKey::DocumentUpload),
        (ResourceKind::Document, ResourceAction::Delete) => Some(PermissionKey::DocumentDelete),
        _ => None,
    }
}

/// Ownership fields of a resource row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceOwnership {
    /// Member who created the resource
    pub created_by: Option<Uuid>,

    /// Member the resource is assigned to
    pub assigned_to: Option<Uuid>,
}

impl ResourceOwnership {
    /// Whether the given member owns the resource through either field
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.created_by == Some(user_id) || self.assigned_to == Some(user_id)
    }
}

/// Typed lookup of a resource's ownership fields
///
/// Implementations return `None` for resources that do not exist in the
/// firm; the gate denies in that case.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    /// Fetches the ownership fields of `(resource, resource_id)` in `firm_id`
    async fn owner_of(
        &self,
        firm_id: Uuid,
        resource: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Option<ResourceOwnership>, sqlx::Error>;
}

/// Ownership lookup against the resource tables
pub struct PgOwnershipStore {
    pool: PgPool,
}

impl PgOwnershipStore {
    /// Creates a store over the given pool
    pub fn new(pool: PgPool) -> Self {
        PgOwnershipStore { pool }
    }
}

#[async_trait]
impl OwnershipStore for PgOwnershipStore {
    async fn owner_of(
        &self,
        firm_id: Uuid,
        resource: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Option<ResourceOwnership>, sqlx::Error> {
        match resource {
            ResourceKind::Case => {
                let case = LegalCase::find_in_firm(&self.pool, firm_id, resource_id).await?;
                Ok(case.map(|c| ResourceOwnership {
                    created_by: Some(c.created_by),
                    assigned_to: c.assigned_to,
                }))
            }
            ResourceKind::Document => {
                let doc = Document::find_in_firm(&self.pool, firm_id, resource_id).await?;
                Ok(doc.map(|d| ResourceOwnership {
                    created_by: Some(d.created_by),
                    assigned_to: None,
                }))
            }
        }
    }
}

/// In-memory ownership store for tests
#[derive(Default)]
pub struct StaticOwnershipStore {
    entries: std::sync::Mutex<Vec<(Uuid, ResourceKind, Uuid, ResourceOwnership)>>,
}

impl StaticOwnershipStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource's ownership
    pub fn insert(
        &self,
        firm_id: Uuid,
        resource: ResourceKind,
        resource_id: Uuid,
        ownership: ResourceOwnership,
    ) {
        self.entries
            .lock()
            .expect("ownership store lock")
            .push((firm_id, resource, resource_id, ownership));
    }
}

#[async_trait]
impl OwnershipStore for StaticOwnershipStore {
    async fn owner_of(
        &self,
        firm_id: Uuid,
        resource: ResourceKind,
        resource_id: Uuid,
    ) -> Result<Option<ResourceOwnership>, sqlx::Error> {
        let entries = self.entries.lock().expect("ownership store lock");
        Ok(entries
            .iter()
            .find(|(f, r, id, _)| *f == firm_id && *r == resource && *id == resource_id)
            .map(|(_, _, _, o)| *o))
    }
}

/// Pure gate decision
///
/// `ownership` is the resource's ownership fields if the caller fetched
/// them (None means the resource was not found, or was not fetched because
/// no scope rule applies; both deny).
pub fn evaluate_resource_access(
    access: &ResolvedAccess,
    user_id: Uuid,
    resource: ResourceKind,
    action: ResourceAction,
    ownership: Option<&ResourceOwnership>,
) -> bool {
    if let Some(key) = firm_wide_key(resource, action) {
        if access.permissions.contains(key) {
            return true;
        }
    }

    match access.policy.scope_for(resource, action) {
        Some(AccessScope::Own) => ownership.map_or(false, |o| o.is_owned_by(user_id)),
        None => false,
    }
}

/// Checks resource-scoped authorization, fetching ownership only when a
/// scope rule makes it relevant
///
/// Returns `Ok(true)`/`Ok(false)`; infrastructure failures are errors.
pub async fn check_resource_permission(
    access: &ResolvedAccess,
    ownership_store: &dyn OwnershipStore,
    user_id: Uuid,
    firm_id: Uuid,
    resource: ResourceKind,
    resource_id: Uuid,
    action: ResourceAction,
) -> Result<bool, EntitlementError> {
    // Firm-wide key short-circuits without touching the resource
    if let Some(key) = firm_wide_key(resource, action) {
        if access.permissions.contains(key) {
            return Ok(true);
        }
    }

    let ownership = match access.policy.scope_for(resource, action) {
        Some(AccessScope::Own) => ownership_store.owner_of(firm_id, resource, resource_id).await?,
        None => return Ok(false),
    };

    Ok(evaluate_resource_access(access, user_id, resource, action, ownership.as_ref()))
}

/// Like [`check_resource_permission`] but surfaces denial as `Forbidden`
pub async fn require_resource_permission(
    access: &ResolvedAccess,
    ownership_store: &dyn OwnershipStore,
    user_id: Uuid,
    firm_id: Uuid,
    resource: ResourceKind,
    resource_id: Uuid,
    action: ResourceAction,
) -> Result<(), EntitlementError> {
    let allowed = check_resource_permission(
        access,
        ownership_store,
        user_id,
        firm_id,
        resource,
        resource_id,
        action,
    )
    .await?;

    if !allowed {
        return Err(EntitlementError::Forbidden(format!(
            "{:?}:{:?} on {}",
            resource, action, resource_id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::catalog::PermissionSet;

    fn access_with(permissions: PermissionSet, rules: Vec<ScopeRule>) -> ResolvedAccess {
        ResolvedAccess {
            permissions,
            policy: RolePolicy::new(rules),
        }
    }

    fn own_rule(resource: ResourceKind, action: ResourceAction) -> ScopeRule {
        ScopeRule {
            resource,
            action,
            scope: AccessScope::Own,
        }
    }

    #[test]
    fn test_firm_wide_key_allows_without_ownership() {
        let access = access_with(
            PermissionSet::from_keys(&[PermissionKey::CaseEdit]),
            vec![],
        );
        let user = Uuid::new_v4();

        assert!(evaluate_resource_access(
            &access,
            user,
            ResourceKind::Case,
            ResourceAction::Edit,
            None,
        ));
    }

    #[test]
    fn test_own_scope_allows_creator_and_assignee() {
        let me = Uuid::new_v4();
        let access = access_with(
            PermissionSet::empty(),
            vec![own_rule(ResourceKind::Case, ResourceAction::Edit)],
        );

        let created = ResourceOwnership {
            created_by: Some(me),
            assigned_to: None,
        };
        let assigned = ResourceOwnership {
            created_by: Some(Uuid::new_v4()),
            assigned_to: Some(me),
        };
        let neither = ResourceOwnership {
            created_by: Some(Uuid::new_v4()),
            assigned_to: Some(Uuid::new_v4()),
        };

        let check = |o: &ResourceOwnership| {
            evaluate_resource_access(&access, me, ResourceKind::Case, ResourceAction::Edit, Some(o))
        };
        assert!(check(&created));
        assert!(check(&assigned));
        assert!(!check(&neither));
    }

    #[test]
    fn test_denies_without_key_and_without_ownership() {
        // Own-scoped rule present but the resource belongs to someone else
        let me = Uuid::new_v4();
        let access = access_with(
            PermissionSet::empty(),
            vec![own_rule(ResourceKind::Case, ResourceAction::Edit)],
        );
        let theirs = ResourceOwnership {
            created_by: Some(Uuid::new_v4()),
            assigned_to: None,
        };

        assert!(!evaluate_resource_access(
            &access,
            me,
            ResourceKind::Case,
            ResourceAction::Edit,
            Some(&theirs),
        ));
    }

    #[test]
    fn test_absent_scope_rule_is_not_grantable() {
        // Role can view firm-wide and edit own cases is NOT granted: the
        // member is assigned to the case, but no edit rule exists, so the
        // assignment is irrelevant.
        let me = Uuid::new_v4();
        let access = access_with(PermissionSet::from_keys(&[PermissionKey::CaseView]), vec![]);
        let mine = ResourceOwnership {
            created_by: None,
            assigned_to: Some(me),
        };

        assert!(!evaluate_resource_access(
            &access,
            me,
            ResourceKind::Case,
            ResourceAction::Edit,
            Some(&mine),
        ));
    }

    #[test]
    fn test_missing_resource_denies() {
        let me = Uuid::new_v4();
        let access = access_with(
            PermissionSet::empty(),
            vec![own_rule(ResourceKind::Document, ResourceAction::Delete)],
        );

        assert!(!evaluate_resource_access(
            &access,
            me,
            ResourceKind::Document,
            ResourceAction::Delete,
            None,
        ));
    }

    #[tokio::test]
    async fn test_check_skips_ownership_lookup_on_firm_wide_key() {
        // Store is empty: if the lookup happened, it would find nothing and
        // deny. The firm-wide key must short-circuit before that.
        let store = StaticOwnershipStore::new();
        let access = access_with(
            PermissionSet::from_keys(&[PermissionKey::CaseView]),
            vec![],
        );
        let user = Uuid::new_v4();

        let allowed = check_resource_permission(
            &access,
            &store,
            user,
            Uuid::new_v4(),
            ResourceKind::Case,
            Uuid::new_v4(),
            ResourceAction::View,
        )
        .await
        .unwrap();

        assert!(allowed);
    }

    #[tokio::test]
    async fn test_require_surfaces_forbidden() {
        let store = StaticOwnershipStore::new();
        let access = access_with(PermissionSet::empty(), vec![]);
        let user = Uuid::new_v4();

        let result = require_resource_permission(
            &access,
            &store,
            user,
            Uuid::new_v4(),
            ResourceKind::Case,
            Uuid::new_v4(),
            ResourceAction::Edit,
        )
        .await;

        assert!(matches!(result, Err(EntitlementError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_own_scope_via_store() {
        let me = Uuid::new_v4();
        let firm = Uuid::new_v4();
        let case_id = Uuid::new_v4();

        let store = StaticOwnershipStore::new();
        store.insert(
            firm,
            ResourceKind::Case,
            case_id,
            ResourceOwnership {
                created_by: Some(me),
                assigned_to: None,
            },
        );

        let access = access_with(
            PermissionSet::empty(),
            vec![own_rule(ResourceKind::Case, ResourceAction::Edit)],
        );

        let allowed = check_resource_permission(
            &access,
            &store,
            me,
            firm,
            ResourceKind::Case,
            case_id,
            ResourceAction::Edit,
        )
        .await
        .unwrap();
        assert!(allowed);

        // Another firm's identical case ID does not resolve
        let other_firm = check_resource_permission(
            &access,
            &store,
            me,
            Uuid::new_v4(),
            ResourceKind::Case,
            case_id,
            ResourceAction::Edit,
        )
        .await
        .unwrap();
        assert!(!other_firm);
    }

    #[test]
    fn test_policy_json_roundtrip() {
        let policy = RolePolicy::new(vec![own_rule(ResourceKind::Case, ResourceAction::Edit)]);
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"resource": "case", "action": "edit", "scope": "own"}])
        );
        assert_eq!(RolePolicy::from_json(&json).unwrap(), policy);
    }

    #[test]
    fn test_policy_null_is_empty() {
        let policy = RolePolicy::from_json(&serde_json::Value::Null).unwrap();
        assert!(policy.is_empty());
    }
}
