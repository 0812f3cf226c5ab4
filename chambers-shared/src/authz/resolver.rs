/// Effective permission resolution for a (user, firm) pair
///
/// The resolver computes the permission set a member actually holds:
/// the firm role's permissions unioned with the membership's additive
/// overrides. If the membership carries no firm role (legacy rows), a
/// default set inferred from the user's global role substitutes for the
/// role grant.
///
/// The computation itself is pure set union, idempotent and
/// order-independent, and lives in [`effective_permissions`] /
/// [`resolve_from_parts`] so it can be tested without a database. The async
/// entry points only do the row loading.
///
/// # Example
///
/// ```no_run
/// use chambers_shared::authz::resolver::{require_permission, resolve};
/// use chambers_shared::authz::catalog::PermissionKey;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid, firm_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let set = resolve(&pool, user_id, firm_id).await?;
/// println!("{} permissions", set.len());
///
/// require_permission(&pool, user_id, firm_id, PermissionKey::MemberInvite).await?;
/// # Ok(())
/// # }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::catalog::{GlobalRole, PermissionKey, PermissionSet};
use crate::authz::gate::RolePolicy;
use crate::error::EntitlementError;
use crate::models::membership::Membership;
use crate::models::role::Role;
use crate::models::user::User;

/// The resolved grant for a member: permissions plus the role's scope policy
///
/// The resource gate needs both; plain permission checks only use the set.
#[derive(Debug, Clone)]
pub struct ResolvedAccess {
    /// Effective permission set (role ∪ overrides)
    pub permissions: PermissionSet,

    /// The role's resource-scope policy (empty when falling back to the
    /// global role; fallbacks carry no scope rules)
    pub policy: RolePolicy,
}

/// Union of role permissions and membership overrides
///
/// Overrides are strictly additive; there is no revoke precedence.
pub fn effective_permissions(role: PermissionSet, overrides: PermissionSet) -> PermissionSet {
    role.union(overrides)
}

/// Pure resolution from already-loaded parts
///
/// `role` is the firm role's permissions and policy if the membership has
/// one; `fallback` is the user's global role, consulted only when it does
/// not.
pub fn resolve_from_parts(
    role: Option<(PermissionSet, RolePolicy)>,
    fallback: GlobalRole,
    overrides: PermissionSet,
) -> ResolvedAccess {
    let (role_permissions, policy) = match role {
        Some((permissions, policy)) => (permissions, policy),
        None => (fallback.fallback_permissions(), RolePolicy::default()),
    };

    ResolvedAccess {
        permissions: effective_permissions(role_permissions, overrides),
        policy,
    }
}

/// Resolves the full grant (permissions + scope policy) for a member
///
/// # Errors
///
/// - `NoMembership` if the user has no active membership in the firm
/// - `InvalidPermissionData` if stored keys fail catalog validation
pub async fn resolve_access(
    pool: &PgPool,
    user_id: Uuid,
    firm_id: Uuid,
) -> Result<ResolvedAccess, EntitlementError> {
    let membership = Membership::find_active(pool, user_id, firm_id)
        .await?
        .ok_or(EntitlementError::NoMembership(firm_id))?;

    let overrides = membership
        .custom_permission_set()
        .map_err(|e| EntitlementError::InvalidPermissionData(e.to_string()))?;

    let role = match membership.role_id {
        Some(role_id) => match Role::find_by_id(pool, role_id).await? {
            Some(role) => {
                let permissions = role
                    .permission_set()
                    .map_err(|e| EntitlementError::InvalidPermissionData(e.to_string()))?;
                let policy = role
                    .scope_policy()
                    .map_err(|e| EntitlementError::InvalidPermissionData(e.to_string()))?;
                Some((permissions, policy))
            }
            // Role row deleted out from under the membership: same fallback
            // as a legacy membership with no role at all
            None => None,
        },
        None => None,
    };

    let fallback = match role {
        Some(_) => GlobalRole::User, // unused when a role is present
        None => {
            let user = User::find_by_id(pool, user_id)
                .await?
                .ok_or(EntitlementError::Unauthenticated)?;
            user.get_global_role()
        }
    };

    Ok(resolve_from_parts(role, fallback, overrides))
}

/// Resolves the effective permission set for a member
pub async fn resolve(
    pool: &PgPool,
    user_id: Uuid,
    firm_id: Uuid,
) -> Result<PermissionSet, EntitlementError> {
    Ok(resolve_access(pool, user_id, firm_id).await?.permissions)
}

/// Requires a single firm-wide permission
///
/// # Errors
///
/// `Forbidden` if the resolved set lacks `key`; `NoMembership` if the user
/// is not an active member.
pub async fn require_permission(
    pool: &PgPool,
    user_id: Uuid,
    firm_id: Uuid,
    key: PermissionKey,
) -> Result<(), EntitlementError> {
    let permissions = resolve(pool, user_id, firm_id).await?;

    if !permissions.contains(key) {
        return Err(EntitlementError::Forbidden(key.as_str().to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::catalog::BuiltinRole;
    use crate::authz::gate::{AccessScope, ResourceAction, ResourceKind, ScopeRule};

    #[test]
    fn test_effective_permissions_is_union() {
        let role = PermissionSet::from_keys(&[PermissionKey::CaseView, PermissionKey::CaseEdit]);
        let overrides = PermissionSet::from_keys(&[PermissionKey::ReportView]);

        let effective = effective_permissions(role, overrides);
        assert!(effective.contains(PermissionKey::CaseView));
        assert!(effective.contains(PermissionKey::CaseEdit));
        assert!(effective.contains(PermissionKey::ReportView));
        assert_eq!(effective.len(), 3);
    }

    #[test]
    fn test_effective_permissions_order_independent() {
        let a = PermissionSet::from_keys(&[PermissionKey::CaseView]);
        let b = PermissionSet::from_keys(&[PermissionKey::MemberInvite]);

        assert_eq!(effective_permissions(a, b), effective_permissions(b, a));
    }

    #[test]
    fn test_effective_permissions_idempotent() {
        let role = BuiltinRole::Attorney.default_permissions();
        let overrides = PermissionSet::from_keys(&[PermissionKey::CaseDelete]);

        let once = effective_permissions(role, overrides);
        let twice = effective_permissions(once, overrides);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_overrides_are_additive_only() {
        // An override can never shrink the role grant: the union contains
        // everything the role grants even with empty overrides, and
        // anything extra the overrides add.
        let role = BuiltinRole::Staff.default_permissions();
        let effective = effective_permissions(role, PermissionSet::empty());
        assert_eq!(effective, role);

        let with_extra =
            effective_permissions(role, PermissionSet::from_keys(&[PermissionKey::CaseEdit]));
        for key in role.iter() {
            assert!(with_extra.contains(key));
        }
        assert!(with_extra.contains(PermissionKey::CaseEdit));
    }

    #[test]
    fn test_resolve_from_parts_with_role() {
        let policy = RolePolicy::new(vec![ScopeRule {
            resource: ResourceKind::Case,
            action: ResourceAction::Edit,
            scope: AccessScope::Own,
        }]);
        let role_perms = PermissionSet::from_keys(&[PermissionKey::CaseView]);
        let overrides = PermissionSet::from_keys(&[PermissionKey::ReportView]);

        let access = resolve_from_parts(
            Some((role_perms, policy.clone())),
            GlobalRole::Admin, // must be ignored when a role is present
            overrides,
        );

        assert!(access.permissions.contains(PermissionKey::CaseView));
        assert!(access.permissions.contains(PermissionKey::ReportView));
        assert!(!access.permissions.contains(PermissionKey::MemberInvite));
        assert_eq!(access.policy, policy);
    }

    #[test]
    fn test_resolve_from_parts_global_fallback() {
        let access = resolve_from_parts(None, GlobalRole::Admin, PermissionSet::empty());
        // Global admin falls back to the broad set
        assert!(access.permissions.contains(PermissionKey::MemberInvite));
        assert!(access.policy.is_empty());

        let access = resolve_from_parts(None, GlobalRole::User, PermissionSet::empty());
        // Regular user falls back to the minimal set
        assert!(access.permissions.contains(PermissionKey::CaseView));
        assert!(!access.permissions.contains(PermissionKey::CaseEdit));
    }

    #[test]
    fn test_fallback_still_unions_overrides() {
        let overrides = PermissionSet::from_keys(&[PermissionKey::DocumentUpload]);
        let access = resolve_from_parts(None, GlobalRole::User, overrides);
        assert!(access.permissions.contains(PermissionKey::DocumentUpload));
        assert!(access.permissions.contains(PermissionKey::CaseView));
    }

    // resolve()/require_permission() against live rows are covered by the
    // database integration tests
}
