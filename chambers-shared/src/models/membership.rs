/// Membership model and database operations
///
/// This module provides the Membership model binding users to firms. Each
/// membership carries an optional firm role plus an additive set of custom
/// permission overrides. There is exactly one membership per (user, firm)
/// pair, enforced by a unique constraint.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE memberships (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     firm_id UUID NOT NULL REFERENCES firms(id) ON DELETE CASCADE,
///     role_id UUID REFERENCES roles(id) ON DELETE SET NULL,
///     status membership_status NOT NULL DEFAULT 'active',
///     custom_permissions TEXT[] NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (user_id, firm_id)
/// );
/// ```
///
/// # Custom Permissions
///
/// `custom_permissions` is strictly additive: the effective permission set is
/// the union of the role's permissions and the overrides. There is no revoke
/// precedence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::catalog::{PermissionSet, UnknownPermission};

/// Lifecycle state of a membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    /// Counts against the seat quota; grants access
    Active,

    /// Suspended; grants no access
    Inactive,

    /// Awaiting join approval; grants no access
    Pending,
}

impl MembershipStatus {
    /// Status string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Inactive => "inactive",
            MembershipStatus::Pending => "pending",
        }
    }
}

/// Membership model representing a user ↔ firm relationship
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    /// Unique membership ID
    pub id: Uuid,

    /// User ID
    pub user_id: Uuid,

    /// Firm ID
    pub firm_id: Uuid,

    /// Firm role (None = fall back to the user's global role defaults)
    pub role_id: Option<Uuid>,

    /// Lifecycle status
    pub status: MembershipStatus,

    /// Additive per-membership permission overrides (raw key strings)
    pub custom_permissions: Vec<String>,

    /// When the membership was created
    pub created_at: DateTime<Utc>,
}

impl Membership {
    /// Parses the override strings into a typed permission set
    ///
    /// # Errors
    ///
    /// Fails on any key not in the catalog; a bad override row is a data
    /// error, not a silently-missing permission.
    pub fn custom_permission_set(&self) -> Result<PermissionSet, UnknownPermission> {
        PermissionSet::from_strs(&self.custom_permissions)
    }
}

/// Input for creating a new membership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    /// User ID
    pub user_id: Uuid,

    /// Firm ID
    pub firm_id: Uuid,

    /// Firm role to attach (optional)
    pub role_id: Option<Uuid>,

    /// Initial status (defaults to active)
    #[serde(default = "default_status")]
    pub status: MembershipStatus,
}

fn default_status() -> MembershipStatus {
    MembershipStatus::Active
}

impl Membership {
    /// Creates a new membership (adds a user to a firm)
    ///
    /// The caller is responsible for reserving a seat through the quota
    /// guard first; this method only inserts the row.
    ///
    /// # Errors
    ///
    /// Returns an error if the (user, firm) pair already exists or a
    /// foreign key is violated.
    pub async fn create(pool: &PgPool, data: CreateMembership) -> Result<Self, sqlx::Error> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (user_id, firm_id, role_id, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, firm_id, role_id, status, custom_permissions, created_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.firm_id)
        .bind(data.role_id)
        .bind(data.status)
        .fetch_one(pool)
        .await?;

        Ok(membership)
    }

    /// Finds a membership by (user, firm) regardless of status
    pub async fn find(
        pool: &PgPool,
        user_id: Uuid,
        firm_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT id, user_id, firm_id, role_id, status, custom_permissions, created_at
            FROM memberships
            WHERE user_id = $1 AND firm_id = $2
            "#,
        )
        .bind(user_id)
        .bind(firm_id)
        .fetch_optional(pool)
        .await?;

        Ok(membership)
    }

    /// Finds an active membership by (user, firm)
    ///
    /// This is the lookup the permission resolver uses: pending and
    /// inactive memberships grant nothing.
    pub async fn find_active(
        pool: &PgPool,
        user_id: Uuid,
        firm_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT id, user_id, firm_id, role_id, status, custom_permissions, created_at
            FROM memberships
            WHERE user_id = $1 AND firm_id = $2 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .bind(firm_id)
        .fetch_optional(pool)
        .await?;

        Ok(membership)
    }

    /// Updates a member's role
    pub async fn update_role(
        pool: &PgPool,
        user_id: Uuid,
        firm_id: Uuid,
        role_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships
            SET role_id = $3
            WHERE user_id = $1 AND firm_id = $2
            RETURNING id, user_id, firm_id, role_id, status, custom_permissions, created_at
            "#,
        )
        .bind(user_id)
        .bind(firm_id)
        .bind(role_id)
        .fetch_optional(pool)
        .await?;

        Ok(membership)
    }

    /// Replaces a member's custom permission overrides
    pub async fn update_custom_permissions(
        pool: &PgPool,
        user_id: Uuid,
        firm_id: Uuid,
        permissions: &PermissionSet,
    ) -> Result<Option<Self>, sqlx::Error> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships
            SET custom_permissions = $3
            WHERE user_id = $1 AND firm_id = $2
            RETURNING id, user_id, firm_id, role_id, status, custom_permissions, created_at
            "#,
        )
        .bind(user_id)
        .bind(firm_id)
        .bind(permissions.to_strings())
        .fetch_optional(pool)
        .await?;

        Ok(membership)
    }

    /// Deletes a membership (removes a user from a firm)
    ///
    /// The caller releases the seat and clears the user's active-firm
    /// pointer; see the members route for the full removal sequence.
    pub async fn delete(pool: &PgPool, user_id: Uuid, firm_id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM memberships WHERE user_id = $1 AND firm_id = $2")
                .bind(user_id)
                .bind(firm_id)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists all memberships of a firm
    pub async fn list_by_firm(pool: &PgPool, firm_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let memberships = sqlx::query_as::<_, Membership>(
            r#"
            SELECT id, user_id, firm_id, role_id, status, custom_permissions, created_at
            FROM memberships
            WHERE firm_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(firm_id)
        .fetch_all(pool)
        .await?;

        Ok(memberships)
    }

    /// Lists all firms a user belongs to
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let memberships = sqlx::query_as::<_, Membership>(
            r#"
            SELECT id, user_id, firm_id, role_id, status, custom_permissions, created_at
            FROM memberships
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(memberships)
    }

    /// Counts active memberships in a firm
    pub async fn count_active_by_firm(pool: &PgPool, firm_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM memberships WHERE firm_id = $1 AND status = 'active'",
        )
        .bind(firm_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::catalog::PermissionKey;

    fn sample_membership(custom: Vec<String>) -> Membership {
        Membership {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            firm_id: Uuid::new_v4(),
            role_id: None,
            status: MembershipStatus::Active,
            custom_permissions: custom,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(MembershipStatus::Active.as_str(), "active");
        assert_eq!(MembershipStatus::Inactive.as_str(), "inactive");
        assert_eq!(MembershipStatus::Pending.as_str(), "pending");
    }

    #[test]
    fn test_custom_permission_set_parses() {
        let m = sample_membership(vec!["case:edit".to_string(), "report:view".to_string()]);
        let set = m.custom_permission_set().unwrap();
        assert!(set.contains(PermissionKey::CaseEdit));
        assert!(set.contains(PermissionKey::ReportView));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_custom_permission_set_rejects_unknown() {
        let m = sample_membership(vec!["case:teleport".to_string()]);
        assert!(m.custom_permission_set().is_err());
    }

    #[test]
    fn test_default_status_is_active() {
        assert_eq!(default_status(), MembershipStatus::Active);
    }

    // Integration tests for database operations are in tests/ with a live database
}
