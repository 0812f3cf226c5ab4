/// Role model and database operations
///
/// Roles are named bundles of permission keys plus an optional resource-scope
/// policy. Built-in roles (owner, admin, attorney, staff) have a NULL
/// `firm_id` and exist for every firm; firms may define additional roles of
/// their own.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE roles (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     firm_id UUID REFERENCES firms(id) ON DELETE CASCADE,
///     name VARCHAR(100) NOT NULL,
///     permissions TEXT[] NOT NULL DEFAULT '{}',
///     policy JSONB NOT NULL DEFAULT '[]',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (firm_id, name)
/// );
/// ```
///
/// The `policy` column holds scope rules, e.g. a role that may edit only the
/// cases assigned to the member:
///
/// ```json
/// [{"resource": "case", "action": "edit", "scope": "own"}]
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::catalog::{PermissionSet, UnknownPermission};
use crate::authz::gate::RolePolicy;

/// Role model: a firm-scoped (or built-in) permission bundle
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    /// Unique role ID
    pub id: Uuid,

    /// Owning firm (None for built-in roles)
    pub firm_id: Option<Uuid>,

    /// Role name, unique within the firm
    pub name: String,

    /// Granted permission keys (raw strings)
    pub permissions: Vec<String>,

    /// Resource-scope rules (JSONB)
    pub policy: serde_json::Value,

    /// When the role was created
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Parses the permission strings into a typed set
    pub fn permission_set(&self) -> Result<PermissionSet, UnknownPermission> {
        PermissionSet::from_strs(&self.permissions)
    }

    /// Parses the scope policy
    ///
    /// An empty or missing policy deserializes to no rules.
    pub fn scope_policy(&self) -> Result<RolePolicy, serde_json::Error> {
        RolePolicy::from_json(&self.policy)
    }
}

/// Input for creating a firm role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    /// Owning firm
    pub firm_id: Uuid,

    /// Role name
    pub name: String,

    /// Granted permissions
    pub permissions: Vec<String>,

    /// Scope rules (defaults to none)
    #[serde(default = "empty_policy")]
    pub policy: serde_json::Value,
}

fn empty_policy() -> serde_json::Value {
    serde_json::Value::Array(vec![])
}

impl Role {
    /// Creates a firm-scoped role
    pub async fn create(pool: &PgPool, data: CreateRole) -> Result<Self, sqlx::Error> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (firm_id, name, permissions, policy)
            VALUES ($1, $2, $3, $4)
            RETURNING id, firm_id, name, permissions, policy, created_at
            "#,
        )
        .bind(data.firm_id)
        .bind(data.name)
        .bind(data.permissions)
        .bind(data.policy)
        .fetch_one(pool)
        .await?;

        Ok(role)
    }

    /// Finds a role by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, firm_id, name, permissions, policy, created_at
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(role)
    }

    /// Finds a built-in role by name (firm_id IS NULL)
    pub async fn find_builtin(pool: &PgPool, name: &str) -> Result<Option<Self>, sqlx::Error> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, firm_id, name, permissions, policy, created_at
            FROM roles
            WHERE firm_id IS NULL AND name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(role)
    }

    /// Lists roles visible to a firm (its own plus the built-ins)
    pub async fn list_for_firm(pool: &PgPool, firm_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, firm_id, name, permissions, policy, created_at
            FROM roles
            WHERE firm_id = $1 OR firm_id IS NULL
            ORDER BY firm_id NULLS FIRST, name ASC
            "#,
        )
        .bind(firm_id)
        .fetch_all(pool)
        .await?;

        Ok(roles)
    }

    /// Deletes a firm role (built-ins cannot be deleted)
    pub async fn delete(pool: &PgPool, id: Uuid, firm_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1 AND firm_id = $2")
            .bind(id)
            .bind(firm_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::catalog::PermissionKey;
    use crate::authz::gate::{AccessScope, ResourceAction, ResourceKind};
    use serde_json::json;

    fn sample_role(permissions: Vec<String>, policy: serde_json::Value) -> Role {
        Role {
            id: Uuid::new_v4(),
            firm_id: Some(Uuid::new_v4()),
            name: "associate".to_string(),
            permissions,
            policy,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_permission_set_parses() {
        let role = sample_role(
            vec!["case:view".to_string(), "document:upload".to_string()],
            json!([]),
        );
        let set = role.permission_set().unwrap();
        assert!(set.contains(PermissionKey::CaseView));
        assert!(set.contains(PermissionKey::DocumentUpload));
    }

    #[test]
    fn test_permission_set_rejects_unknown() {
        let role = sample_role(vec!["case:view".to_string(), "nope".to_string()], json!([]));
        assert!(role.permission_set().is_err());
    }

    #[test]
    fn test_scope_policy_parses() {
        let role = sample_role(
            vec![],
            json!([{"resource": "case", "action": "edit", "scope": "own"}]),
        );
        let policy = role.scope_policy().unwrap();
        assert_eq!(
            policy.scope_for(ResourceKind::Case, ResourceAction::Edit),
            Some(AccessScope::Own)
        );
        assert_eq!(
            policy.scope_for(ResourceKind::Case, ResourceAction::Delete),
            None
        );
    }

    #[test]
    fn test_empty_policy_has_no_rules() {
        let role = sample_role(vec![], json!([]));
        let policy = role.scope_policy().unwrap();
        assert_eq!(
            policy.scope_for(ResourceKind::Case, ResourceAction::Edit),
            None
        );
    }

    // Integration tests for database operations are in tests/ with a live database
}
