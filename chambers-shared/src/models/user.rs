/// User model and database operations
///
/// This module provides the User model and CRUD operations for managing user
/// accounts. Users can belong to multiple firms via the Membership model; the
/// `active_firm_id` pointer tracks which firm the user is currently working
/// in and is re-pointed by the firm-switch flow (and cleared when the
/// membership behind it is removed).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email CITEXT NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     name VARCHAR(255),
///     global_role VARCHAR(50) NOT NULL DEFAULT 'user',
///     active_firm_id UUID REFERENCES firms(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use chambers_shared::models::user::{User, CreateUser};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let user = User::create(&pool, CreateUser {
///     email: "jane@lawfirm.example".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     name: Some("Jane Doe".to_string()),
/// }).await?;
///
/// let found = User::find_by_email(&pool, "jane@lawfirm.example").await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::catalog::GlobalRole;

/// User model representing an account on the platform
///
/// Passwords are stored as Argon2id hashes, never in plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Email address (case-insensitive via CITEXT)
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// Optional display name
    pub name: Option<String>,

    /// Platform-level role ("admin" or "user")
    ///
    /// Only consulted as a permission fallback for memberships that carry
    /// no firm role.
    pub global_role: String,

    /// The firm the user is currently working in (None until first login)
    pub active_firm_id: Option<Uuid>,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,

    /// When the user last logged in (None if never)
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Gets the parsed global role, defaulting to the minimal one
    pub fn get_global_role(&self) -> GlobalRole {
        GlobalRole::from_str(&self.global_role).unwrap_or(GlobalRole::User)
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address (stored lowercase via CITEXT)
    pub email: String,

    /// Argon2id password hash (NOT a plaintext password)
    pub password_hash: String,

    /// Optional display name
    pub name: Option<String>,
}

impl User {
    /// Creates a new user in the database
    ///
    /// # Errors
    ///
    /// Returns an error if the email already exists (unique constraint)
    /// or the database connection fails.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, name)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, name, global_role, active_firm_id,
                      created_at, updated_at, last_login_at
            "#,
        )
        .bind(data.email)
        .bind(data.password_hash)
        .bind(data.name)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, global_role, active_firm_id,
                   created_at, updated_at, last_login_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by email (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, global_role, active_firm_id,
                   created_at, updated_at, last_login_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Records a successful login
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Points the user at a new active firm
    ///
    /// Called by the firm-switch flow after the target membership has been
    /// validated. The session descriptor is reissued in the same operation.
    pub async fn set_active_firm(
        pool: &PgPool,
        id: Uuid,
        firm_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET active_firm_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(firm_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clears the active-firm pointer if it currently points at `firm_id`
    ///
    /// Called when a membership is removed, so the user does not keep a
    /// session context for a firm they no longer belong to.
    pub async fn clear_active_firm(
        pool: &PgPool,
        id: Uuid,
        firm_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET active_firm_id = NULL, updated_at = NOW()
            WHERE id = $1 AND active_firm_id = $2
            "#,
        )
        .bind(id)
        .bind(firm_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a user by ID
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(global_role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@b.example".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            name: None,
            global_role: global_role.to_string(),
            active_firm_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_get_global_role() {
        assert_eq!(sample_user("admin").get_global_role(), GlobalRole::Admin);
        assert_eq!(sample_user("user").get_global_role(), GlobalRole::User);
        // Unknown values degrade to the minimal role, never to admin
        assert_eq!(sample_user("superuser").get_global_role(), GlobalRole::User);
    }

    // Integration tests for database operations are in tests/ with a live database
}
