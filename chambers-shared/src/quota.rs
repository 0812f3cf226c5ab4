/// Quota enforcement for seats and storage
///
/// Firms carry two countable ceilings: user seats (`max_users`) and storage
/// bytes (`max_storage_bytes`), both nullable meaning unlimited. The guard
/// enforces them with a check-and-increment that is a single atomic
/// operation against the persisted counter, never a read-then-write pair,
/// so two concurrent reservations can never both pass a stale check and
/// commit past the ceiling.
///
/// # Backends
///
/// The guard works against a small [`UsageStore`] interface with two
/// implementations:
///
/// - [`PgUsageStore`]: a conditional UPDATE on the firms row. The WHERE
///   clause re-checks the ceiling against the post-increment value, so
///   atomicity holds across every API instance sharing the database.
/// - [`LocalUsageStore`]: an in-process mutex-guarded map. Reservations are
///   atomic within one process only; running more than one instance against
///   this backend loses the cross-instance guarantee. Intended for tests
///   and single-instance deployments.
///
/// Releases never require a ceiling check and clamp at zero; driving a
/// counter negative is logged as an anomaly.
///
/// # Example
///
/// ```no_run
/// use chambers_shared::quota::QuotaGuard;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, firm_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let guard = QuotaGuard::postgres(pool);
///
/// // Reserve 5 MB before registering a document
/// guard.reserve_storage(firm_id, 5 * 1024 * 1024).await?;
///
/// // Release it again when the document is deleted
/// guard.release_storage(firm_id, 5 * 1024 * 1024).await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{EntitlementError, QuotaKind};

/// A firm's usage counters and ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmUsage {
    /// Seat ceiling (None = unlimited)
    pub max_users: Option<i32>,

    /// Active seats in use
    pub current_users: i32,

    /// Storage ceiling in bytes (None = unlimited)
    pub max_storage_bytes: Option<i64>,

    /// Storage reserved, in bytes
    pub storage_used_bytes: i64,
}

impl FirmUsage {
    /// Whether another seat fits under the ceiling
    pub fn has_user_seats(&self) -> bool {
        match self.max_users {
            None => true,
            Some(max) => self.current_users < max,
        }
    }

    /// Whether `bytes_to_add` fits under the storage ceiling
    pub fn has_storage_space(&self, bytes_to_add: i64) -> bool {
        match self.max_storage_bytes {
            None => true,
            Some(max) => self.storage_used_bytes + bytes_to_add <= max,
        }
    }
}

/// Outcome of an atomic reservation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The counter was incremented within the ceiling
    Reserved,

    /// The increment would exceed the ceiling; counter unchanged
    Exceeded,

    /// No such firm
    NotFound,
}

/// Atomic counter backend for firm usage
///
/// All writers of the usage counters (membership add/remove, document
/// register/delete, the reconciler) go through the same store so they share
/// one atomic-update discipline. Readers that only display usage may read
/// without reserving; staleness there is cosmetic.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Reads a firm's counters and ceilings
    async fn usage(&self, firm_id: Uuid) -> Result<Option<FirmUsage>, sqlx::Error>;

    /// Atomically reserves one seat
    async fn try_reserve_seat(&self, firm_id: Uuid) -> Result<ReserveOutcome, sqlx::Error>;

    /// Atomically reserves `bytes` of storage
    async fn try_reserve_storage(
        &self,
        firm_id: Uuid,
        bytes: i64,
    ) -> Result<ReserveOutcome, sqlx::Error>;

    /// Releases one seat, clamping at zero
    async fn release_seat(&self, firm_id: Uuid) -> Result<(), sqlx::Error>;

    /// Releases `bytes` of storage, clamping at zero
    async fn release_storage(&self, firm_id: Uuid, bytes: i64) -> Result<(), sqlx::Error>;
}

/// Usage store backed by a conditional UPDATE on the firms table
///
/// The ceiling check and the increment are one statement, so concurrent
/// reservations serialize on the row and the post-increment value can never
/// exceed the ceiling regardless of interleaving or instance count.
pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    /// Creates a store over the given pool
    pub fn new(pool: PgPool) -> Self {
        PgUsageStore { pool }
    }

    async fn firm_exists(&self, firm_id: Uuid) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM firms WHERE id = $1)")
            .bind(firm_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn usage(&self, firm_id: Uuid) -> Result<Option<FirmUsage>, sqlx::Error> {
        let row: Option<(Option<i32>, i32, Option<i64>, i64)> = sqlx::query_as(
            r#"
            SELECT max_users, current_users, max_storage_bytes, storage_used_bytes
            FROM firms
            WHERE id = $1
            "#,
        )
        .bind(firm_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(max_users, current_users, max_storage_bytes, storage_used_bytes)| FirmUsage {
                max_users,
                current_users,
                max_storage_bytes,
                storage_used_bytes,
            },
        ))
    }

    async fn try_reserve_seat(&self, firm_id: Uuid) -> Result<ReserveOutcome, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE firms
            SET current_users = current_users + 1, updated_at = NOW()
            WHERE id = $1
              AND (max_users IS NULL OR current_users < max_users)
            "#,
        )
        .bind(firm_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(ReserveOutcome::Reserved);
        }

        if self.firm_exists(firm_id).await? {
            Ok(ReserveOutcome::Exceeded)
        } else {
            Ok(ReserveOutcome::NotFound)
        }
    }

    async fn try_reserve_storage(
        &self,
        firm_id: Uuid,
        bytes: i64,
    ) -> Result<ReserveOutcome, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE firms
            SET storage_used_bytes = storage_used_bytes + $2, updated_at = NOW()
            WHERE id = $1
              AND (max_storage_bytes IS NULL
                   OR storage_used_bytes + $2 <= max_storage_bytes)
            "#,
        )
        .bind(firm_id)
        .bind(bytes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(ReserveOutcome::Reserved);
        }

        if self.firm_exists(firm_id).await? {
            Ok(ReserveOutcome::Exceeded)
        } else {
            Ok(ReserveOutcome::NotFound)
        }
    }

    async fn release_seat(&self, firm_id: Uuid) -> Result<(), sqlx::Error> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            WITH prev AS (
                SELECT current_users FROM firms WHERE id = $1
            )
            UPDATE firms
            SET current_users = GREATEST(current_users - 1, 0), updated_at = NOW()
            WHERE id = $1
            RETURNING (SELECT current_users FROM prev)
            "#,
        )
        .bind(firm_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((before,)) = row {
            if before < 1 {
                tracing::warn!(
                    firm_id = %firm_id,
                    "Seat release on a zero counter, clamped"
                );
            }
        }

        Ok(())
    }

    async fn release_storage(&self, firm_id: Uuid, bytes: i64) -> Result<(), sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            WITH prev AS (
                SELECT storage_used_bytes FROM firms WHERE id = $1
            )
            UPDATE firms
            SET storage_used_bytes = GREATEST(storage_used_bytes - $2, 0), updated_at = NOW()
            WHERE id = $1
            RETURNING (SELECT storage_used_bytes FROM prev)
            "#,
        )
        .bind(firm_id)
        .bind(bytes)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((before,)) = row {
            if before < bytes {
                tracing::warn!(
                    firm_id = %firm_id,
                    release_bytes = bytes,
                    counter_bytes = before,
                    "Storage release larger than counter, clamped at zero"
                );
            }
        }

        Ok(())
    }
}

/// In-process usage store
///
/// Check-and-increment runs under one mutex, so reservations are atomic
/// within this process. There is no cross-instance coordination: a
/// deployment with more than one API instance must use [`PgUsageStore`] to
/// keep the ceiling guarantee.
#[derive(Default)]
pub struct LocalUsageStore {
    firms: Mutex<HashMap<Uuid, FirmUsage>>,
}

impl LocalUsageStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a firm's counters
    pub fn insert_firm(&self, firm_id: Uuid, usage: FirmUsage) {
        self.firms
            .lock()
            .expect("usage store lock")
            .insert(firm_id, usage);
    }

    /// Reads a firm's counters (None if unknown)
    pub fn get(&self, firm_id: Uuid) -> Option<FirmUsage> {
        self.firms
            .lock()
            .expect("usage store lock")
            .get(&firm_id)
            .copied()
    }
}

#[async_trait]
impl UsageStore for LocalUsageStore {
    async fn usage(&self, firm_id: Uuid) -> Result<Option<FirmUsage>, sqlx::Error> {
        Ok(self.get(firm_id))
    }

    async fn try_reserve_seat(&self, firm_id: Uuid) -> Result<ReserveOutcome, sqlx::Error> {
        let mut firms = self.firms.lock().expect("usage store lock");
        let Some(usage) = firms.get_mut(&firm_id) else {
            return Ok(ReserveOutcome::NotFound);
        };

        if !usage.has_user_seats() {
            return Ok(ReserveOutcome::Exceeded);
        }
        usage.current_users += 1;
        Ok(ReserveOutcome::Reserved)
    }

    async fn try_reserve_storage(
        &self,
        firm_id: Uuid,
        bytes: i64,
    ) -> Result<ReserveOutcome, sqlx::Error> {
        let mut firms = self.firms.lock().expect("usage store lock");
        let Some(usage) = firms.get_mut(&firm_id) else {
            return Ok(ReserveOutcome::NotFound);
        };

        if !usage.has_storage_space(bytes) {
            return Ok(ReserveOutcome::Exceeded);
        }
        usage.storage_used_bytes += bytes;
        Ok(ReserveOutcome::Reserved)
    }

    async fn release_seat(&self, firm_id: Uuid) -> Result<(), sqlx::Error> {
        let mut firms = self.firms.lock().expect("usage store lock");
        if let Some(usage) = firms.get_mut(&firm_id) {
            if usage.current_users < 1 {
                tracing::warn!(firm_id = %firm_id, "Seat release on a zero counter, clamped");
            }
            usage.current_users = (usage.current_users - 1).max(0);
        }
        Ok(())
    }

    async fn release_storage(&self, firm_id: Uuid, bytes: i64) -> Result<(), sqlx::Error> {
        let mut firms = self.firms.lock().expect("usage store lock");
        if let Some(usage) = firms.get_mut(&firm_id) {
            if usage.storage_used_bytes < bytes {
                tracing::warn!(
                    firm_id = %firm_id,
                    release_bytes = bytes,
                    counter_bytes = usage.storage_used_bytes,
                    "Storage release larger than counter, clamped at zero"
                );
            }
            usage.storage_used_bytes = (usage.storage_used_bytes - bytes).max(0);
        }
        Ok(())
    }
}

/// Quota guard: ceiling checks and atomic reservations
pub struct QuotaGuard {
    store: Arc<dyn UsageStore>,
}

impl QuotaGuard {
    /// Creates a guard over any usage store
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        QuotaGuard { store }
    }

    /// Creates a guard over the Postgres-backed store
    pub fn postgres(pool: PgPool) -> Self {
        QuotaGuard::new(Arc::new(PgUsageStore::new(pool)))
    }

    /// Whether the firm has a free seat
    pub async fn has_user_seats(&self, firm_id: Uuid) -> Result<bool, EntitlementError> {
        let usage = self
            .store
            .usage(firm_id)
            .await?
            .ok_or(EntitlementError::FirmNotFound(firm_id))?;

        Ok(usage.has_user_seats())
    }

    /// Whether `bytes_to_add` fits under the firm's storage ceiling
    pub async fn has_storage_space(
        &self,
        firm_id: Uuid,
        bytes_to_add: i64,
    ) -> Result<bool, EntitlementError> {
        let usage = self
            .store
            .usage(firm_id)
            .await?
            .ok_or(EntitlementError::FirmNotFound(firm_id))?;

        Ok(usage.has_storage_space(bytes_to_add))
    }

    /// Atomically reserves one seat
    ///
    /// # Errors
    ///
    /// `QuotaExceeded(Seats)` if the firm is at its ceiling; the counter is
    /// unchanged in that case.
    pub async fn reserve_seat(&self, firm_id: Uuid) -> Result<(), EntitlementError> {
        match self.store.try_reserve_seat(firm_id).await? {
            ReserveOutcome::Reserved => Ok(()),
            ReserveOutcome::Exceeded => Err(EntitlementError::QuotaExceeded(QuotaKind::Seats)),
            ReserveOutcome::NotFound => Err(EntitlementError::FirmNotFound(firm_id)),
        }
    }

    /// Atomically reserves storage bytes
    ///
    /// # Errors
    ///
    /// `QuotaExceeded(Storage)` if the increment would pass the ceiling;
    /// the counter is unchanged in that case.
    pub async fn reserve_storage(
        &self,
        firm_id: Uuid,
        bytes: i64,
    ) -> Result<(), EntitlementError> {
        match self.store.try_reserve_storage(firm_id, bytes).await? {
            ReserveOutcome::Reserved => Ok(()),
            ReserveOutcome::Exceeded => Err(EntitlementError::QuotaExceeded(QuotaKind::Storage)),
            ReserveOutcome::NotFound => Err(EntitlementError::FirmNotFound(firm_id)),
        }
    }

    /// Releases one seat (membership removed)
    pub async fn release_seat(&self, firm_id: Uuid) -> Result<(), EntitlementError> {
        self.store.release_seat(firm_id).await?;
        Ok(())
    }

    /// Releases storage bytes (document deleted)
    pub async fn release_storage(&self, firm_id: Uuid, bytes: i64) -> Result<(), EntitlementError> {
        self.store.release_storage(firm_id, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard_with(firm_id: Uuid, usage: FirmUsage) -> (QuotaGuard, Arc<LocalUsageStore>) {
        let store = Arc::new(LocalUsageStore::new());
        store.insert_firm(firm_id, usage);
        (QuotaGuard::new(store.clone()), store)
    }

    #[test]
    fn test_has_user_seats_pure() {
        let full = FirmUsage {
            max_users: Some(5),
            current_users: 5,
            max_storage_bytes: None,
            storage_used_bytes: 0,
        };
        assert!(!full.has_user_seats());

        let open = FirmUsage {
            current_users: 4,
            ..full
        };
        assert!(open.has_user_seats());

        let unlimited = FirmUsage {
            max_users: None,
            current_users: 10_000,
            ..full
        };
        assert!(unlimited.has_user_seats());
    }

    #[test]
    fn test_has_storage_space_pure() {
        let usage = FirmUsage {
            max_users: None,
            current_users: 0,
            max_storage_bytes: Some(1_000_000),
            storage_used_bytes: 900_000,
        };
        assert!(usage.has_storage_space(100_000)); // exactly at the ceiling
        assert!(!usage.has_storage_space(100_001));

        let unlimited = FirmUsage {
            max_storage_bytes: None,
            ..usage
        };
        assert!(unlimited.has_storage_space(i64::MAX / 2));
    }

    #[tokio::test]
    async fn test_seat_quota_full_firm_rejects_sixth_member() {
        let firm_id = Uuid::new_v4();
        let (guard, store) = guard_with(
            firm_id,
            FirmUsage {
                max_users: Some(5),
                current_users: 5,
                max_storage_bytes: None,
                storage_used_bytes: 0,
            },
        );

        assert!(!guard.has_user_seats(firm_id).await.unwrap());

        let err = guard.reserve_seat(firm_id).await.unwrap_err();
        assert!(matches!(
            err,
            EntitlementError::QuotaExceeded(QuotaKind::Seats)
        ));
        assert_eq!(err.code(), "quota_exceeded_seats");

        // Counter unchanged by the failed reservation
        assert_eq!(store.get(firm_id).unwrap().current_users, 5);
    }

    #[tokio::test]
    async fn test_storage_reserve_and_reject() {
        let firm_id = Uuid::new_v4();
        let (guard, store) = guard_with(
            firm_id,
            FirmUsage {
                max_users: None,
                current_users: 0,
                max_storage_bytes: Some(1_000_000),
                storage_used_bytes: 900_000,
            },
        );

        // 200k does not fit: rejected, counter unchanged
        let err = guard.reserve_storage(firm_id, 200_000).await.unwrap_err();
        assert!(matches!(
            err,
            EntitlementError::QuotaExceeded(QuotaKind::Storage)
        ));
        assert_eq!(store.get(firm_id).unwrap().storage_used_bytes, 900_000);

        // 50k fits: counter becomes 950k
        guard.reserve_storage(firm_id, 50_000).await.unwrap();
        assert_eq!(store.get(firm_id).unwrap().storage_used_bytes, 950_000);
    }

    #[tokio::test]
    async fn test_release_clamps_at_zero() {
        let firm_id = Uuid::new_v4();
        let (guard, store) = guard_with(
            firm_id,
            FirmUsage {
                max_users: Some(5),
                current_users: 1,
                max_storage_bytes: Some(1_000),
                storage_used_bytes: 100,
            },
        );

        guard.release_storage(firm_id, 500).await.unwrap();
        assert_eq!(store.get(firm_id).unwrap().storage_used_bytes, 0);

        guard.release_seat(firm_id).await.unwrap();
        guard.release_seat(firm_id).await.unwrap();
        assert_eq!(store.get(firm_id).unwrap().current_users, 0);
    }

    #[tokio::test]
    async fn test_unknown_firm_reservation() {
        let (guard, _) = guard_with(
            Uuid::new_v4(),
            FirmUsage {
                max_users: None,
                current_users: 0,
                max_storage_bytes: None,
                storage_used_bytes: 0,
            },
        );

        let err = guard.reserve_seat(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EntitlementError::FirmNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_ceiling() {
        // N concurrent reserves against a ceiling of M: whatever the
        // interleaving, the final counter must not pass M.
        let firm_id = Uuid::new_v4();
        let store = Arc::new(LocalUsageStore::new());
        store.insert_firm(
            firm_id,
            FirmUsage {
                max_users: None,
                current_users: 0,
                max_storage_bytes: Some(1_000_000),
                storage_used_bytes: 0,
            },
        );
        let guard = Arc::new(QuotaGuard::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.reserve_storage(firm_id, 100_000).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        // Exactly 10 reservations of 100k fit under 1M
        assert_eq!(succeeded, 10);
        assert_eq!(store.get(firm_id).unwrap().storage_used_bytes, 1_000_000);
    }

    #[tokio::test]
    async fn test_concurrent_seat_reservations() {
        let firm_id = Uuid::new_v4();
        let store = Arc::new(LocalUsageStore::new());
        store.insert_firm(
            firm_id,
            FirmUsage {
                max_users: Some(3),
                current_users: 0,
                max_storage_bytes: None,
                storage_used_bytes: 0,
            },
        );
        let guard = Arc::new(QuotaGuard::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let guard = guard.clone();
            handles.push(tokio::spawn(
                async move { guard.reserve_seat(firm_id).await.is_ok() },
            ));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(store.get(firm_id).unwrap().current_users, 3);
    }
}
