//! Writer lease for the incremental indexer.
//!
//! Only one indexing run may advance a store at a time. The lease is the
//! single row of `index_lease`; a run claims it atomically, refreshes its
//! heartbeat while walking, and clears it when done. A holder whose heartbeat
//! is older than the TTL is presumed dead and may be replaced.

use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::error::StoreError;

/// Try to claim the lease for `holder`.
///
/// Succeeds when the lease is free, already held by `holder`, or expired.
///
/// # Returns
/// `true` if `holder` now owns the lease
pub async fn acquire_lease(
    pool: &SqlitePool,
    holder: &str,
    ttl: Duration,
) -> Result<bool, StoreError> {
    let now = Utc::now().timestamp();
    let expired_before = now - i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

    let result = sqlx::query(
        r#"UPDATE index_lease
           SET holder = ?1, acquired_at = ?2, heartbeat_at = ?2
           WHERE id = 1
             AND (holder IS NULL OR holder = ?1 OR heartbeat_at < ?3)"#,
    )
    .bind(holder)
    .bind(now)
    .bind(expired_before)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Refresh the heartbeat of a lease `holder` still owns.
///
/// # Returns
/// `false` if the lease was taken over in the meantime
pub async fn heartbeat_lease(pool: &SqlitePool, holder: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"UPDATE index_lease
           SET heartbeat_at = ?1
           WHERE id = 1 AND holder = ?2"#,
    )
    .bind(Utc::now().timestamp())
    .bind(holder)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release the lease if `holder` owns it.
pub async fn release_lease(pool: &SqlitePool, holder: &str) -> Result<(), StoreError> {
    sqlx::query(
        r#"UPDATE index_lease
           SET holder = NULL, acquired_at = NULL, heartbeat_at = NULL
           WHERE id = 1 AND holder = ?1"#,
    )
    .bind(holder)
    .execute(pool)
    .await?;

    Ok(())
}

/// Current lease holder, if any.
pub async fn current_holder(pool: &SqlitePool) -> Result<Option<String>, StoreError> {
    let holder: Option<Option<String>> =
        sqlx::query_scalar("SELECT holder FROM index_lease WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    Ok(holder.flatten())
}
