//! Indexed message records.
//!
//! One row per message id. Every write of new content gets a fresh `seq`, so
//! the row with the highest `seq` is always the most recently indexed commit;
//! that row's `content_ref` is the resume point of the next run.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;

use super::migration::connect;
use crate::error::StoreError;
use crate::models::IndexedMessage;

#[derive(Debug, FromRow)]
struct MessageRow {
    message_id: String,
    subject: String,
    from_addr: String,
    from_name: String,
    date_sent: i64,
    content_ref: String,
    root_message_id: String,
    starter_eligible: bool,
}

impl From<MessageRow> for IndexedMessage {
    fn from(row: MessageRow) -> Self {
        IndexedMessage {
            message_id: row.message_id,
            subject: row.subject,
            from_addr: row.from_addr,
            from_name: row.from_name,
            date_sent: DateTime::<Utc>::from_timestamp(row.date_sent, 0).unwrap_or_default(),
            content_ref: row.content_ref,
            root_message_id: row.root_message_id,
            starter_eligible: row.starter_eligible,
        }
    }
}

const SELECT_COLUMNS: &str = "message_id, subject, from_addr, from_name, date_sent, \
                              content_ref, root_message_id, starter_eligible";

/// Handle to the message store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Open the store at `path`, creating and migrating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            pool: connect(path).await?,
        })
    }

    /// Wrap an already migrated pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or overwrite the record for `record.message_id`.
    ///
    /// Writing a record identical to the stored one is a no-op, so reprocessing
    /// a commit leaves the store (and the resume point) unchanged. Any change
    /// replaces the row atomically with a fresh `seq`.
    ///
    /// # Returns
    /// `true` if the row was written
    pub async fn upsert(&self, record: &IndexedMessage) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE message_id = ?1",
            SELECT_COLUMNS
        ))
        .bind(&record.message_id)
        .fetch_optional(&mut *tx)
        .await?;

        // Stored dates have whole-second precision
        let mut normalized = record.clone();
        normalized.date_sent =
            DateTime::<Utc>::from_timestamp(record.date_sent.timestamp(), 0).unwrap_or_default();

        if existing.map(IndexedMessage::from) == Some(normalized) {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"INSERT OR REPLACE INTO messages
               (message_id, subject, from_addr, from_name, date_sent,
                content_ref, root_message_id, starter_eligible)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(&record.message_id)
        .bind(&record.subject)
        .bind(&record.from_addr)
        .bind(&record.from_name)
        .bind(record.date_sent.timestamp())
        .bind(&record.content_ref)
        .bind(&record.root_message_id)
        .bind(record.starter_eligible)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Point lookup by message id.
    pub async fn get(&self, message_id: &str) -> Result<Option<IndexedMessage>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE message_id = ?1",
            SELECT_COLUMNS
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(IndexedMessage::from))
    }

    /// Stored root of `message_id`, if the message is indexed.
    pub async fn root_of(&self, message_id: &str) -> Result<Option<String>, StoreError> {
        let root = sqlx::query_scalar("SELECT root_message_id FROM messages WHERE message_id = ?1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(root)
    }

    /// Every record sharing `root_message_id`, oldest first.
    pub async fn thread_members(&self, root_message_id: &str) -> Result<Vec<IndexedMessage>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE root_message_id = ?1 ORDER BY date_sent, seq",
            SELECT_COLUMNS
        ))
        .bind(root_message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(IndexedMessage::from).collect())
    }

    /// The most recently written record.
    pub async fn latest(&self) -> Result<Option<IndexedMessage>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages ORDER BY seq DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(IndexedMessage::from))
    }

    /// Commit the next incremental walk starts after.
    pub async fn resume_point(&self) -> Result<Option<String>, StoreError> {
        Ok(self.latest().await?.map(|record| record.content_ref))
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::database::{acquire_lease, current_holder, heartbeat_lease, release_lease};
    use chrono::TimeZone;
    use std::time::Duration;

    fn record(id: &str, root: &str, commit: &str, minutes: u32) -> IndexedMessage {
        IndexedMessage {
            message_id: id.to_string(),
            subject: format!("Subject {}", id),
            from_addr: "dev@example.com".to_string(),
            from_name: "Dev".to_string(),
            date_sent: Utc.with_ymd_and_hms(2024, 5, 1, 8, minutes, 0).unwrap(),
            content_ref: commit.to_string(),
            root_message_id: root.to_string(),
            starter_eligible: true,
        }
    }

    async fn open_store() -> (tempfile::TempDir, MessageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::open(dir.path().join("emails.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let (_dir, store) = open_store().await;

        assert!(store.upsert(&record("a", "a", "c1", 0)).await.unwrap());
        assert!(store.upsert(&record("b", "a", "c2", 1)).await.unwrap());

        assert_eq!(store.get("a").await.unwrap(), Some(record("a", "a", "c1", 0)));
        assert_eq!(store.root_of("b").await.unwrap(), Some("a".to_string()));
        assert_eq!(store.root_of("zzz").await.unwrap(), None);
        assert_eq!(store.count().await.unwrap(), 2);

        let members: Vec<String> = store
            .thread_members("a")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(members, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_identical_upsert_keeps_resume_point() {
        let (_dir, store) = open_store().await;

        store.upsert(&record("a", "a", "c1", 0)).await.unwrap();
        store.upsert(&record("b", "a", "c2", 1)).await.unwrap();
        assert_eq!(store.resume_point().await.unwrap(), Some("c2".to_string()));

        assert!(!store.upsert(&record("a", "a", "c1", 0)).await.unwrap());
        assert_eq!(store.resume_point().await.unwrap(), Some("c2".to_string()));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_changed_upsert_overwrites() {
        let (_dir, store) = open_store().await;

        store.upsert(&record("b", "b", "c1", 0)).await.unwrap();
        store.upsert(&record("b", "a", "c2", 0)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.root_of("b").await.unwrap(), Some("a".to_string()));
        assert_eq!(store.resume_point().await.unwrap(), Some("c2".to_string()));
    }

    #[tokio::test]
    async fn test_empty_store_has_no_resume_point() {
        let (_dir, store) = open_store().await;
        assert_eq!(store.resume_point().await.unwrap(), None);
        assert_eq!(store.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_until_released() {
        let (_dir, store) = open_store().await;
        let ttl = Duration::from_secs(600);

        assert!(acquire_lease(store.pool(), "first", ttl).await.unwrap());
        assert!(!acquire_lease(store.pool(), "second", ttl).await.unwrap());
        assert_eq!(current_holder(store.pool()).await.unwrap(), Some("first".to_string()));
        assert!(heartbeat_lease(store.pool(), "first").await.unwrap());
        assert!(!heartbeat_lease(store.pool(), "second").await.unwrap());

        release_lease(store.pool(), "first").await.unwrap();
        assert_eq!(current_holder(store.pool()).await.unwrap(), None);
        assert!(acquire_lease(store.pool(), "second", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let (_dir, store) = open_store().await;

        assert!(acquire_lease(store.pool(), "crashed", Duration::from_secs(600)).await.unwrap());
        sqlx::query("UPDATE index_lease SET heartbeat_at = heartbeat_at - 3600 WHERE id = 1")
            .execute(store.pool())
            .await
            .unwrap();

        assert!(acquire_lease(store.pool(), "fresh", Duration::from_secs(600)).await.unwrap());
        assert_eq!(current_holder(store.pool()).await.unwrap(), Some("fresh".to_string()));
    }
}
