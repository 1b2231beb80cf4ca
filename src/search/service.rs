//! Read side of the archive: thread reconstruction and thread search.
//!
//! Both operations only read the store, so they run alongside an indexing
//! pass. `find_thread` re-reads message bodies from the content repository
//! and threads them on demand; nothing about tree shape is persisted.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use sqlx::FromRow;
use std::sync::Arc;

use super::types::{SEARCH_PAGE_SIZE, ThreadSummary, format_sender};
use crate::error::LookupError;
use crate::models::{IndexedMessage, Message, ThreadedMessage};
use crate::sync::database::MessageStore;
use crate::sync::git::{ContentRepository, run_blocking};
use crate::sync::parser::decode_message;
use crate::threading::build_threads;

#[derive(Debug, FromRow)]
struct SummaryRow {
    message_id: String,
    subject: String,
    from_name: String,
    from_addr: String,
    date_sent: i64,
    message_count: i64,
}

impl From<SummaryRow> for ThreadSummary {
    fn from(row: SummaryRow) -> Self {
        ThreadSummary {
            from: format_sender(&row.from_name, &row.from_addr),
            message_id: row.message_id,
            subject: row.subject,
            from_name: row.from_name,
            from_addr: row.from_addr,
            date: DateTime::<Utc>::from_timestamp(row.date_sent, 0).unwrap_or_default(),
            message_count: row.message_count,
        }
    }
}

/// Escape LIKE wildcards and wrap the lowercased term in `%`.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.to_lowercase().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Re-read and decode the stored members in parallel, keeping store order.
fn load_messages(repository: &dyn ContentRepository, members: &[IndexedMessage]) -> Vec<Message> {
    members
        .par_iter()
        .filter_map(|record| {
            let blob = match repository.blob_for_commit(&record.content_ref) {
                Ok(Some(blob)) => blob,
                Ok(None) => {
                    log::warn!("commit {} of {} has no blob", record.content_ref, record.message_id);
                    return None;
                }
                Err(e) => {
                    log::warn!("failed to read {} ({}): {}", record.message_id, record.content_ref, e);
                    return None;
                }
            };

            match decode_message(&blob) {
                Ok(message) => Some(message),
                Err(e) => {
                    log::warn!("failed to decode {} ({}): {}", record.message_id, record.content_ref, e);
                    None
                }
            }
        })
        .collect()
}

/// Thread lookup and search over one store and its content repository.
#[derive(Clone)]
pub struct ThreadService {
    store: MessageStore,
    repository: Arc<dyn ContentRepository>,
}

impl ThreadService {
    pub fn new(store: MessageStore, repository: Arc<dyn ContentRepository>) -> Self {
        Self { store, repository }
    }

    /// Reconstruct the conversation containing `message_id`.
    ///
    /// Returns the flattened, depth-annotated thread, or `None` when the id is
    /// not indexed. Members whose blob can no longer be read or decoded are
    /// left out; if none remain the thread is reported as not found.
    pub async fn find_thread(
        &self,
        message_id: &str,
    ) -> Result<Option<Vec<ThreadedMessage>>, LookupError> {
        let Some(root) = self.store.root_of(message_id).await? else {
            log::debug!("find_thread: {} is not indexed", message_id);
            return Ok(None);
        };

        let members = self.store.thread_members(&root).await?;
        let total = members.len();
        let messages = run_blocking(&self.repository, move |repo| Ok(load_messages(repo, &members))).await?;

        if messages.is_empty() {
            log::warn!("find_thread: no member of thread {} could be decoded", root);
            return Ok(None);
        }

        log::debug!(
            "find_thread: {} -> root {} ({} of {} members decoded)",
            message_id,
            root,
            messages.len(),
            total
        );

        Ok(Some(build_threads(messages).into_flattened()))
    }

    /// List threads, newest first, each described by its representative.
    ///
    /// The representative is the earliest record eligible to start a thread
    /// (not a reply, no `v2`..`v9` tag), or the earliest record when none is.
    /// With a query, only records whose subject or sender contains it are
    /// candidates; message counts still cover whole threads.
    pub async fn search(&self, query: Option<&str>) -> Result<Vec<ThreadSummary>, LookupError> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);

        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            WITH candidates AS (
                SELECT message_id, subject, from_name, from_addr, date_sent,
                       root_message_id, seq,
                       ROW_NUMBER() OVER (
                           PARTITION BY root_message_id
                           ORDER BY starter_eligible DESC, date_sent ASC, seq ASC
                       ) AS rn
                FROM messages
                WHERE ?1 IS NULL
                   OR LOWER(subject) LIKE ?1 ESCAPE '\'
                   OR LOWER(from_name) LIKE ?1 ESCAPE '\'
                   OR LOWER(from_addr) LIKE ?1 ESCAPE '\'
            ),
            thread_counts AS (
                SELECT root_message_id, COUNT(*) AS message_count
                FROM messages
                GROUP BY root_message_id
            )
            SELECT c.message_id, c.subject, c.from_name, c.from_addr, c.date_sent,
                   t.message_count
            FROM candidates c
            JOIN thread_counts t ON c.root_message_id = t.root_message_id
            WHERE c.rn = 1
            ORDER BY c.date_sent DESC, c.seq DESC
            LIMIT ?2
            "#,
        )
        .bind(pattern)
        .bind(SEARCH_PAGE_SIZE)
        .fetch_all(self.store.pool())
        .await?;

        Ok(rows.into_iter().map(ThreadSummary::from).collect())
    }
}
