//! Incremental indexing of archive history.
//!
//! Each run walks the commits added since the resume point, oldest first,
//! decodes the message attached to each one, assigns it a thread root and
//! upserts its record. There is no separate progress state: the resume point
//! is whatever commit the most recently written record came from.
//!
//! # Root Assignment
//!
//! Roots are resolved with a single hop through the first reference:
//!
//! - no references: the message is its own root
//! - otherwise the first reference's stored root, else its root from earlier
//!   in this run, else the first reference itself
//!
//! This is exact when parents are indexed before their replies, which the
//! append-only archive order gives in the common case. Records written
//! before their parent arrived keep the provisional root.
//!
//! # Failure Handling
//!
//! - commit without a blob, message without an id: skipped silently
//! - undecodable blob: logged, skipped, the walk continues
//! - repository or store failure: the run stops; everything written so far
//!   stays, and the next run resumes after the last written record
//! - resume point missing from history: [`IndexError::HistoryIntegrity`]
//!
//! Only one run may write to a store at a time, enforced by the writer lease.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::IndexerConfig;
use crate::error::IndexError;
use crate::models::{IndexedMessage, Message};
use crate::sync::database::{MessageStore, acquire_lease, current_holder, heartbeat_lease, release_lease};
use crate::sync::git::{ContentRepository, run_blocking};
use crate::sync::parser::{DecodeError, decode_message};

/// Counters for a single indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Commits visited by the walk
    pub commits: usize,
    /// Records written
    pub indexed: usize,
    /// Records already stored with identical content
    pub unchanged: usize,
    /// Messages without a Message-ID
    pub skipped_without_id: usize,
    /// Commits carrying no blob
    pub skipped_without_blob: usize,
    /// Blobs that failed to decode
    pub decode_failures: usize,
}

/// Incremental indexer over one content repository and one store.
pub struct Indexer {
    store: MessageStore,
    repository: Arc<dyn ContentRepository>,
    branch: String,
    fetch_remote: bool,
    lease_ttl: Duration,
    heartbeat_every: usize,
}

impl Indexer {
    pub fn new(store: MessageStore, repository: Arc<dyn ContentRepository>) -> Self {
        Self {
            store,
            repository,
            branch: "refs/heads/master".to_string(),
            fetch_remote: false,
            lease_ttl: Duration::from_secs(600),
            heartbeat_every: 100,
        }
    }

    pub fn from_config(
        config: &IndexerConfig,
        store: MessageStore,
        repository: Arc<dyn ContentRepository>,
    ) -> Self {
        Self::new(store, repository)
            .with_branch(config.branch.clone())
            .with_fetch_remote(config.fetch_remote)
            .with_lease_ttl(config.lease_ttl)
            .with_heartbeat_every(config.heartbeat_every)
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_fetch_remote(mut self, fetch_remote: bool) -> Self {
        self.fetch_remote = fetch_remote;
        self
    }

    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    pub fn with_heartbeat_every(mut self, commits: usize) -> Self {
        self.heartbeat_every = commits.max(1);
        self
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Run one indexing pass to completion.
    pub async fn run(&self) -> Result<IndexStats, IndexError> {
        self.run_until_cancelled(&CancellationToken::new()).await
    }

    /// Run one indexing pass, stopping between commits once `cancel` fires.
    ///
    /// The writer lease is held for the whole pass and released on every exit
    /// path.
    pub async fn run_until_cancelled(
        &self,
        cancel: &CancellationToken,
    ) -> Result<IndexStats, IndexError> {
        let holder = Uuid::new_v4().to_string();

        if !acquire_lease(self.store.pool(), &holder, self.lease_ttl).await? {
            let holder = current_holder(self.store.pool()).await?.unwrap_or_default();
            log::warn!("indexing refused: lease held by {}", holder);
            return Err(IndexError::AlreadyRunning { holder });
        }

        let result = self.walk(&holder, cancel).await;

        if let Err(e) = release_lease(self.store.pool(), &holder).await {
            log::error!("failed to release indexing lease {}: {}", holder, e);
        }

        match &result {
            Ok(stats) => log::info!(
                "indexed {} messages from {} commits ({} unchanged, {} without id, {} without blob, {} undecodable)",
                stats.indexed,
                stats.commits,
                stats.unchanged,
                stats.skipped_without_id,
                stats.skipped_without_blob,
                stats.decode_failures
            ),
            Err(IndexError::Cancelled) => log::info!("indexing run cancelled"),
            Err(e) => log::error!("indexing run failed: {}", e),
        }

        result
    }

    async fn walk(&self, holder: &str, cancel: &CancellationToken) -> Result<IndexStats, IndexError> {
        if self.fetch_remote {
            run_blocking(&self.repository, |repo| repo.refresh()).await?;
        }

        let since = self.store.resume_point().await?;
        let commits = {
            let branch = self.branch.clone();
            let since = since.clone();
            run_blocking(&self.repository, move |repo| {
                repo.commits_since(&branch, since.as_deref())
            })
            .await?
        };

        log::info!(
            "indexing {} new commits on {} (resume point: {})",
            commits.len(),
            self.branch,
            since.as_deref().unwrap_or("none")
        );

        let mut stats = IndexStats::default();
        // message_id -> root_message_id for records written during this run
        let mut run_roots: HashMap<String, String> = HashMap::new();

        for (position, commit) in commits.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            stats.commits += 1;
            self.index_commit(commit, &mut run_roots, &mut stats).await?;

            if (position + 1) % self.heartbeat_every == 0 {
                if !heartbeat_lease(self.store.pool(), holder).await? {
                    let holder = current_holder(self.store.pool()).await?.unwrap_or_default();
                    return Err(IndexError::AlreadyRunning { holder });
                }
                log::debug!("indexed {}/{} commits", position + 1, commits.len());
            }
        }

        Ok(stats)
    }

    async fn index_commit(
        &self,
        commit: &str,
        run_roots: &mut HashMap<String, String>,
        stats: &mut IndexStats,
    ) -> Result<(), IndexError> {
        let owned_commit = commit.to_string();
        let blob = run_blocking(&self.repository, move |repo| repo.blob_for_commit(&owned_commit)).await?;
        let Some(blob) = blob else {
            log::debug!("commit {} has no message blob, skipping", commit);
            stats.skipped_without_blob += 1;
            return Ok(());
        };

        let message = match decode_message(&blob) {
            Ok(message) => message,
            Err(DecodeError::MissingMessageId) => {
                log::debug!("commit {} has no Message-ID, skipping", commit);
                stats.skipped_without_id += 1;
                return Ok(());
            }
            Err(e) => {
                log::warn!("commit {} could not be decoded, skipping: {}", commit, e);
                stats.decode_failures += 1;
                return Ok(());
            }
        };

        let root = self.resolve_root(&message, run_roots).await?;
        run_roots.insert(message.message_id.clone(), root.clone());

        let record = IndexedMessage::from_message(&message, commit, root);
        if self.store.upsert(&record).await? {
            stats.indexed += 1;
        } else {
            stats.unchanged += 1;
        }

        Ok(())
    }

    /// Single-hop root of `message`.
    async fn resolve_root(
        &self,
        message: &Message,
        run_roots: &HashMap<String, String>,
    ) -> Result<String, IndexError> {
        let Some(first_ref) = message.references.first() else {
            return Ok(message.message_id.clone());
        };

        if let Some(root) = self.store.root_of(first_ref).await? {
            return Ok(root);
        }

        Ok(run_roots
            .get(first_ref)
            .cloned()
            .unwrap_or_else(|| first_ref.clone()))
    }
}
