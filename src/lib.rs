pub mod config;
pub mod error;
pub mod models;
pub mod search;
pub mod sync;
pub mod threading;

use env_logger::Env;
use std::sync::Once;

pub use config::IndexerConfig;
pub use error::{IndexError, LookupError, StoreError};
pub use search::{ThreadService, ThreadSummary};
pub use sync::{ContentRepository, GitRepository, IndexJob, IndexStats, Indexer, MessageStore};

static LOGGER: Once = Once::new();

/// Install the process logger once. `RUST_LOG` overrides the default filter.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn")).init();
    });
}

pub mod test_support {
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;
    use thiserror::Error;

    use crate::error::StoreError;
    use crate::sync::database::MessageStore;
    use crate::sync::git::{ContentRepository, GitError, topological_walk};

    #[derive(Debug, Error)]
    pub enum TestStoreError {
        #[error("io error: {0}")]
        Io(#[from] std::io::Error),
        #[error("store error: {0}")]
        Store(#[from] StoreError),
    }

    /// Message store backed by a throwaway directory.
    pub struct TestStore {
        store: MessageStore,
        _dir: TempDir,
    }

    impl TestStore {
        pub async fn new() -> Result<Self, TestStoreError> {
            let dir = tempfile::tempdir()?;
            let store = MessageStore::open(dir.path().join("emails.db")).await?;
            Ok(Self { store, _dir: dir })
        }

        pub fn store(&self) -> &MessageStore {
            &self.store
        }

        /// Handle sharing the same database.
        pub fn store_clone(&self) -> MessageStore {
            self.store.clone()
        }
    }

    #[derive(Debug, Default)]
    struct History {
        /// commit -> (parents, blob)
        commits: HashMap<String, (Vec<String>, Option<Vec<u8>>)>,
        /// branch -> tip
        branches: HashMap<String, String>,
        next_id: usize,
    }

    /// In-memory [`ContentRepository`] with a linear branch per name.
    ///
    /// Counts blob reads so tests can assert that a commit was (or was not)
    /// decoded again.
    #[derive(Debug, Default)]
    pub struct MemoryRepository {
        history: Mutex<History>,
        blob_reads: AtomicUsize,
        refreshes: AtomicUsize,
        failing: Mutex<Option<String>>,
        failing_read: Mutex<Option<usize>>,
    }

    impl MemoryRepository {
        pub const BRANCH: &'static str = "refs/heads/master";

        pub fn new() -> Self {
            Self::default()
        }

        /// Append a commit carrying `blob` to [`Self::BRANCH`], returning its id.
        pub fn append(&self, blob: Option<Vec<u8>>) -> String {
            self.append_to(Self::BRANCH, blob)
        }

        pub fn append_to(&self, branch: &str, blob: Option<Vec<u8>>) -> String {
            let mut history = self.history();
            let parents = history.branches.get(branch).cloned().into_iter().collect();
            Self::commit_on(&mut history, branch, parents, blob)
        }

        /// Start `branch` at an existing commit.
        pub fn fork(&self, branch: &str, from: &str) {
            self.history().branches.insert(branch.to_string(), from.to_string());
        }

        /// Merge `branch` into [`Self::BRANCH`] with a commit carrying `blob`.
        pub fn merge(&self, branch: &str, blob: Option<Vec<u8>>) -> String {
            let mut history = self.history();
            let parents = [Self::BRANCH, branch]
                .iter()
                .filter_map(|name| history.branches.get(*name).cloned())
                .collect();
            Self::commit_on(&mut history, Self::BRANCH, parents, blob)
        }

        fn commit_on(
            history: &mut History,
            branch: &str,
            parents: Vec<String>,
            blob: Option<Vec<u8>>,
        ) -> String {
            history.next_id += 1;
            let commit = format!("{:040x}", history.next_id);
            history.commits.insert(commit.clone(), (parents, blob));
            history.branches.insert(branch.to_string(), commit.clone());
            commit
        }

        /// Replace the branch with a fresh history holding `blobs`, as a
        /// force-push would.
        pub fn rewrite(&self, blobs: Vec<Option<Vec<u8>>>) -> Vec<String> {
            self.history().branches.remove(Self::BRANCH);
            blobs.into_iter().map(|blob| self.append(blob)).collect()
        }

        /// Make every repository call fail with `message` until cleared.
        pub fn set_failure(&self, message: Option<&str>) {
            *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = message.map(str::to_string);
        }

        /// Fail the `n`th blob read, counted from the first read ever made.
        pub fn fail_on_blob_read(&self, n: Option<usize>) {
            *self.failing_read.lock().unwrap_or_else(PoisonError::into_inner) = n;
        }

        pub fn blob_reads(&self) -> usize {
            self.blob_reads.load(Ordering::SeqCst)
        }

        pub fn refreshes(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }

        fn history(&self) -> MutexGuard<'_, History> {
            self.history.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn check_failure(&self) -> Result<(), GitError> {
            match self.failing.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
                Some(message) => Err(GitError::Other(message.clone())),
                None => Ok(()),
            }
        }
    }

    impl ContentRepository for MemoryRepository {
        fn refresh(&self) -> Result<(), GitError> {
            self.check_failure()?;
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn commits_since(&self, branch: &str, since: Option<&str>) -> Result<Vec<String>, GitError> {
            self.check_failure()?;
            let history = self.history();
            let Some(tip) = history.branches.get(branch) else {
                return Err(GitError::Other(format!("unknown branch {}", branch)));
            };

            topological_walk(tip, since, |commit| {
                history
                    .commits
                    .get(commit)
                    .map(|(parents, _)| parents.clone())
                    .ok_or_else(|| GitError::Other(format!("unknown commit {}", commit)))
            })
        }

        fn blob_for_commit(&self, commit: &str) -> Result<Option<Vec<u8>>, GitError> {
            self.check_failure()?;
            let reads = self.blob_reads.fetch_add(1, Ordering::SeqCst) + 1;
            if *self.failing_read.lock().unwrap_or_else(PoisonError::into_inner) == Some(reads) {
                return Err(GitError::Other(format!("blob read {} failed", reads)));
            }
            let history = self.history();
            history
                .commits
                .get(commit)
                .map(|(_, blob)| blob.clone())
                .ok_or_else(|| GitError::Other(format!("unknown commit {}", commit)))
        }
    }

    /// Raw RFC 5322 message with the given headers.
    pub fn raw_message(
        message_id: &str,
        subject: &str,
        references: &[&str],
        date: &str,
    ) -> Vec<u8> {
        let mut text = String::new();
        if !message_id.is_empty() {
            text.push_str(&format!("Message-ID: <{}>\r\n", message_id));
        }
        text.push_str(&format!("Subject: {}\r\n", subject));
        text.push_str("From: Tester <tester@example.com>\r\n");
        text.push_str(&format!("Date: {}\r\n", date));
        if !references.is_empty() {
            let refs: Vec<String> = references.iter().map(|r| format!("<{}>", r)).collect();
            text.push_str(&format!("References: {}\r\n", refs.join(" ")));
        }
        text.push_str("\r\nBody\r\n");
        text.into_bytes()
    }
}
