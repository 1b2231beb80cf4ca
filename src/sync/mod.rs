//! Mailing list archive indexing.
//!
//! This module keeps the message store in step with a public-inbox style
//! archive: one message per commit, appended to a single branch.
//!
//! # Architecture Overview
//!
//! - **`git`**: Content repository access. Lists new commits in causal order
//!   and reads the message blob of a commit.
//!
//! - **`parser`**: Decodes raw blobs into [`Message`](crate::models::Message)
//!   values with the header normalization threading relies on.
//!
//! - **`indexer`**: Walks the commits after the resume point, assigns each
//!   message a single-hop thread root and upserts its record.
//!
//! - **`database`**: SQLite store, migrations and the single-writer lease.
//!
//! - **`jobs`**: Periodic background indexing with a start/stop lifecycle.
//!
//! ## Data Flow
//!
//! 1. **Lease**: Claim the writer lease or refuse to run
//! 2. **Refresh**: Optionally fetch the archive remote
//! 3. **Discovery**: List commits after the resume point, oldest first
//! 4. **Decode**: Read and decode each commit's blob
//! 5. **Root**: Resolve the thread root through the first reference
//! 6. **Upsert**: Write the record; the resume point moves with it

pub mod database;
pub mod git;
pub mod indexer;
pub mod jobs;
pub mod parser;

pub use database::{MessageStore, run_migrations};
pub use git::{ContentRepository, GitError, GitRepository};
pub use indexer::{IndexStats, Indexer};
pub use jobs::{IndexJob, IndexJobHandle, JobState, JobStatus};
pub use parser::{DecodeError, decode_message};
