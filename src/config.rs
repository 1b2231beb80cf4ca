//! Environment-driven configuration for the indexer and the CLI.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Runtime configuration for indexing and lookups.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Archive repository (bare or not).
    pub repo_path: PathBuf,
    pub branch: String,
    /// Fetch from `remote` before each walk.
    pub fetch_remote: bool,
    pub remote: String,
    /// Period of the background job.
    pub interval: Duration,
    /// Age after which an unrefreshed writer lease may be taken over.
    pub lease_ttl: Duration,
    /// Commits between lease heartbeats.
    pub heartbeat_every: usize,
}

impl IndexerConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: PathBuf::from(env_string("EMAIL_DB_PATH", "emails.db")),
            repo_path: PathBuf::from(env_string("GIT_REPO_PATH", "1.git")),
            branch: env_string("INDEX_BRANCH", "refs/heads/master"),
            fetch_remote: env_bool("INDEX_FETCH_REMOTE", false),
            remote: env_string("INDEX_REMOTE", "origin"),
            interval: Duration::from_secs(env_u64("INDEX_INTERVAL_SECS", 300)),
            lease_ttl: Duration::from_secs(env_u64("INDEX_LEASE_TTL_SECS", 600)),
            heartbeat_every: env_usize("INDEX_HEARTBEAT_EVERY", 100).max(1),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
