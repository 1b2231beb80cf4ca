//! Background indexing job.
//!
//! [`IndexJob::spawn`] starts a tokio task that runs an indexing pass, sleeps
//! for the configured interval, and repeats until stopped. The returned
//! [`IndexJobHandle`] exposes the job state and stops it cleanly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::IndexError;
use crate::sync::indexer::{IndexStats, Indexer};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Idle,
    Indexing,
    Completed,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub id: String,
    pub status: JobStatus,
    /// Passes finished, successfully or not
    pub runs: u64,
    pub last_stats: Option<IndexStats>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Idle,
            runs: 0,
            last_stats: None,
            last_error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

impl JobState {
    fn start_run(&mut self) {
        self.status = JobStatus::Indexing;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
    }

    fn complete_run(&mut self, stats: IndexStats) {
        self.status = JobStatus::Completed;
        self.runs += 1;
        self.last_stats = Some(stats);
        self.last_error = None;
        self.completed_at = Some(Utc::now());
    }

    fn fail_run(&mut self, error: String) {
        self.status = JobStatus::Error;
        self.runs += 1;
        self.last_error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

/// Periodic indexing job.
pub struct IndexJob;

impl IndexJob {
    /// Start indexing every `interval` on the current tokio runtime.
    ///
    /// The first pass starts immediately. A failed pass is recorded in the
    /// state and retried after the next interval.
    pub fn spawn(indexer: Arc<Indexer>, interval: Duration) -> IndexJobHandle {
        let state = Arc::new(Mutex::new(JobState::default()));
        let cancellation_token = CancellationToken::new();

        let task = tokio::spawn(run_loop(
            indexer,
            interval,
            Arc::clone(&state),
            cancellation_token.clone(),
        ));

        IndexJobHandle {
            state,
            cancellation_token,
            task,
        }
    }
}

async fn run_loop(
    indexer: Arc<Indexer>,
    interval: Duration,
    state: Arc<Mutex<JobState>>,
    token: CancellationToken,
) {
    log::info!("index job started (interval {:?})", interval);

    loop {
        state.lock().await.start_run();

        match indexer.run_until_cancelled(&token).await {
            Ok(stats) => state.lock().await.complete_run(stats),
            Err(IndexError::Cancelled) => break,
            Err(e) => state.lock().await.fail_run(e.to_string()),
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    state.lock().await.cancel();
    log::info!("index job stopped");
}

/// Handle to a running [`IndexJob`].
pub struct IndexJobHandle {
    state: Arc<Mutex<JobState>>,
    cancellation_token: CancellationToken,
    task: JoinHandle<()>,
}

impl IndexJobHandle {
    pub async fn state(&self) -> JobState {
        self.state.lock().await.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the job and wait for its task to exit.
    ///
    /// An in-flight pass stops at the next commit boundary.
    pub async fn stop(self) -> JobState {
        self.cancellation_token.cancel();
        if let Err(e) = self.task.await {
            log::error!("index job task failed: {}", e);
        }
        self.state.lock().await.clone()
    }
}
