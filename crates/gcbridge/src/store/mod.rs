//! Durable task queue.
//!
//! Status lifecycle: `PENDING -> RUNNING -> DONE | FAILED`. Claims and
//! finalizations are conditional updates, so a row changes state at most
//! once per transition even with several processors on one database.

mod memory;
mod sqlite;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryTaskStore;
pub use sqlite::SqliteTaskStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid task status '{0}'")]
    InvalidStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the task table. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
}

impl TaskCounts {
    fn add(&mut self, status: TaskStatus, n: u64) {
        match status {
            TaskStatus::Pending => self.pending += n,
            TaskStatus::Running => self.running += n,
            TaskStatus::Done => self.done += n,
            TaskStatus::Failed => self.failed += n,
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create the table and its `(status, id)` index if missing.
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert a PENDING task and return its id.
    async fn enqueue(&self, task_type: &str, payload: &str) -> Result<i64, StoreError>;

    /// Id of the oldest PENDING task.
    async fn oldest_pending(&self) -> Result<Option<i64>, StoreError>;

    /// `PENDING -> RUNNING` for `id`. False if the row was no longer PENDING
    /// (someone else claimed it).
    async fn try_claim(&self, id: i64, now_ms: i64) -> Result<bool, StoreError>;

    /// `RUNNING -> DONE`. False if the row was not RUNNING.
    async fn finalize_done(&self, id: i64, result: &str, now_ms: i64) -> Result<bool, StoreError>;

    /// `RUNNING -> FAILED`. False if the row was not RUNNING.
    async fn finalize_failed(
        &self,
        id: i64,
        error: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<TaskRecord>, StoreError>;

    async fn list_running(&self) -> Result<Vec<TaskRecord>, StoreError>;

    async fn counts(&self) -> Result<TaskCounts, StoreError>;

    /// Claim the oldest PENDING task. `None` when the queue is empty or the
    /// claim was lost to another processor.
    async fn claim_next(&self, now_ms: i64) -> Result<Option<TaskRecord>, StoreError> {
        let Some(id) = self.oldest_pending().await? else {
            return Ok(None);
        };
        if !self.try_claim(id, now_ms).await? {
            tracing::debug!(task_id = id, "Claim lost to another processor");
            return Ok(None);
        }
        self.get(id).await
    }
}
