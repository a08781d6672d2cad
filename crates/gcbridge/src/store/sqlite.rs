//! SQLite task store.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::{StoreError, TaskCounts, TaskRecord, TaskStatus, TaskStore, now_millis};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    type        TEXT    NOT NULL,
    payload     TEXT    NOT NULL,
    status      TEXT    NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'RUNNING', 'DONE', 'FAILED')),
    result      TEXT,
    error       TEXT,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    started_at  INTEGER,
    finished_at INTEGER
)";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_tasks_status_id ON tasks (status, id)";

const SELECT_COLUMNS: &str = "SELECT id, type, payload, status, result, error, created_at, \
                              updated_at, started_at, finished_at FROM tasks";

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url`.
    ///
    /// In-memory databases get a single connection; each connection to
    /// `sqlite::memory:` would otherwise see its own empty database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TaskRecord, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(TaskRecord {
        id: row.try_get("id")?,
        task_type: row.try_get("type")?,
        payload: row.try_get("payload")?,
        status: TaskStatus::parse(&status)?,
        result: row.try_get("result")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    async fn enqueue(&self, task_type: &str, payload: &str) -> Result<i64, StoreError> {
        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO tasks (type, payload, status, created_at, updated_at) \
             VALUES (?, ?, 'PENDING', ?, ?)",
        )
        .bind(task_type)
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn oldest_pending(&self) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT id FROM tasks WHERE status = 'PENDING' ORDER BY id LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("id")?)),
            None => Ok(None),
        }
    }

    async fn try_claim(&self, id: i64, now_ms: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'RUNNING', started_at = ?, updated_at = ? \
             WHERE id = ? AND status = 'PENDING'",
        )
        .bind(now_ms)
        .bind(now_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn finalize_done(&self, id: i64, result: &str, now_ms: i64) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE tasks SET status = 'DONE', result = ?, error = NULL, \
             finished_at = ?, updated_at = ? WHERE id = ? AND status = 'RUNNING'",
        )
        .bind(result)
        .bind(now_ms)
        .bind(now_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn finalize_failed(
        &self,
        id: i64,
        error: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE tasks SET status = 'FAILED', error = ?, result = NULL, \
             finished_at = ?, updated_at = ? WHERE id = ? AND status = 'RUNNING'",
        )
        .bind(error)
        .bind(now_ms)
        .bind(now_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() == 1)
    }

    async fn get(&self, id: i64) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_running(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE status = 'RUNNING' ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = TaskCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            counts.add(TaskStatus::parse(&status)?, n.max(0) as u64);
        }
        Ok(counts)
    }
}
