//! In-process task store with the same conditional-update semantics as the
//! SQLite store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{StoreError, TaskCounts, TaskRecord, TaskStatus, TaskStore, now_millis};
use crate::sync::lock_unpoisoned;

#[derive(Default)]
struct Tables {
    next_id: i64,
    tasks: BTreeMap<i64, TaskRecord>,
}

#[derive(Default)]
pub struct MemoryTaskStore {
    tables: Mutex<Tables>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `update` to task `id` only if it is currently in `from`.
    fn transition(&self, id: i64, from: TaskStatus, update: impl FnOnce(&mut TaskRecord)) -> bool {
        let mut tables = lock_unpoisoned(&self.tables);
        match tables.tasks.get_mut(&id) {
            Some(task) if task.status == from => {
                update(task);
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn enqueue(&self, task_type: &str, payload: &str) -> Result<i64, StoreError> {
        let now = now_millis();
        let mut tables = lock_unpoisoned(&self.tables);
        tables.next_id += 1;
        let id = tables.next_id;
        tables.tasks.insert(
            id,
            TaskRecord {
                id,
                task_type: task_type.to_string(),
                payload: payload.to_string(),
                status: TaskStatus::Pending,
                result: None,
                error: None,
                created_at: now,
                updated_at: now,
                started_at: None,
                finished_at: None,
            },
        );
        Ok(id)
    }

    async fn oldest_pending(&self) -> Result<Option<i64>, StoreError> {
        let tables = lock_unpoisoned(&self.tables);
        Ok(tables
            .tasks
            .values()
            .find(|task| task.status == TaskStatus::Pending)
            .map(|task| task.id))
    }

    async fn try_claim(&self, id: i64, now_ms: i64) -> Result<bool, StoreError> {
        Ok(self.transition(id, TaskStatus::Pending, |task| {
            task.status = TaskStatus::Running;
            task.started_at = Some(now_ms);
            task.updated_at = now_ms;
        }))
    }

    async fn finalize_done(&self, id: i64, result: &str, now_ms: i64) -> Result<bool, StoreError> {
        Ok(self.transition(id, TaskStatus::Running, |task| {
            task.status = TaskStatus::Done;
            task.result = Some(result.to_string());
            task.error = None;
            task.finished_at = Some(now_ms);
            task.updated_at = now_ms;
        }))
    }

    async fn finalize_failed(
        &self,
        id: i64,
        error: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        Ok(self.transition(id, TaskStatus::Running, |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(error.to_string());
            task.result = None;
            task.finished_at = Some(now_ms);
            task.updated_at = now_ms;
        }))
    }

    async fn get(&self, id: i64) -> Result<Option<TaskRecord>, StoreError> {
        Ok(lock_unpoisoned(&self.tables).tasks.get(&id).cloned())
    }

    async fn list_running(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let tables = lock_unpoisoned(&self.tables);
        Ok(tables
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Running)
            .cloned()
            .collect())
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        let tables = lock_unpoisoned(&self.tables);
        let mut counts = TaskCounts::default();
        for task in tables.tasks.values() {
            counts.add(task.status, 1);
        }
        Ok(counts)
    }
}
