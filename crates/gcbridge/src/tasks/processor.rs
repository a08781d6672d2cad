//! Polling task processor.
//!
//! Each tick claims at most one PENDING task, runs its handler and
//! finalizes the row. Ticks never overlap: while a task is executing,
//! further ticks are skipped rather than queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::error::TaskError;
use super::registry::{TaskContext, TaskRegistry};
use crate::config::MIN_POLL_INTERVAL;
use crate::store::{StoreError, TaskRecord, TaskStatus, TaskStore, now_millis};

/// Attempts for the single finalize write before the row is given up on.
const FINALIZE_ATTEMPTS: u32 = 4;
const FINALIZE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick is still executing.
    Busy,
    /// Nothing to claim.
    Idle,
    Finalized { id: i64, status: TaskStatus },
}

/// Holds the busy flag for the duration of a tick.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct TaskProcessor {
    store: Arc<dyn TaskStore>,
    registry: Arc<TaskRegistry>,
    poll_interval: Duration,
    busy: AtomicBool,
}

impl TaskProcessor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<TaskRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            busy: AtomicBool::new(false),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Report tasks left RUNNING by a previous process.
    ///
    /// They are not retried: their GC side effects may already have
    /// happened. Returns how many were found.
    pub async fn startup_check(&self) -> Result<usize, StoreError> {
        let stale = self.store.list_running().await?;
        for task in &stale {
            tracing::warn!(
                target: "gcbridge::task",
                task_id = task.id,
                task_type = %task.task_type,
                started_at = task.started_at,
                "Task left RUNNING by a previous run; not retrying"
            );
        }
        Ok(stale.len())
    }

    /// Run one processing cycle.
    pub async fn tick(&self) -> Result<TickOutcome, StoreError> {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            return Ok(TickOutcome::Busy);
        };

        let Some(task) = self.store.claim_next(now_millis()).await? else {
            return Ok(TickOutcome::Idle);
        };
        tracing::info!(
            target: "gcbridge::task",
            task_id = task.id,
            task_type = %task.task_type,
            "Task claimed"
        );

        let outcome = self.execute(&task).await;
        let finished_at = now_millis();
        let elapsed_ms = task.started_at.map(|started| finished_at - started);

        let (status, written) = match outcome {
            Ok(result) => {
                tracing::info!(
                    target: "gcbridge::task",
                    task_id = task.id,
                    task_type = %task.task_type,
                    elapsed_ms,
                    "Task done"
                );
                let result = result.to_string();
                let written = self
                    .finalize(task.id, TaskStatus::Done, || {
                        self.store.finalize_done(task.id, &result, finished_at)
                    })
                    .await?;
                (TaskStatus::Done, written)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(
                    target: "gcbridge::task",
                    task_id = task.id,
                    task_type = %task.task_type,
                    elapsed_ms,
                    error = %message,
                    "Task failed"
                );
                let written = self
                    .finalize(task.id, TaskStatus::Failed, || {
                        self.store.finalize_failed(task.id, &message, finished_at)
                    })
                    .await?;
                (TaskStatus::Failed, written)
            }
        };

        if !written {
            tracing::warn!(
                target: "gcbridge::task",
                task_id = task.id,
                "Task was no longer RUNNING at finalize; row left unchanged"
            );
        }
        Ok(TickOutcome::Finalized {
            id: task.id,
            status,
        })
    }

    /// Run one finalize write, retrying store errors with a doubling
    /// backoff so a transient failure does not strand the row in RUNNING.
    async fn finalize<F, Fut>(
        &self,
        id: i64,
        status: TaskStatus,
        write: F,
    ) -> Result<bool, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<bool, StoreError>>,
    {
        let mut backoff = FINALIZE_BACKOFF;
        let mut attempt = 1;
        loop {
            match write().await {
                Ok(written) => return Ok(written),
                Err(e) if attempt < FINALIZE_ATTEMPTS => {
                    tracing::warn!(
                        target: "gcbridge::task",
                        task_id = id,
                        %status,
                        attempt,
                        error = %e,
                        "Finalize failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        target: "gcbridge::task",
                        task_id = id,
                        %status,
                        attempts = attempt,
                        error = %e,
                        "Could not finalize task; row left RUNNING"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn execute(&self, task: &TaskRecord) -> Result<serde_json::Value, TaskError> {
        let payload: serde_json::Value = serde_json::from_str(&task.payload)
            .map_err(|e| TaskError::Validation(format!("payload is not valid JSON: {e}")))?;
        let handler = self
            .registry
            .get(&task.task_type)
            .ok_or_else(|| TaskError::UnknownTaskType(task.task_type.clone()))?;

        let ctx = TaskContext {
            task_id: task.id,
            task_type: task.task_type.clone(),
        };
        std::panic::AssertUnwindSafe(handler.handle_dyn(payload, &ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(TaskError::Handler(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            })
    }

    /// Tick every poll interval until `shutdown` flips to true.
    ///
    /// Ticks run on their own task so a slow handler never delays the
    /// schedule; overlapping ticks return [`TickOutcome::Busy`]. On shutdown
    /// the in-flight tick is awaited.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<()>> = None;

        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            task_types = ?self.registry.task_types(),
            "Task processor started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.is_busy() {
                        tracing::debug!("Previous cycle still running, skipping tick");
                        continue;
                    }
                    let processor = Arc::clone(&self);
                    in_flight = Some(tokio::spawn(async move {
                        match processor.tick().await {
                            Ok(outcome) => tracing::trace!(?outcome, "Tick finished"),
                            Err(e) => tracing::error!(error = %e, "Task store error during tick"),
                        }
                    }));
                }
            }
        }

        if let Some(task) = in_flight
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "In-flight tick did not complete cleanly");
        }
        tracing::info!("Task processor stopped");
    }
}
