//! Cron scheduling of alerts, reports, and synthetic probes.
//!
//! The scheduler owns a map from schedulable id to exactly one live timer
//! task. Rescheduling an id atomically replaces its task; `refresh`
//! reconciles the live set against the currently enabled catalog without
//! touching tasks whose schedule is unchanged. The scheduler holds no
//! business logic: every firing calls back into the configured
//! [`ScheduleRunner`], and each firing is spawned detached, so cancelling a
//! timer never cancels an evaluation already in flight.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Identifies one schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskId {
    /// A stored alert.
    Alert(String),
    /// A report template.
    Report(String),
    /// A synthetic probe.
    Probe(String),
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alert(id) => write!(f, "alert:{id}"),
            Self::Report(id) => write!(f, "report:{id}"),
            Self::Probe(id) => write!(f, "probe:{id}"),
        }
    }
}

/// Errors raised when registering a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The cron expression is not valid five-field cron.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        /// The offending expression.
        expression: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Receives scheduler firings. Implementations must handle their own errors;
/// a firing never propagates failures back into the scheduler.
#[async_trait]
pub trait ScheduleRunner: Send + Sync {
    /// Runs the work bound to `id` once.
    async fn run(&self, id: TaskId);
}

struct ScheduledTask {
    cron_expression: String,
    handle: JoinHandle<()>,
}

/// Owns the live timer tasks.
///
/// Constructed once at process start and shared by reference; there is no
/// process-global scheduler state.
pub struct Scheduler {
    runner: Arc<dyn ScheduleRunner>,
    tasks: Mutex<HashMap<TaskId, ScheduledTask>>,
}

impl Scheduler {
    /// Creates a scheduler that dispatches firings to `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn ScheduleRunner>) -> Self {
        Self {
            runner,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Validates a five-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidCron`] when the expression does not
    /// have five fields or does not parse.
    pub fn validate_expression(expression: &str) -> Result<cron::Schedule, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::InvalidCron {
                expression: expression.to_string(),
                reason: format!("expected 5 fields, found {}", fields.len()),
            });
        }
        // the cron crate wants a seconds field; pin it to zero
        let normalized = format!("0 {}", fields.join(" "));
        cron::Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
    }

    /// Schedules `id` with the given cron expression, atomically replacing
    /// any existing task for the same id.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidCron`] if the expression is invalid;
    /// in that case any existing task for `id` is left untouched.
    pub async fn schedule(&self, id: TaskId, expression: &str) -> Result<(), ScheduleError> {
        let schedule = Self::validate_expression(expression)?;

        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.remove(&id) {
            existing.handle.abort();
        }

        tracing::info!(task = %id, cron = expression, "Scheduling task");
        let handle = tokio::spawn(run_timer(schedule, id.clone(), Arc::clone(&self.runner)));
        tasks.insert(
            id,
            ScheduledTask {
                cron_expression: expression.to_string(),
                handle,
            },
        );
        Ok(())
    }

    /// Stops and removes the task for `id`. Returns whether a task existed.
    ///
    /// A firing already in flight runs to completion; only future firings
    /// are cancelled.
    pub async fn unschedule(&self, id: &TaskId) -> bool {
        let mut tasks = self.tasks.lock().await;
        match tasks.remove(id) {
            Some(task) => {
                tracing::info!(task = %id, "Unscheduling task");
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Reconciles the live task set against `desired` (id, cron) pairs.
    ///
    /// Tasks not in `desired` are stopped; new ids are scheduled; ids whose
    /// expression is unchanged are left untouched. An invalid expression is
    /// logged and skipped, never allowed to stop the other tasks.
    pub async fn refresh(&self, desired: Vec<(TaskId, String)>) {
        let desired: HashMap<TaskId, String> = desired.into_iter().collect();
        let stale: Vec<TaskId> = {
            let tasks = self.tasks.lock().await;
            tasks
                .keys()
                .filter(|id| !desired.contains_key(id))
                .cloned()
                .collect()
        };
        for id in stale {
            self.unschedule(&id).await;
        }

        for (id, expression) in desired {
            let unchanged = {
                let tasks = self.tasks.lock().await;
                tasks
                    .get(&id)
                    .is_some_and(|task| task.cron_expression == expression)
            };
            if unchanged {
                continue;
            }
            if let Err(e) = self.schedule(id.clone(), &expression).await {
                tracing::warn!(task = %id, error = %e, "Skipping task with invalid schedule");
            }
        }
    }

    /// Returns whether a live task exists for `id`.
    pub async fn is_scheduled(&self, id: &TaskId) -> bool {
        self.tasks.lock().await.contains_key(id)
    }

    /// Returns the ids of all live tasks.
    pub async fn scheduled_ids(&self) -> Vec<TaskId> {
        self.tasks.lock().await.keys().cloned().collect()
    }

    /// Stops every task. Used for clean teardown.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (id, task) in tasks.drain() {
            tracing::debug!(task = %id, "Stopping task on shutdown");
            task.handle.abort();
        }
    }
}

async fn run_timer(schedule: cron::Schedule, id: TaskId, runner: Arc<dyn ScheduleRunner>) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.after(&now).next() else {
            tracing::warn!(task = %id, "Schedule has no future firings, stopping timer");
            break;
        };
        let delay = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(delay).await;

        // fire detached so a slow run never blocks this timer, and so an
        // unschedule aborts future firings only
        let runner = Arc::clone(&runner);
        let task_id = id.clone();
        tokio::spawn(async move {
            runner.run(task_id).await;
        });
    }
}
