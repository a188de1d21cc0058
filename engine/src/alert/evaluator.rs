//! Alert evaluation state machine.
//!
//! One evaluation runs the alert's stored query through the execution
//! gateway, applies the trigger condition, and writes exactly one history
//! entry whatever the outcome (fired, not fired, or query failure). Per
//! alert id, at most one evaluation is in flight at a time: concurrent
//! callers join the running evaluation and observe the same history entry,
//! so overlapping schedules never duplicate side effects.

use super::actions::ActionDispatcher;
use crate::exec::{ExecError, ExecutionGateway, ResultSet};
use crate::models::{ActionResult, Alert, AlertHistoryEntry, TriggerType};
use crate::query::{self, QueryError};
use crate::storage::{AlertStore, StoreError};
use crate::template;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

/// How many result rows are snapshotted into each history entry.
const SAMPLE_LIMIT: usize = 5;

/// Errors returned by [`AlertEvaluator::evaluate`].
///
/// Query and backend failures are not errors at this boundary: they are
/// captured in the history entry so the scheduler above keeps running.
#[derive(Debug, Error)]
pub enum EvaluateError {
    /// No alert with the given id exists.
    #[error("Alert not found: {0}")]
    NotFound(String),

    /// The alert store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The in-flight evaluation this caller joined ended without a result.
    #[error("Evaluation of alert '{0}' was interrupted")]
    Interrupted(String),
}

/// Errors returned by the dry-run test path.
#[derive(Debug, Error)]
pub enum TestError {
    /// The query text did not compile.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The backend failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Outcome of a dry-run alert test.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Whether the trigger condition would have fired.
    pub would_trigger: bool,
    /// Number of result rows the query returned.
    pub result_count: u64,
    /// Bounded snapshot of the first result rows.
    pub sample_results: Vec<crate::exec::Row>,
}

type InFlightReceiver = watch::Receiver<Option<AlertHistoryEntry>>;

/// Evaluates alerts against the execution gateway.
pub struct AlertEvaluator {
    gateway: Arc<ExecutionGateway>,
    store: Arc<dyn AlertStore>,
    dispatcher: Arc<dyn ActionDispatcher>,
    in_flight: Mutex<HashMap<String, InFlightReceiver>>,
}

impl AlertEvaluator {
    /// Creates an evaluator over the given collaborators.
    #[must_use]
    pub fn new(
        gateway: Arc<ExecutionGateway>,
        store: Arc<dyn AlertStore>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        Self {
            gateway,
            store,
            dispatcher,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluates an alert once, or joins the evaluation already in flight
    /// for the same alert id.
    ///
    /// Exactly one history entry is written per evaluation; joining callers
    /// receive that same entry.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluateError`] only for missing alerts or store
    /// failures; query and backend failures are recorded in the entry.
    pub async fn evaluate(&self, alert_id: &str) -> Result<AlertHistoryEntry, EvaluateError> {
        enum Role {
            Leader(watch::Sender<Option<AlertHistoryEntry>>),
            Follower(InFlightReceiver),
        }

        let role = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(rx) = in_flight.get(alert_id) {
                Role::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                in_flight.insert(alert_id.to_string(), rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => loop {
                {
                    let value = rx.borrow();
                    if let Some(entry) = value.as_ref() {
                        return Ok(entry.clone());
                    }
                }
                if rx.changed().await.is_err() {
                    return Err(EvaluateError::Interrupted(alert_id.to_string()));
                }
            },
            Role::Leader(tx) => {
                let result = self.run_evaluation(alert_id).await;
                self.in_flight.lock().await.remove(alert_id);
                match result {
                    Ok(entry) => {
                        let _ = tx.send(Some(entry.clone()));
                        Ok(entry)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Dry-runs a query and trigger condition against caller-supplied
    /// parameters: no history entry, no action execution.
    ///
    /// # Errors
    ///
    /// Unlike [`AlertEvaluator::evaluate`], compile and backend failures are
    /// surfaced directly so the operator can fix the configuration before
    /// saving it.
    pub async fn test(
        &self,
        search_query: &str,
        trigger_type: TriggerType,
        trigger_condition: crate::models::TriggerCondition,
        trigger_threshold: u64,
        time_range: &str,
    ) -> Result<TestOutcome, TestError> {
        let plan = query::compile(search_query, time_range, None)?;
        let results = self.gateway.execute(&plan).await?;
        let result_count = results.len() as u64;

        if trigger_type == TriggerType::PerResult {
            tracing::debug!("per_result trigger tested with result-count semantics");
        }

        Ok(TestOutcome {
            would_trigger: trigger_condition.is_met(result_count, trigger_threshold),
            result_count,
            sample_results: results.rows.into_iter().take(SAMPLE_LIMIT).collect(),
        })
    }

    async fn run_evaluation(&self, alert_id: &str) -> Result<AlertHistoryEntry, EvaluateError> {
        let alert = self
            .store
            .get_alert(alert_id)?
            .ok_or_else(|| EvaluateError::NotFound(alert_id.to_string()))?;

        let started = Utc::now();
        let mut entry = AlertHistoryEntry::new(&alert.id, false, 0);
        entry.timestamp = started;

        match query::compile(&alert.search_query, &alert.time_range, None) {
            Err(e) => {
                tracing::warn!(alert = %alert.name, error = %e, "Alert query failed to compile");
                entry.error = Some(e.to_string());
            }
            Ok(plan) => match self.gateway.execute(&plan).await {
                Err(e) => {
                    tracing::warn!(alert = %alert.name, error = %e, "Alert query failed to execute");
                    entry.error = Some(e.to_string());
                }
                Ok(results) => {
                    entry.result_count = results.len() as u64;
                    entry.sample_results =
                        results.rows.iter().take(SAMPLE_LIMIT).cloned().collect();
                    entry.triggered = evaluate_trigger(&alert, entry.result_count);

                    if entry.triggered {
                        if self.is_throttled(&alert, started)? {
                            tracing::info!(
                                alert = %alert.name,
                                window_seconds = alert.throttle_window_seconds,
                                "Alert fired but actions are throttled"
                            );
                        } else {
                            entry.actions_executed =
                                Some(self.execute_actions(&alert, &entry, &results).await);
                        }
                    }
                }
            },
        }

        self.store.append_history(entry.clone())?;
        Ok(entry)
    }

    fn is_throttled(&self, alert: &Alert, now: DateTime<Utc>) -> Result<bool, StoreError> {
        if !alert.throttle_enabled {
            return Ok(false);
        }
        let window = Duration::seconds(i64::try_from(alert.throttle_window_seconds).unwrap_or(0));
        Ok(self
            .store
            .last_action_firing(&alert.id)?
            .is_some_and(|last| last > now - window))
    }

    async fn execute_actions(
        &self,
        alert: &Alert,
        entry: &AlertHistoryEntry,
        results: &ResultSet,
    ) -> Vec<ActionResult> {
        let metadata = HashMap::from([
            ("alert_name".to_string(), serde_json::json!(alert.name)),
            (
                "alert_severity".to_string(),
                serde_json::json!(alert.severity.to_string()),
            ),
            (
                "result_count".to_string(),
                serde_json::json!(entry.result_count),
            ),
            (
                "timestamp".to_string(),
                serde_json::json!(entry.timestamp.to_rfc3339()),
            ),
        ]);

        let mut outcomes = Vec::with_capacity(alert.actions.len());
        for action in &alert.actions {
            let payload = template::render(&action.template, &results.rows, &metadata);
            let outcome = match self
                .dispatcher
                .dispatch(action.kind, &action.target, &payload)
                .await
            {
                Ok(()) => ActionResult {
                    kind: action.kind,
                    target: action.target.clone(),
                    success: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(
                        alert = %alert.name,
                        kind = %action.kind,
                        target = %action.target,
                        error = %e,
                        "Action dispatch failed"
                    );
                    ActionResult {
                        kind: action.kind,
                        target: action.target.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn evaluate_trigger(alert: &Alert, result_count: u64) -> bool {
    if alert.trigger_type == TriggerType::PerResult {
        // extension point: per-row thresholds are not specified yet, so
        // per_result currently follows result-count semantics
        tracing::debug!(alert = %alert.name, "per_result trigger evaluated with result-count semantics");
    }
    alert
        .trigger_condition
        .is_met(result_count, alert.trigger_threshold)
}
