//! Public service surface for the alerting subsystem.
//!
//! [`AlertService`] is the composition root the surrounding product talks
//! to: alert CRUD with schedule upkeep, manual and scheduled evaluation,
//! dry-run testing, history access, and reconciliation of the scheduler
//! against the enabled alert/report/probe set.

use super::actions::ActionDispatcher;
use super::evaluator::{AlertEvaluator, EvaluateError, TestError, TestOutcome};
use crate::exec::ExecutionGateway;
use crate::models::{
    Alert, AlertHistoryEntry, AlertValidationError, ScheduleType, TriggerCondition, TriggerType,
};
use crate::query::{self, QueryError};
use crate::report::{ProbeOutcome, ProbeRunner, ReportOutcome, ReportRunner};
use crate::schedule::{ScheduleError, ScheduleRunner, Scheduler, TaskId};
use crate::storage::{AlertStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the service API.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The referenced alert does not exist.
    #[error("Alert not found: {0}")]
    NotFound(String),

    /// The alert configuration is invalid.
    #[error(transparent)]
    Validation(#[from] AlertValidationError),

    /// The alert's stored query does not compile.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The alert's cron expression is invalid.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// The alert store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An evaluation failed at the evaluator boundary.
    #[error(transparent)]
    Evaluate(#[from] EvaluateError),

    /// A dry-run test failed.
    #[error(transparent)]
    Test(#[from] TestError),
}

/// Dispatches scheduler firings to the matching runner.
struct EngineRunner {
    evaluator: Arc<AlertEvaluator>,
    reports: Arc<ReportRunner>,
    probes: Arc<ProbeRunner>,
}

#[async_trait]
impl ScheduleRunner for EngineRunner {
    async fn run(&self, id: TaskId) {
        match id {
            TaskId::Alert(alert_id) => match self.evaluator.evaluate(&alert_id).await {
                Ok(entry) => tracing::info!(
                    alert = %alert_id,
                    triggered = entry.triggered,
                    result_count = entry.result_count,
                    "Scheduled evaluation complete"
                ),
                Err(e) => tracing::warn!(alert = %alert_id, error = %e, "Scheduled evaluation failed"),
            },
            TaskId::Report(report_id) => {
                let outcome = self.reports.run_by_id(&report_id).await;
                match outcome.error {
                    None => tracing::info!(
                        report = %report_id,
                        delivered = outcome.delivered,
                        result_count = outcome.result_count,
                        "Scheduled report complete"
                    ),
                    Some(error) => {
                        tracing::warn!(report = %report_id, error, "Scheduled report failed");
                    }
                }
            }
            TaskId::Probe(probe_id) => {
                // the probe runner traces its own outcome
                let _ = self.probes.run_by_id(&probe_id).await;
            }
        }
    }
}

/// The alerting subsystem's public API.
pub struct AlertService {
    store: Arc<dyn AlertStore>,
    evaluator: Arc<AlertEvaluator>,
    scheduler: Arc<Scheduler>,
    reports: Arc<ReportRunner>,
    probes: Arc<ProbeRunner>,
}

impl AlertService {
    /// Wires the evaluator, runners, and scheduler over the given
    /// collaborators.
    #[must_use]
    pub fn new(
        gateway: Arc<ExecutionGateway>,
        store: Arc<dyn AlertStore>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        let evaluator = Arc::new(AlertEvaluator::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            Arc::clone(&dispatcher),
        ));
        let reports = Arc::new(ReportRunner::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            dispatcher,
        ));
        let probes = Arc::new(ProbeRunner::new(gateway, Arc::clone(&store)));
        let scheduler = Arc::new(Scheduler::new(Arc::new(EngineRunner {
            evaluator: Arc::clone(&evaluator),
            reports: Arc::clone(&reports),
            probes: Arc::clone(&probes),
        })));

        Self {
            store,
            evaluator,
            scheduler,
            reports,
            probes,
        }
    }

    /// Validates an alert's configuration: model fields, query text, time
    /// range, and cron expression.
    fn validate_config(alert: &Alert) -> Result<(), ServiceError> {
        alert.validate_alert()?;
        query::compile(&alert.search_query, &alert.time_range, None)?;
        if alert.schedule_type == ScheduleType::Cron {
            Scheduler::validate_expression(&alert.cron_expression)?;
        }
        Ok(())
    }

    /// Creates an alert and schedules it when enabled.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the configuration is invalid or the
    /// store rejects the insert. Nothing is stored or scheduled on error.
    pub async fn create_alert(&self, alert: Alert) -> Result<Alert, ServiceError> {
        Self::validate_config(&alert)?;
        self.store.create_alert(alert.clone())?;
        if alert.enabled && alert.schedule_type == ScheduleType::Cron {
            self.scheduler
                .schedule(TaskId::Alert(alert.id.clone()), &alert.cron_expression)
                .await?;
        }
        Ok(alert)
    }

    /// Updates an alert, rescheduling or unscheduling it as needed.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the configuration is invalid or the
    /// alert does not exist.
    pub async fn update_alert(&self, alert: Alert) -> Result<Alert, ServiceError> {
        Self::validate_config(&alert)?;
        self.store.update_alert(alert.clone())?;

        let task_id = TaskId::Alert(alert.id.clone());
        if alert.enabled && alert.schedule_type == ScheduleType::Cron {
            self.scheduler
                .schedule(task_id, &alert.cron_expression)
                .await?;
        } else {
            self.scheduler.unschedule(&task_id).await;
        }
        Ok(alert)
    }

    /// Deletes an alert and stops its schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the alert does not exist.
    pub async fn delete_alert(&self, id: &str) -> Result<(), ServiceError> {
        self.scheduler
            .unschedule(&TaskId::Alert(id.to_string()))
            .await;
        self.store.delete_alert(id)?;
        Ok(())
    }

    /// Fetches an alert.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id.
    pub fn get_alert(&self, id: &str) -> Result<Alert, ServiceError> {
        self.store
            .get_alert(id)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Lists all alerts.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store cannot be read.
    pub fn list_alerts(&self) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.store.list_alerts()?)
    }

    /// Evaluates one alert now (manual trigger or scheduler callback).
    ///
    /// # Errors
    ///
    /// See [`AlertEvaluator::evaluate`].
    pub async fn evaluate_alert(&self, id: &str) -> Result<AlertHistoryEntry, ServiceError> {
        Ok(self.evaluator.evaluate(id).await?)
    }

    /// Evaluates every enabled alert concurrently and returns the entries of
    /// the evaluations that completed. Individual failures are logged, never
    /// propagated.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] only if the alert list cannot be read.
    pub async fn evaluate_all_alerts(&self) -> Result<Vec<AlertHistoryEntry>, ServiceError> {
        let alerts = self.store.list_alerts()?;
        let mut set = tokio::task::JoinSet::new();
        for alert in alerts.into_iter().filter(|a| a.enabled) {
            let evaluator = Arc::clone(&self.evaluator);
            set.spawn(async move { evaluator.evaluate(&alert.id).await });
        }

        let mut entries = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(entry)) => entries.push(entry),
                Ok(Err(e)) => tracing::warn!(error = %e, "Alert evaluation failed"),
                Err(e) => tracing::warn!(error = %e, "Alert evaluation task panicked"),
            }
        }
        Ok(entries)
    }

    /// Dry-runs a query and trigger condition without touching stored state.
    ///
    /// # Errors
    ///
    /// Surfaces compile and backend errors directly for operator feedback.
    pub async fn test_alert(
        &self,
        search_query: &str,
        trigger_type: TriggerType,
        trigger_condition: TriggerCondition,
        trigger_threshold: u64,
        time_range: &str,
    ) -> Result<TestOutcome, ServiceError> {
        Ok(self
            .evaluator
            .test(
                search_query,
                trigger_type,
                trigger_condition,
                trigger_threshold,
                time_range,
            )
            .await?)
    }

    /// Returns evaluation history, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store cannot be read.
    pub fn get_alert_history(
        &self,
        alert_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertHistoryEntry>, ServiceError> {
        Ok(self.store.get_history(alert_id, limit)?)
    }

    /// Acknowledges a history entry, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] for unknown or already-acknowledged
    /// entries.
    pub fn acknowledge_alert_history(
        &self,
        entry_id: &str,
        by: &str,
        notes: Option<&str>,
    ) -> Result<AlertHistoryEntry, ServiceError> {
        Ok(self.store.acknowledge_history(entry_id, by, notes)?)
    }

    /// Runs a report template now.
    pub async fn run_report(&self, report_id: &str) -> ReportOutcome {
        self.reports.run_by_id(report_id).await
    }

    /// Runs a synthetic probe now.
    pub async fn run_probe(&self, probe_id: &str) -> ProbeOutcome {
        self.probes.run_by_id(probe_id).await
    }

    /// Reconciles the scheduler against the currently enabled alerts,
    /// reports, and probes.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if a catalog cannot be read.
    pub async fn refresh_schedules(&self) -> Result<(), ServiceError> {
        let mut desired = Vec::new();

        for alert in self.store.list_alerts()? {
            if alert.enabled && alert.schedule_type == ScheduleType::Cron {
                desired.push((TaskId::Alert(alert.id), alert.cron_expression));
            }
        }
        for report in self.store.list_report_templates()? {
            if report.enabled {
                desired.push((TaskId::Report(report.id), report.cron_expression));
            }
        }
        for probe in self.store.list_probes()? {
            if probe.enabled {
                desired.push((TaskId::Probe(probe.id), probe.cron_expression));
            }
        }

        self.scheduler.refresh(desired).await;
        Ok(())
    }

    /// The scheduler, for inspection and teardown.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::TracingDispatcher;
    use crate::exec::{Backend, EmbeddedBackend};
    use crate::models::{ActionKind, LogEvent, ReportFormat, ReportTemplate, SendCondition, Severity, SyntheticProbe};
    use crate::storage::InMemoryAlertStore;

    async fn service_with_events(events: Vec<LogEvent>) -> (AlertService, Arc<InMemoryAlertStore>) {
        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let gateway = ExecutionGateway::new(Backend::Embedded(backend));
        gateway.ingest(events).await.unwrap();
        let store = InMemoryAlertStore::new_shared();
        let service = AlertService::new(
            Arc::new(gateway),
            Arc::clone(&store) as _,
            Arc::new(TracingDispatcher),
        );
        (service, store)
    }

    fn valid_alert() -> Alert {
        Alert::new("errors", "search severity<=3")
            .with_trigger(TriggerCondition::GreaterThan, 0)
            .with_schedule("*/5 * * * *", "-5m")
            .with_action(ActionKind::Log, "audit", "{{alert_name}}")
    }

    #[tokio::test]
    async fn test_create_alert_schedules_when_enabled() {
        let (service, _store) = service_with_events(vec![]).await;
        let alert = service.create_alert(valid_alert()).await.unwrap();

        assert!(
            service
                .scheduler()
                .is_scheduled(&TaskId::Alert(alert.id.clone()))
                .await
        );
    }

    #[tokio::test]
    async fn test_create_disabled_alert_not_scheduled() {
        let (service, _store) = service_with_events(vec![]).await;
        let alert = service
            .create_alert(valid_alert().with_enabled(false))
            .await
            .unwrap();

        assert!(
            !service
                .scheduler()
                .is_scheduled(&TaskId::Alert(alert.id))
                .await
        );
    }

    #[tokio::test]
    async fn test_create_alert_with_bad_query_rejected() {
        let (service, store) = service_with_events(vec![]).await;
        let mut alert = valid_alert();
        alert.search_query = "search * | explode".to_string();

        let err = service.create_alert(alert).await.unwrap_err();
        assert!(matches!(err, ServiceError::Query(_)));
        assert!(store.list_alerts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_alert_with_bad_cron_rejected() {
        let (service, store) = service_with_events(vec![]).await;
        let mut alert = valid_alert();
        alert.cron_expression = "whenever".to_string();

        let err = service.create_alert(alert).await.unwrap_err();
        assert!(matches!(err, ServiceError::Schedule(_)));
        assert!(store.list_alerts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_alert_disabling_unschedules() {
        let (service, _store) = service_with_events(vec![]).await;
        let alert = service.create_alert(valid_alert()).await.unwrap();
        let task_id = TaskId::Alert(alert.id.clone());
        assert!(service.scheduler().is_scheduled(&task_id).await);

        service
            .update_alert(alert.with_enabled(false))
            .await
            .unwrap();
        assert!(!service.scheduler().is_scheduled(&task_id).await);
    }

    #[tokio::test]
    async fn test_delete_alert_unschedules() {
        let (service, _store) = service_with_events(vec![]).await;
        let alert = service.create_alert(valid_alert()).await.unwrap();
        let task_id = TaskId::Alert(alert.id.clone());

        service.delete_alert(&alert.id).await.unwrap();
        assert!(!service.scheduler().is_scheduled(&task_id).await);
        assert!(matches!(
            service.get_alert(&alert.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_evaluate_and_history_round_trip() {
        let (service, _store) = service_with_events(vec![LogEvent::new(
            Severity::Error,
            "boom",
            "web-01",
        )])
        .await;
        let alert = service.create_alert(valid_alert()).await.unwrap();

        let entry = service.evaluate_alert(&alert.id).await.unwrap();
        assert!(entry.triggered);

        let history = service.get_alert_history(Some(&alert.id), 10).unwrap();
        assert_eq!(history.len(), 1);

        let acked = service
            .acknowledge_alert_history(&history[0].id, "oncall", Some("seen"))
            .unwrap();
        assert!(acked.is_acknowledged());
    }

    #[tokio::test]
    async fn test_evaluate_all_only_enabled() {
        let (service, store) = service_with_events(vec![]).await;
        service.create_alert(valid_alert()).await.unwrap();
        service
            .create_alert(
                Alert::new("disabled", "search *")
                    .with_schedule("*/5 * * * *", "-5m")
                    .with_enabled(false),
            )
            .await
            .unwrap();

        let entries = service.evaluate_all_alerts().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.get_history(None, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_schedules_covers_catalogs() {
        let (service, store) = service_with_events(vec![]).await;
        service.create_alert(valid_alert()).await.unwrap();

        store.seed_report_templates(vec![ReportTemplate {
            id: "r1".to_string(),
            name: "daily".to_string(),
            query: "search * | stats count".to_string(),
            time_range: "-24h".to_string(),
            cron_expression: "0 6 * * *".to_string(),
            format: ReportFormat::Json,
            send_condition: SendCondition::Always,
            recipients: vec![],
            enabled: true,
        }]);
        store.seed_probes(vec![SyntheticProbe {
            id: "p1".to_string(),
            name: "health".to_string(),
            query: "search *".to_string(),
            time_range: "-5m".to_string(),
            cron_expression: "*/1 * * * *".to_string(),
            enabled: false,
        }]);

        service.refresh_schedules().await.unwrap();

        assert!(
            service
                .scheduler()
                .is_scheduled(&TaskId::Report("r1".to_string()))
                .await
        );
        assert!(
            !service
                .scheduler()
                .is_scheduled(&TaskId::Probe("p1".to_string()))
                .await
        );

        service.scheduler().shutdown().await;
    }

    #[tokio::test]
    async fn test_test_alert_does_not_store() {
        let (service, store) = service_with_events(vec![LogEvent::new(
            Severity::Error,
            "boom",
            "web-01",
        )])
        .await;

        let outcome = service
            .test_alert(
                "search severity<=3",
                TriggerType::NumberOfResults,
                TriggerCondition::GreaterThan,
                0,
                "-1h",
            )
            .await
            .unwrap();

        assert!(outcome.would_trigger);
        assert!(store.get_history(None, 10).unwrap().is_empty());
    }
}
