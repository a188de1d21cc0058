//! Scheduled report and synthetic probe runners.
//!
//! Reports run a catalog query on schedule, format the result as CSV or
//! JSON, and deliver it through the action dispatch seam. Probes run a known
//! query end to end and record success and latency. Both capture their
//! failures instead of propagating them, so one bad template can never stop
//! the scheduler.

use crate::alert::ActionDispatcher;
use crate::exec::{ExecutionGateway, ResultSet};
use crate::models::{ActionKind, ReportFormat, ReportTemplate, SendCondition, SyntheticProbe};
use crate::query;
use crate::storage::AlertStore;
use std::sync::Arc;

/// Outcome of one report run.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// The report template id.
    pub report_id: String,
    /// Number of result rows.
    pub result_count: u64,
    /// Whether the rendered report was handed to the dispatcher.
    pub delivered: bool,
    /// Query or dispatch failure, if any.
    pub error: Option<String>,
}

/// Runs report templates through the gateway and dispatch seam.
pub struct ReportRunner {
    gateway: Arc<ExecutionGateway>,
    store: Arc<dyn AlertStore>,
    dispatcher: Arc<dyn ActionDispatcher>,
}

impl ReportRunner {
    /// Creates a runner over the given collaborators.
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
        }
    }

    /// Runs the report template with the given id.
    pub async fn run_by_id(&self, report_id: &str) -> ReportOutcome {
        let template = match self.store.get_report_template(report_id) {
            Ok(Some(template)) => template,
            Ok(None) => {
                return ReportOutcome {
                    report_id: report_id.to_string(),
                    result_count: 0,
                    delivered: false,
                    error: Some(format!("Report template not found: {report_id}")),
                }
            }
            Err(e) => {
                return ReportOutcome {
                    report_id: report_id.to_string(),
                    result_count: 0,
                    delivered: false,
                    error: Some(e.to_string()),
                }
            }
        };
        self.run(&template).await
    }

    /// Runs one report template.
    pub async fn run(&self, template: &ReportTemplate) -> ReportOutcome {
        let mut outcome = ReportOutcome {
            report_id: template.id.clone(),
            result_count: 0,
            delivered: false,
            error: None,
        };

        let results = match query::compile(&template.query, &template.time_range, None) {
            Ok(plan) => match self.gateway.execute(&plan).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(report = %template.name, error = %e, "Report query failed");
                    outcome.error = Some(e.to_string());
                    return outcome;
                }
            },
            Err(e) => {
                tracing::warn!(report = %template.name, error = %e, "Report query failed to compile");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        outcome.result_count = results.len() as u64;

        if template.send_condition == SendCondition::NonEmpty && results.is_empty() {
            tracing::debug!(report = %template.name, "Report empty, delivery skipped");
            return outcome;
        }

        let rendered = match template.format {
            ReportFormat::Csv => format_csv(&results),
            ReportFormat::Json => format_json(&results),
        };
        let target = template.recipients.join(", ");

        match self
            .dispatcher
            .dispatch(ActionKind::Email, &target, &rendered)
            .await
        {
            Ok(()) => outcome.delivered = true,
            Err(e) => {
                tracing::warn!(report = %template.name, error = %e, "Report delivery failed");
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }
}

/// Outcome of one synthetic probe run.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// The probe id.
    pub probe_id: String,
    /// Whether the probe query executed without error.
    pub success: bool,
    /// Number of result rows.
    pub result_count: u64,
    /// Wall-clock duration of the compile + execute path.
    pub latency_ms: u64,
    /// Failure detail, when `success` is false.
    pub error: Option<String>,
}

/// Runs synthetic probes: end-to-end query health checks.
pub struct ProbeRunner {
    gateway: Arc<ExecutionGateway>,
    store: Arc<dyn AlertStore>,
}

impl ProbeRunner {
    /// Creates a runner over the given collaborators.
    #[must_use]
    pub fn new(gateway: Arc<ExecutionGateway>, store: Arc<dyn AlertStore>) -> Self {
        Self { gateway, store }
    }

    /// Runs the probe with the given id.
    pub async fn run_by_id(&self, probe_id: &str) -> ProbeOutcome {
        match self.store.get_probe(probe_id) {
            Ok(Some(probe)) => self.run(&probe).await,
            Ok(None) => ProbeOutcome {
                probe_id: probe_id.to_string(),
                success: false,
                result_count: 0,
                latency_ms: 0,
                error: Some(format!("Probe not found: {probe_id}")),
            },
            Err(e) => ProbeOutcome {
                probe_id: probe_id.to_string(),
                success: false,
                result_count: 0,
                latency_ms: 0,
                error: Some(e.to_string()),
            },
        }
    }

    /// Runs one probe.
    pub async fn run(&self, probe: &SyntheticProbe) -> ProbeOutcome {
        let started = std::time::Instant::now();
        let result = match query::compile(&probe.query, &probe.time_range, None) {
            Ok(plan) => self.gateway.execute(&plan).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(results) => {
                tracing::info!(
                    probe = %probe.name,
                    rows = results.len(),
                    latency_ms,
                    "Probe succeeded"
                );
                ProbeOutcome {
                    probe_id: probe.id.clone(),
                    success: true,
                    result_count: results.len() as u64,
                    latency_ms,
                    error: None,
                }
            }
            Err(error) => {
                tracing::warn!(probe = %probe.name, latency_ms, error = %error, "Probe failed");
                ProbeOutcome {
                    probe_id: probe.id.clone(),
                    success: false,
                    result_count: 0,
                    latency_ms,
                    error: Some(error),
                }
            }
        }
    }
}

/// Formats a result set as CSV with a header row.
#[must_use]
pub fn format_csv(results: &ResultSet) -> String {
    let mut out = String::new();
    let header: Vec<String> = results
        .columns
        .iter()
        .map(|c| csv_escape(&c.name))
        .collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in &results.rows {
        let cells: Vec<String> = results
            .columns
            .iter()
            .map(|c| csv_escape(&cell_text(row.get(&c.name))))
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

/// Formats a result set as a JSON array of row objects, in column order.
#[must_use]
pub fn format_json(results: &ResultSet) -> String {
    let rows: Vec<serde_json::Value> = results
        .rows
        .iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            for column in &results.columns {
                object.insert(
                    column.name.clone(),
                    row.get(&column.name).cloned().unwrap_or(serde_json::Value::Null),
                );
            }
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(rows).to_string()
}

fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn csv_escape(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::TracingDispatcher;
    use crate::exec::{Backend, Column, ColumnType, EmbeddedBackend};
    use crate::models::{LogEvent, Severity};
    use crate::storage::InMemoryAlertStore;

    fn result_set() -> ResultSet {
        ResultSet {
            columns: vec![
                Column {
                    name: "host".to_string(),
                    column_type: ColumnType::String,
                },
                Column {
                    name: "count".to_string(),
                    column_type: ColumnType::Integer,
                },
            ],
            rows: vec![
                std::collections::HashMap::from([
                    ("host".to_string(), serde_json::json!("web, 01")),
                    ("count".to_string(), serde_json::json!(3)),
                ]),
                std::collections::HashMap::from([
                    ("host".to_string(), serde_json::json!("db-01")),
                    ("count".to_string(), serde_json::json!(1)),
                ]),
            ],
        }
    }

    #[test]
    fn test_format_csv_escapes_and_orders() {
        let csv = format_csv(&result_set());
        assert_eq!(csv, "host,count\n\"web, 01\",3\ndb-01,1\n");
    }

    #[test]
    fn test_format_json_uses_column_order() {
        let json = format_json(&result_set());
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["host"], serde_json::json!("web, 01"));
        assert_eq!(parsed[1]["count"], serde_json::json!(1));
    }

    async fn runner_with_events(events: Vec<LogEvent>) -> (ReportRunner, Arc<InMemoryAlertStore>) {
        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let gateway = ExecutionGateway::new(Backend::Embedded(backend));
        gateway.ingest(events).await.unwrap();
        let store = InMemoryAlertStore::new_shared();
        let runner = ReportRunner::new(
            Arc::new(gateway),
            Arc::clone(&store) as _,
            Arc::new(TracingDispatcher),
        );
        (runner, store)
    }

    fn csv_report(send_condition: SendCondition) -> ReportTemplate {
        ReportTemplate {
            id: "r1".to_string(),
            name: "Errors by host".to_string(),
            query: "search severity<=3 | stats count by host".to_string(),
            time_range: "-1h".to_string(),
            cron_expression: "0 6 * * *".to_string(),
            format: ReportFormat::Csv,
            send_condition,
            recipients: vec!["ops@example.com".to_string()],
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_report_runs_and_delivers() {
        let (runner, store) = runner_with_events(vec![LogEvent::new(
            Severity::Error,
            "boom",
            "web-01",
        )])
        .await;
        store.seed_report_templates(vec![csv_report(SendCondition::Always)]);

        let outcome = runner.run_by_id("r1").await;
        assert!(outcome.delivered);
        assert_eq!(outcome.result_count, 1);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_report_non_empty_condition_skips_delivery() {
        let (runner, store) = runner_with_events(vec![]).await;
        store.seed_report_templates(vec![csv_report(SendCondition::NonEmpty)]);

        let outcome = runner.run_by_id("r1").await;
        assert!(!outcome.delivered);
        assert_eq!(outcome.result_count, 0);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_report_missing_template_captured() {
        let (runner, _store) = runner_with_events(vec![]).await;

        let outcome = runner.run_by_id("missing").await;
        assert!(!outcome.delivered);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_probe_success_and_failure() {
        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let gateway = Arc::new(ExecutionGateway::new(Backend::Embedded(backend)));
        let store = InMemoryAlertStore::new_shared();
        store.seed_probes(vec![
            SyntheticProbe {
                id: "p1".to_string(),
                name: "search health".to_string(),
                query: "search * | stats count".to_string(),
                time_range: "-5m".to_string(),
                cron_expression: "*/5 * * * *".to_string(),
                enabled: true,
            },
            SyntheticProbe {
                id: "p2".to_string(),
                name: "broken probe".to_string(),
                query: "search * | explode".to_string(),
                time_range: "-5m".to_string(),
                cron_expression: "*/5 * * * *".to_string(),
                enabled: true,
            },
        ]);

        let runner = ProbeRunner::new(gateway, store as _);

        let ok = runner.run_by_id("p1").await;
        assert!(ok.success);
        assert!(ok.error.is_none());

        let bad = runner.run_by_id("p2").await;
        assert!(!bad.success);
        assert!(bad.error.is_some());
    }
}
