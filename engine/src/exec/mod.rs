//! Execution gateway: backend selection, query execution, result
//! normalization.
//!
//! The active backend is a process-wide choice fixed at startup; a gateway
//! never switches backends at runtime. Whichever backend runs the SQL, the
//! caller sees the same [`ResultSet`] shape: typed columns in plan order and
//! rows as field-to-value mappings.

mod columnar;
mod embedded;

pub use columnar::ColumnarBackend;
pub use embedded::EmbeddedBackend;

use crate::query::{AggFunc, QueryPlan, Stage};
use crate::render;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// One result row: field name to value.
pub type Row = HashMap<String, serde_json::Value>;

/// Errors surfaced by query execution.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The backend could not be reached.
    #[error("Backend connection failure: {0}")]
    ConnectionFailure(String),

    /// The backend did not answer in time.
    #[error("Backend timeout: {0}")]
    Timeout(String),

    /// The backend rejected SQL this engine generated.
    #[error("Rendered query rejected by backend: {0}")]
    SyntaxTranslationBug(String),

    /// The backend refused the query for resource reasons.
    #[error("Backend resource limit: {0}")]
    ResourceLimit(String),
}

/// Inferred type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Text values.
    String,
    /// Integer values.
    Integer,
    /// Floating point values.
    Float,
    /// Epoch-millisecond timestamps.
    Timestamp,
}

/// One result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, as declared by the plan's output schema.
    pub name: String,
    /// The column's value type.
    pub column_type: ColumnType,
}

/// A normalized, backend-agnostic query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Columns in plan output order.
    pub columns: Vec<Column>,
    /// Result rows, in backend return order.
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the result has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The configured execution backend.
pub enum Backend {
    /// The columnar analytics store (ClickHouse).
    Columnar(ColumnarBackend),
    /// The embedded relational store (SQLite + FTS5).
    Embedded(EmbeddedBackend),
}

impl Backend {
    /// A short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Columnar(_) => "columnar",
            Self::Embedded(_) => "embedded",
        }
    }
}

/// Executes query plans against the process's one configured backend.
pub struct ExecutionGateway {
    backend: Backend,
}

impl ExecutionGateway {
    /// Creates a gateway over the given backend.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Creates a gateway from engine configuration, opening the configured
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the embedded database cannot be opened.
    pub fn from_config(config: &crate::config::EngineConfig) -> Result<Self, ExecError> {
        let backend = match config.backend {
            crate::config::BackendKind::Columnar => {
                Backend::Columnar(ColumnarBackend::connect(&config.database))
            }
            crate::config::BackendKind::Embedded => {
                Backend::Embedded(EmbeddedBackend::open(&config.data_path)?)
            }
        };
        Ok(Self::new(backend))
    }

    /// The active backend's name, for logs.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Executes a plan and normalizes the result.
    ///
    /// When the plan carries a compare offset, rows from both windows are
    /// returned together, tagged by an extra `_window` column with the values
    /// `current` and `comparison`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] describing the backend failure. The gateway
    /// never retries; retry policy belongs to the caller.
    pub async fn execute(&self, plan: &QueryPlan) -> Result<ResultSet, ExecError> {
        let native = match &self.backend {
            Backend::Columnar(_) => render::columnar::render(plan),
            Backend::Embedded(_) => render::embedded::render(plan),
        };

        tracing::debug!(
            backend = self.backend.name(),
            sql = %native.current.sql,
            "Executing rendered query"
        );

        let mut rows = self.run_statement(&native.current).await?;
        let mut columns: Vec<Column> = plan
            .output_fields
            .iter()
            .map(|field| Column {
                name: field.clone(),
                column_type: column_type_for(plan, field),
            })
            .collect();

        if let Some(comparison) = &native.comparison {
            let comparison_rows = self.run_statement(comparison).await?;
            for row in &mut rows {
                row.insert("_window".to_string(), serde_json::json!("current"));
            }
            rows.extend(comparison_rows.into_iter().map(|mut row| {
                row.insert("_window".to_string(), serde_json::json!("comparison"));
                row
            }));
            columns.push(Column {
                name: "_window".to_string(),
                column_type: ColumnType::String,
            });
        }

        normalize_rows(&columns, &mut rows);
        Ok(ResultSet { columns, rows })
    }

    /// Ingests a batch of events into the active backend.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the write fails.
    pub async fn ingest(&self, events: Vec<crate::models::LogEvent>) -> Result<(), ExecError> {
        match &self.backend {
            Backend::Columnar(backend) => backend.insert_batch(events).await,
            Backend::Embedded(backend) => backend.insert_batch(&events).await,
        }
    }

    async fn run_statement(
        &self,
        statement: &render::RenderedStatement,
    ) -> Result<Vec<Row>, ExecError> {
        match &self.backend {
            Backend::Columnar(backend) => backend.execute_statement(statement).await,
            Backend::Embedded(backend) => backend.execute_statement(statement).await,
        }
    }
}

/// The column type a plan output field carries, derived from the schema
/// rather than sniffed from row values (so both backends normalize alike).
fn column_type_for(plan: &QueryPlan, field: &str) -> ColumnType {
    match field {
        "timestamp" | "_time" => return ColumnType::Timestamp,
        "severity" => return ColumnType::Integer,
        "host" | "source" | "message" | "raw" => return ColumnType::String,
        _ => {}
    }

    let aggregation = match plan.aggregation() {
        Some(Stage::Stats { aggregations, .. }) => {
            aggregations.iter().find(|a| a.output_name() == field)
        }
        Some(Stage::Timechart { aggregation, .. }) => {
            Some(aggregation).filter(|a| a.output_name() == field)
        }
        _ => None,
    };

    match aggregation {
        Some(agg) => match agg.func {
            AggFunc::Count => ColumnType::Integer,
            AggFunc::Avg => ColumnType::Float,
            AggFunc::Sum => match agg.field.as_deref() {
                Some("severity" | "timestamp") => ColumnType::Integer,
                _ => ColumnType::Float,
            },
            AggFunc::Min | AggFunc::Max => match agg.field.as_deref() {
                Some("severity" | "timestamp") => ColumnType::Integer,
                _ => ColumnType::String,
            },
        },
        None => ColumnType::String,
    }
}

/// Coerces backend-specific value encodings (e.g. ClickHouse's quoted 64-bit
/// integers in JSON output) to the declared column types.
fn normalize_rows(columns: &[Column], rows: &mut [Row]) {
    for row in rows.iter_mut() {
        for column in columns {
            if let Some(value) = row.get_mut(&column.name) {
                coerce_value(value, column.column_type);
            }
        }
    }
}

fn coerce_value(value: &mut serde_json::Value, column_type: ColumnType) {
    match column_type {
        ColumnType::Integer | ColumnType::Timestamp => {
            if let serde_json::Value::String(text) = value {
                if let Ok(parsed) = text.parse::<i64>() {
                    *value = serde_json::json!(parsed);
                }
            }
        }
        ColumnType::Float => {
            if let serde_json::Value::String(text) = value {
                if let Ok(parsed) = text.parse::<f64>() {
                    *value = serde_json::json!(parsed);
                }
            }
        }
        ColumnType::String => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;
    use chrono::{TimeZone, Utc};

    fn plan_for(query: &str) -> QueryPlan {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        QueryPlan::build_at(parse(query).unwrap(), "-1h", None, now).unwrap()
    }

    #[test]
    fn test_column_types_for_base_fields() {
        let plan = plan_for("search *");

        assert_eq!(column_type_for(&plan, "timestamp"), ColumnType::Timestamp);
        assert_eq!(column_type_for(&plan, "severity"), ColumnType::Integer);
        assert_eq!(column_type_for(&plan, "message"), ColumnType::String);
    }

    #[test]
    fn test_column_types_for_aggregations() {
        let plan = plan_for("search * | stats count, avg(severity), max(severity) by host");

        assert_eq!(column_type_for(&plan, "host"), ColumnType::String);
        assert_eq!(column_type_for(&plan, "count"), ColumnType::Integer);
        assert_eq!(column_type_for(&plan, "avg(severity)"), ColumnType::Float);
        assert_eq!(column_type_for(&plan, "max(severity)"), ColumnType::Integer);
    }

    #[test]
    fn test_column_type_for_timechart_bucket() {
        let plan = plan_for("search * | timechart span=5m count");

        assert_eq!(column_type_for(&plan, "_time"), ColumnType::Timestamp);
        assert_eq!(column_type_for(&plan, "count"), ColumnType::Integer);
    }

    #[test]
    fn test_coerce_quoted_integers() {
        let mut value = serde_json::json!("42");
        coerce_value(&mut value, ColumnType::Integer);
        assert_eq!(value, serde_json::json!(42));

        // free text is left alone
        let mut value = serde_json::json!("42");
        coerce_value(&mut value, ColumnType::String);
        assert_eq!(value, serde_json::json!("42"));
    }

    #[tokio::test]
    async fn test_gateway_executes_against_embedded_backend() {
        use crate::models::{LogEvent, Severity};

        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let gateway = ExecutionGateway::new(Backend::Embedded(backend));

        gateway
            .ingest(vec![
                LogEvent::new(Severity::Error, "disk full", "web-01"),
                LogEvent::new(Severity::Info, "started", "web-02"),
            ])
            .await
            .unwrap();

        let plan = QueryPlan::build(parse("search severity<=3").unwrap(), "-1h", None).unwrap();
        let result = gateway.execute(&plan).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(
            result.rows[0].get("message"),
            Some(&serde_json::json!("disk full"))
        );
        assert_eq!(result.columns.len(), 6);
    }

    #[tokio::test]
    async fn test_gateway_tags_comparison_rows() {
        use crate::models::{LogEvent, Severity};
        use chrono::Duration;

        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let gateway = ExecutionGateway::new(Backend::Embedded(backend));

        let now = Utc::now();
        gateway
            .ingest(vec![
                LogEvent::new(Severity::Error, "today", "web-01"),
                LogEvent::new(Severity::Error, "yesterday", "web-01")
                    .with_timestamp(now - Duration::days(1) - Duration::minutes(5)),
            ])
            .await
            .unwrap();

        let plan = QueryPlan::build(parse("search * | stats count").unwrap(), "-1h", Some("1d"))
            .unwrap();
        let result = gateway.execute(&plan).await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.columns.iter().any(|c| c.name == "_window"));
        let windows: Vec<_> = result
            .rows
            .iter()
            .map(|r| r.get("_window").cloned().unwrap())
            .collect();
        assert!(windows.contains(&serde_json::json!("current")));
        assert!(windows.contains(&serde_json::json!("comparison")));
    }
}
