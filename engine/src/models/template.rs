//! Catalog record models: report templates, saved searches, synthetic probes.
//!
//! These are read-only inputs to the scheduler and runners; seeding and
//! editing them is the surrounding product's concern.

use serde::{Deserialize, Serialize};

/// Output format for a scheduled report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// A JSON array of row objects.
    Json,
}

/// When a rendered report is actually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendCondition {
    /// Deliver on every run.
    Always,
    /// Deliver only when the query returned at least one row.
    NonEmpty,
}

/// A scheduled report definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTemplate {
    /// Unique template id.
    pub id: String,
    /// Human-readable report name.
    pub name: String,
    /// The report's search pipeline, in DSL text form.
    pub query: String,
    /// Evaluation window expression (`-24h`, `start..end`).
    pub time_range: String,
    /// Five-field cron expression.
    pub cron_expression: String,
    /// Output format.
    pub format: ReportFormat,
    /// Delivery condition.
    #[serde(default = "default_send_condition")]
    pub send_condition: SendCondition,
    /// Recipient addresses.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Whether the report runs on schedule.
    #[serde(default)]
    pub enabled: bool,
}

fn default_send_condition() -> SendCondition {
    SendCondition::Always
}

/// A saved search offered to operators as a starting point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSearchTemplate {
    /// Unique template id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The search pipeline, in DSL text form.
    pub query: String,
    /// What the search is for.
    #[serde(default)]
    pub description: String,
    /// Catalog grouping.
    #[serde(default)]
    pub category: String,
}

/// A scheduled end-to-end query probe.
///
/// Probes run a known query through the full compile/render/execute path and
/// record success and latency, catching backend or translation regressions
/// before an operator does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticProbe {
    /// Unique probe id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The probe's search pipeline, in DSL text form.
    pub query: String,
    /// Evaluation window expression.
    pub time_range: String,
    /// Five-field cron expression.
    pub cron_expression: String,
    /// Whether the probe runs on schedule.
    #[serde(default)]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_template_deserialization_defaults() {
        let json = r#"{
            "id": "r1",
            "name": "Daily errors",
            "query": "search severity<=3 | stats count by host",
            "time_range": "-24h",
            "cron_expression": "0 6 * * *",
            "format": "csv"
        }"#;

        let report: ReportTemplate = serde_json::from_str(json).unwrap();

        assert_eq!(report.format, ReportFormat::Csv);
        assert_eq!(report.send_condition, SendCondition::Always);
        assert!(report.recipients.is_empty());
        assert!(!report.enabled);
    }

    #[test]
    fn test_send_condition_serialization() {
        assert_eq!(
            serde_json::to_string(&SendCondition::NonEmpty).unwrap(),
            "\"non_empty\""
        );
    }
}
