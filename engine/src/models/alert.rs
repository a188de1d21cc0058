//! Alert configuration and evaluation history models.
//!
//! An [`Alert`] binds a stored search query to a trigger condition, a cron
//! schedule, and a list of notification actions. Every evaluation of an alert
//! produces exactly one [`AlertHistoryEntry`], the append-only audit record
//! operators work with.

use crate::models::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use validator::Validate;

/// What the trigger condition is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Compare the number of result rows against the threshold.
    NumberOfResults,
    /// Per-row evaluation. Currently evaluated with result-count semantics;
    /// richer per-row thresholds are an extension point.
    PerResult,
}

impl Default for TriggerType {
    fn default() -> Self {
        Self::NumberOfResults
    }
}

/// Comparison applied between the evaluated value and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Value > threshold.
    GreaterThan,
    /// Value < threshold.
    LessThan,
    /// Value == threshold.
    EqualTo,
    /// Value != threshold.
    NotEqualTo,
}

impl TriggerCondition {
    /// Returns whether `value` satisfies the condition against `threshold`.
    #[must_use]
    pub fn is_met(self, value: u64, threshold: u64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::EqualTo => value == threshold,
            Self::NotEqualTo => value != threshold,
        }
    }
}

/// How an alert is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    /// Recurring evaluation driven by a cron expression.
    Cron,
    /// Streaming evaluation on ingest. Not evaluated by this engine; carried
    /// so configurations from the surrounding product round-trip.
    RealTime,
}

impl Default for ScheduleType {
    fn default() -> Self {
        Self::Cron
    }
}

/// Kind of notification action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Send an email to the target address.
    Email,
    /// POST the rendered payload to the target URL.
    Webhook,
    /// Emit the rendered payload to the engine log.
    Log,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Webhook => write!(f, "webhook"),
            Self::Log => write!(f, "log"),
        }
    }
}

/// A single configured notification action.
///
/// The `template` is rendered through the variable substitution engine with
/// the evaluation's results and alert metadata before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAction {
    /// The action kind.
    pub kind: ActionKind,
    /// Delivery target (address, URL, or log label).
    pub target: String,
    /// Payload template with `{{...}}` placeholders.
    pub template: String,
}

/// A stored alert definition.
///
/// # Example
///
/// ```
/// use engine::models::{Alert, TriggerCondition};
///
/// let alert = Alert::new("High error rate", "search severity<=3")
///     .with_trigger(TriggerCondition::GreaterThan, 100)
///     .with_schedule("*/5 * * * *", "-5m");
///
/// assert!(alert.validate_alert().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Alert {
    /// Unique alert id.
    pub id: String,

    /// Human-readable alert name.
    #[validate(length(min = 1, message = "Alert name cannot be empty"))]
    pub name: String,

    /// The stored search pipeline, in DSL text form.
    #[validate(length(min = 1, message = "Search query cannot be empty"))]
    pub search_query: String,

    /// What the trigger condition is applied to.
    #[serde(default)]
    pub trigger_type: TriggerType,

    /// Comparison applied against the threshold.
    pub trigger_condition: TriggerCondition,

    /// Threshold for the trigger comparison.
    pub trigger_threshold: u64,

    /// How the alert is scheduled.
    #[serde(default)]
    pub schedule_type: ScheduleType,

    /// Five-field cron expression (minute hour dom month dow).
    pub cron_expression: String,

    /// Evaluation window, as a relative expression (`-1h`) or an absolute
    /// `start..end` range.
    pub time_range: String,

    /// Notification actions, executed in order on a non-throttled firing.
    #[serde(default)]
    pub actions: Vec<AlertAction>,

    /// Whether action throttling is enabled.
    #[serde(default)]
    pub throttle_enabled: bool,

    /// Minimum seconds between action-executing firings.
    #[serde(default)]
    pub throttle_window_seconds: u64,

    /// Operator-facing severity of the alert itself.
    #[serde(default)]
    pub severity: Severity,

    /// Whether the alert is evaluated on schedule.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Errors that can occur during alert validation.
#[derive(Debug, Error)]
pub enum AlertValidationError {
    /// The alert name is empty.
    #[error("Alert name cannot be empty")]
    EmptyName,

    /// The search query is empty.
    #[error("Search query cannot be empty")]
    EmptyQuery,

    /// A cron schedule requires a cron expression.
    #[error("Cron-scheduled alert requires a cron expression")]
    MissingCronExpression,

    /// Throttling requires a positive window.
    #[error("Throttle window must be greater than zero when throttling is enabled")]
    InvalidThrottleWindow,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl Alert {
    /// Creates a new enabled alert with a fresh id and defaults:
    /// `number_of_results > 0`, hourly schedule, one-hour window, no actions.
    #[must_use]
    pub fn new(name: impl Into<String>, search_query: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            search_query: search_query.into(),
            trigger_type: TriggerType::NumberOfResults,
            trigger_condition: TriggerCondition::GreaterThan,
            trigger_threshold: 0,
            schedule_type: ScheduleType::Cron,
            cron_expression: "0 * * * *".to_string(),
            time_range: "-1h".to_string(),
            actions: Vec::new(),
            throttle_enabled: false,
            throttle_window_seconds: 0,
            severity: Severity::Warning,
            enabled: true,
        }
    }

    /// Sets the trigger condition and threshold.
    #[must_use]
    pub fn with_trigger(mut self, condition: TriggerCondition, threshold: u64) -> Self {
        self.trigger_condition = condition;
        self.trigger_threshold = threshold;
        self
    }

    /// Sets the cron expression and evaluation window.
    #[must_use]
    pub fn with_schedule(
        mut self,
        cron_expression: impl Into<String>,
        time_range: impl Into<String>,
    ) -> Self {
        self.cron_expression = cron_expression.into();
        self.time_range = time_range.into();
        self
    }

    /// Appends a notification action.
    #[must_use]
    pub fn with_action(
        mut self,
        kind: ActionKind,
        target: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.actions.push(AlertAction {
            kind,
            target: target.into(),
            template: template.into(),
        });
        self
    }

    /// Enables action throttling with the given window.
    #[must_use]
    pub fn with_throttle(mut self, window_seconds: u64) -> Self {
        self.throttle_enabled = true;
        self.throttle_window_seconds = window_seconds;
        self
    }

    /// Sets the alert severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets whether the alert is enabled.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validates the alert configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or query is empty, a cron schedule has no
    /// expression, or throttling is enabled with a zero window.
    pub fn validate_alert(&self) -> Result<(), AlertValidationError> {
        if self.name.is_empty() {
            return Err(AlertValidationError::EmptyName);
        }
        if self.search_query.is_empty() {
            return Err(AlertValidationError::EmptyQuery);
        }
        if self.schedule_type == ScheduleType::Cron && self.cron_expression.is_empty() {
            return Err(AlertValidationError::MissingCronExpression);
        }
        if self.throttle_enabled && self.throttle_window_seconds == 0 {
            return Err(AlertValidationError::InvalidThrottleWindow);
        }
        self.validate()?;
        Ok(())
    }
}

/// Outcome of dispatching a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// The action kind.
    pub kind: ActionKind,
    /// The delivery target.
    pub target: String,
    /// Whether dispatch succeeded.
    pub success: bool,
    /// Dispatch error, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only audit record of one alert evaluation.
///
/// Exactly one entry is written per evaluation, whether the alert fired, did
/// not fire, or the query failed. `actions_executed` is `None` when no
/// actions ran (not fired, throttled, or errored).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    /// Unique entry id.
    pub id: String,

    /// The evaluated alert's id.
    pub alert_id: String,

    /// Whether the trigger condition was met.
    pub triggered: bool,

    /// Number of result rows the query returned.
    pub result_count: u64,

    /// Bounded snapshot of the first result rows.
    #[serde(default)]
    pub sample_results: Vec<HashMap<String, serde_json::Value>>,

    /// Per-action dispatch outcomes; `None` when no actions ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_executed: Option<Vec<ActionResult>>,

    /// Query execution error, when the evaluation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the evaluation started.
    pub timestamp: DateTime<Utc>,

    /// Operator who acknowledged this entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,

    /// When the entry was acknowledged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,

    /// Free-form acknowledgement notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledgement_notes: Option<String>,
}

impl AlertHistoryEntry {
    /// Creates a new unacknowledged entry for the given alert.
    #[must_use]
    pub fn new(alert_id: impl Into<String>, triggered: bool, result_count: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            alert_id: alert_id.into(),
            triggered,
            result_count,
            sample_results: Vec::new(),
            actions_executed: None,
            error: None,
            timestamp: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            acknowledgement_notes: None,
        }
    }

    /// Returns whether the entry has been acknowledged.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_by.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_condition_is_met() {
        assert!(TriggerCondition::GreaterThan.is_met(5, 4));
        assert!(!TriggerCondition::GreaterThan.is_met(4, 4));
        assert!(TriggerCondition::LessThan.is_met(3, 4));
        assert!(TriggerCondition::EqualTo.is_met(4, 4));
        assert!(TriggerCondition::NotEqualTo.is_met(5, 4));
        assert!(!TriggerCondition::NotEqualTo.is_met(4, 4));
    }

    #[test]
    fn test_alert_new_defaults() {
        let alert = Alert::new("High error rate", "search severity<=3");

        assert!(!alert.id.is_empty());
        assert_eq!(alert.trigger_type, TriggerType::NumberOfResults);
        assert_eq!(alert.trigger_condition, TriggerCondition::GreaterThan);
        assert_eq!(alert.cron_expression, "0 * * * *");
        assert!(alert.enabled);
        assert!(!alert.throttle_enabled);
    }

    #[test]
    fn test_alert_builders() {
        let alert = Alert::new("a", "search *")
            .with_trigger(TriggerCondition::EqualTo, 0)
            .with_schedule("*/10 * * * *", "-10m")
            .with_action(ActionKind::Email, "ops@example.com", "{{alert_name}} fired")
            .with_throttle(300)
            .with_severity(Severity::Critical)
            .with_enabled(false);

        assert_eq!(alert.trigger_threshold, 0);
        assert_eq!(alert.cron_expression, "*/10 * * * *");
        assert_eq!(alert.actions.len(), 1);
        assert_eq!(alert.throttle_window_seconds, 300);
        assert_eq!(alert.severity, Severity::Critical);
        assert!(!alert.enabled);
    }

    #[test]
    fn test_alert_validation_empty_name() {
        let alert = Alert::new("", "search *");
        assert!(matches!(
            alert.validate_alert(),
            Err(AlertValidationError::EmptyName)
        ));
    }

    #[test]
    fn test_alert_validation_missing_cron() {
        let mut alert = Alert::new("a", "search *");
        alert.cron_expression = String::new();
        assert!(matches!(
            alert.validate_alert(),
            Err(AlertValidationError::MissingCronExpression)
        ));
    }

    #[test]
    fn test_alert_validation_throttle_window() {
        let mut alert = Alert::new("a", "search *");
        alert.throttle_enabled = true;
        alert.throttle_window_seconds = 0;
        assert!(matches!(
            alert.validate_alert(),
            Err(AlertValidationError::InvalidThrottleWindow)
        ));
    }

    #[test]
    fn test_history_entry_new() {
        let entry = AlertHistoryEntry::new("alert-1", true, 42);

        assert_eq!(entry.alert_id, "alert-1");
        assert!(entry.triggered);
        assert_eq!(entry.result_count, 42);
        assert!(entry.actions_executed.is_none());
        assert!(!entry.is_acknowledged());
    }

    #[test]
    fn test_alert_serialization_round_trip() {
        let alert = Alert::new("High error rate", "search severity<=3 | stats count by host")
            .with_action(ActionKind::Webhook, "https://hooks.example.com/x", "{{result_count}}");

        let json = serde_json::to_string(&alert).unwrap();
        let back: Alert = serde_json::from_str(&json).unwrap();

        assert_eq!(back.name, alert.name);
        assert_eq!(back.search_query, alert.search_query);
        assert_eq!(back.actions, alert.actions);
    }

    #[test]
    fn test_trigger_type_serialization() {
        assert_eq!(
            serde_json::to_string(&TriggerType::NumberOfResults).unwrap(),
            "\"number_of_results\""
        );
        assert_eq!(
            serde_json::to_string(&TriggerCondition::GreaterThan).unwrap(),
            "\"greater_than\""
        );
    }
}
