//! Log event data model.
//!
//! Defines the `LogEvent` structure that both storage backends index, and the
//! syslog-style `Severity` scale used by the query language.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Syslog severity scale. Lower codes are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// System is unusable (0).
    Emergency,
    /// Action must be taken immediately (1).
    Alert,
    /// Critical conditions (2).
    Critical,
    /// Error conditions (3).
    Error,
    /// Warning conditions (4).
    Warning,
    /// Normal but significant condition (5).
    Notice,
    /// Informational messages (6).
    Info,
    /// Debug-level messages (7).
    Debug,
}

impl Severity {
    /// Returns the numeric syslog code (0-7).
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Emergency => 0,
            Self::Alert => 1,
            Self::Critical => 2,
            Self::Error => 3,
            Self::Warning => 4,
            Self::Notice => 5,
            Self::Info => 6,
            Self::Debug => 7,
        }
    }

    /// Returns the severity for a numeric syslog code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Emergency),
            1 => Some(Self::Alert),
            2 => Some(Self::Critical),
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            5 => Some(Self::Notice),
            6 => Some(Self::Info),
            7 => Some(Self::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emergency => write!(f, "emergency"),
            Self::Alert => write!(f, "alert"),
            Self::Critical => write!(f, "critical"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Notice => write!(f, "notice"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

/// A single indexed log event.
///
/// This is the unit of ingestion for both backends; the query language's base
/// schema (`timestamp`, `severity`, `host`, `source`, `message`, `raw`) maps
/// one-to-one onto these fields.
///
/// # Example
///
/// ```
/// use engine::models::{LogEvent, Severity};
///
/// let event = LogEvent::new(Severity::Error, "disk full", "web-01")
///     .with_source("kernel");
///
/// assert!(event.validate_event().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Timestamp when the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Severity of the event.
    #[serde(default)]
    pub severity: Severity,

    /// Host that emitted the event.
    pub host: String,

    /// Source of the event (program, facility, file).
    #[serde(default)]
    pub source: String,

    /// The extracted message content.
    pub message: String,

    /// The original, unparsed event line.
    #[serde(default)]
    pub raw: String,
}

/// Errors that can occur during log event validation.
#[derive(Debug, Error)]
pub enum EventValidationError {
    /// The message is empty.
    #[error("Event message cannot be empty")]
    EmptyMessage,

    /// The host name is empty.
    #[error("Event host cannot be empty")]
    EmptyHost,
}

impl LogEvent {
    /// Creates a new log event with the current timestamp.
    ///
    /// The `raw` field defaults to the message text; use [`LogEvent::with_raw`]
    /// when the original line differs from the extracted message.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>, host: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            timestamp: Utc::now(),
            severity,
            host: host.into(),
            source: String::new(),
            raw: message.clone(),
            message,
        }
    }

    /// Sets the event timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the event source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the original, unparsed event line.
    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    /// Validates the event.
    ///
    /// # Errors
    ///
    /// Returns an error if the message or host is empty.
    pub fn validate_event(&self) -> Result<(), EventValidationError> {
        if self.message.is_empty() {
            return Err(EventValidationError::EmptyMessage);
        }
        if self.host.is_empty() {
            return Err(EventValidationError::EmptyHost);
        }
        Ok(())
    }
}
