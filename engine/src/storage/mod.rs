//! Persistence contracts for alerts, history, and catalog records.
//!
//! The engine does not own a durable store; it requires this contract from
//! the surrounding product and ships an in-memory implementation for
//! development, testing, and single-node use.

mod memory;

pub use memory::InMemoryAlertStore;

use crate::models::{Alert, AlertHistoryEntry, ReportTemplate, SavedSearchTemplate, SyntheticProbe};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to acquire a lock on the store.
    #[error("Failed to acquire lock on alert store")]
    LockError,

    /// The referenced record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The operation conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Generic storage error.
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Storage contract required by the alert, report, and scheduling subsystems.
///
/// Implementations must be thread-safe (`Send + Sync`). History writes are
/// append-only; an entry is only ever mutated by its one-time
/// acknowledgement.
pub trait AlertStore: Send + Sync {
    /// Inserts a new alert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if an alert with the same id exists.
    fn create_alert(&self, alert: Alert) -> Result<(), StoreError>;

    /// Replaces an existing alert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no alert with that id exists.
    fn update_alert(&self, alert: Alert) -> Result<(), StoreError>;

    /// Deletes an alert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no alert with that id exists.
    fn delete_alert(&self, id: &str) -> Result<(), StoreError>;

    /// Fetches an alert by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_alert(&self, id: &str) -> Result<Option<Alert>, StoreError>;

    /// Lists all alerts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_alerts(&self) -> Result<Vec<Alert>, StoreError>;

    /// Appends one evaluation history entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append_history(&self, entry: AlertHistoryEntry) -> Result<(), StoreError>;

    /// Returns history entries, newest first, optionally filtered by alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_history(
        &self,
        alert_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertHistoryEntry>, StoreError>;

    /// Acknowledges a history entry, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown entry and
    /// [`StoreError::Conflict`] if it was already acknowledged.
    fn acknowledge_history(
        &self,
        entry_id: &str,
        by: &str,
        notes: Option<&str>,
    ) -> Result<AlertHistoryEntry, StoreError>;

    /// Returns the timestamp of the most recent action-executing firing of
    /// the alert, used for throttle decisions.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn last_action_firing(&self, alert_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Lists the report template catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_report_templates(&self) -> Result<Vec<ReportTemplate>, StoreError>;

    /// Fetches a report template by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_report_template(&self, id: &str) -> Result<Option<ReportTemplate>, StoreError>;

    /// Lists the saved search catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_saved_searches(&self) -> Result<Vec<SavedSearchTemplate>, StoreError>;

    /// Lists the synthetic probe catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_probes(&self) -> Result<Vec<SyntheticProbe>, StoreError>;

    /// Fetches a synthetic probe by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_probe(&self, id: &str) -> Result<Option<SyntheticProbe>, StoreError>;
}
