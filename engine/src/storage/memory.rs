//! In-memory alert store.
//!
//! Suitable for development, testing, and single-node deployments. Data is
//! not persisted across restarts.

use super::{AlertStore, StoreError};
use crate::models::{Alert, AlertHistoryEntry, ReportTemplate, SavedSearchTemplate, SyntheticProbe};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory implementation of [`AlertStore`].
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: RwLock<HashMap<String, Alert>>,
    history: RwLock<Vec<AlertHistoryEntry>>,
    report_templates: RwLock<Vec<ReportTemplate>>,
    saved_searches: RwLock<Vec<SavedSearchTemplate>>,
    probes: RwLock<Vec<SyntheticProbe>>,
}

impl InMemoryAlertStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store wrapped in an `Arc`.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Replaces the report template catalog. Catalog seeding is the
    /// surrounding product's concern; this is its entry point.
    pub fn seed_report_templates(&self, templates: Vec<ReportTemplate>) {
        if let Ok(mut guard) = self.report_templates.write() {
            *guard = templates;
        }
    }

    /// Replaces the saved search catalog.
    pub fn seed_saved_searches(&self, searches: Vec<SavedSearchTemplate>) {
        if let Ok(mut guard) = self.saved_searches.write() {
            *guard = searches;
        }
    }

    /// Replaces the synthetic probe catalog.
    pub fn seed_probes(&self, probes: Vec<SyntheticProbe>) {
        if let Ok(mut guard) = self.probes.write() {
            *guard = probes;
        }
    }
}

impl AlertStore for InMemoryAlertStore {
    fn create_alert(&self, alert: Alert) -> Result<(), StoreError> {
        let mut alerts = self.alerts.write().map_err(|_| StoreError::LockError)?;
        if alerts.contains_key(&alert.id) {
            return Err(StoreError::Conflict(format!(
                "Alert '{}' already exists",
                alert.id
            )));
        }
        alerts.insert(alert.id.clone(), alert);
        Ok(())
    }

    fn update_alert(&self, alert: Alert) -> Result<(), StoreError> {
        let mut alerts = self.alerts.write().map_err(|_| StoreError::LockError)?;
        if !alerts.contains_key(&alert.id) {
            return Err(StoreError::NotFound(alert.id));
        }
        alerts.insert(alert.id.clone(), alert);
        Ok(())
    }

    fn delete_alert(&self, id: &str) -> Result<(), StoreError> {
        let mut alerts = self.alerts.write().map_err(|_| StoreError::LockError)?;
        alerts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_alert(&self, id: &str) -> Result<Option<Alert>, StoreError> {
        let alerts = self.alerts.read().map_err(|_| StoreError::LockError)?;
        Ok(alerts.get(id).cloned())
    }

    fn list_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.alerts.read().map_err(|_| StoreError::LockError)?;
        let mut list: Vec<Alert> = alerts.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    fn append_history(&self, entry: AlertHistoryEntry) -> Result<(), StoreError> {
        let mut history = self.history.write().map_err(|_| StoreError::LockError)?;
        history.push(entry);
        Ok(())
    }

    fn get_history(
        &self,
        alert_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlertHistoryEntry>, StoreError> {
        let history = self.history.read().map_err(|_| StoreError::LockError)?;
        let mut entries: Vec<AlertHistoryEntry> = history
            .iter()
            .filter(|entry| alert_id.is_none_or(|id| entry.alert_id == id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    fn acknowledge_history(
        &self,
        entry_id: &str,
        by: &str,
        notes: Option<&str>,
    ) -> Result<AlertHistoryEntry, StoreError> {
        let mut history = self.history.write().map_err(|_| StoreError::LockError)?;
        let entry = history
            .iter_mut()
            .find(|entry| entry.id == entry_id)
            .ok_or_else(|| StoreError::NotFound(entry_id.to_string()))?;

        if entry.is_acknowledged() {
            return Err(StoreError::Conflict(format!(
                "History entry '{entry_id}' is already acknowledged"
            )));
        }

        entry.acknowledged_by = Some(by.to_string());
        entry.acknowledged_at = Some(Utc::now());
        entry.acknowledgement_notes = notes.map(ToString::to_string);
        Ok(entry.clone())
    }

    fn last_action_firing(&self, alert_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let history = self.history.read().map_err(|_| StoreError::LockError)?;
        Ok(history
            .iter()
            .filter(|entry| {
                entry.alert_id == alert_id && entry.triggered && entry.actions_executed.is_some()
            })
            .map(|entry| entry.timestamp)
            .max())
    }

    fn list_report_templates(&self) -> Result<Vec<ReportTemplate>, StoreError> {
        let templates = self
            .report_templates
            .read()
            .map_err(|_| StoreError::LockError)?;
        Ok(templates.clone())
    }

    fn get_report_template(&self, id: &str) -> Result<Option<ReportTemplate>, StoreError> {
        let templates = self
            .report_templates
            .read()
            .map_err(|_| StoreError::LockError)?;
        Ok(templates.iter().find(|t| t.id == id).cloned())
    }

    fn list_saved_searches(&self) -> Result<Vec<SavedSearchTemplate>, StoreError> {
        let searches = self
            .saved_searches
            .read()
            .map_err(|_| StoreError::LockError)?;
        Ok(searches.clone())
    }

    fn list_probes(&self) -> Result<Vec<SyntheticProbe>, StoreError> {
        let probes = self.probes.read().map_err(|_| StoreError::LockError)?;
        Ok(probes.clone())
    }

    fn get_probe(&self, id: &str) -> Result<Option<SyntheticProbe>, StoreError> {
        let probes = self.probes.read().map_err(|_| StoreError::LockError)?;
        Ok(probes.iter().find(|p| p.id == id).cloned())
    }
}
