//! Embedded execution backend: SQLite with an FTS5 message index.
//!
//! Suited to small single-node deployments. The schema is created on open;
//! events append into `logs` and triggers keep the `logs_fts` index in sync.

use super::{ExecError, Row};
use crate::models::LogEvent;
use crate::render::{Param, RenderedStatement};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    severity INTEGER NOT NULL,
    host TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT '',
    message TEXT NOT NULL,
    raw TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_severity ON logs (severity);
CREATE VIRTUAL TABLE IF NOT EXISTS logs_fts USING fts5(
    message, raw, content='logs', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS logs_fts_insert AFTER INSERT ON logs BEGIN
    INSERT INTO logs_fts (rowid, message, raw) VALUES (new.id, new.message, new.raw);
END;
CREATE TRIGGER IF NOT EXISTS logs_fts_delete AFTER DELETE ON logs BEGIN
    INSERT INTO logs_fts (logs_fts, rowid, message, raw)
    VALUES ('delete', old.id, old.message, old.raw);
END;
";

/// SQLite-backed log store and query executor.
pub struct EmbeddedBackend {
    conn: Arc<Mutex<Connection>>,
}

impl EmbeddedBackend {
    /// Opens (or creates) the database at `path` and ensures the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::ConnectionFailure`] if the database cannot be
    /// opened or the schema cannot be created.
    pub fn open(path: &str) -> Result<Self, ExecError> {
        let conn = Connection::open(path)
            .map_err(|e| ExecError::ConnectionFailure(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database, for tests and ephemeral use.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::ConnectionFailure`] if the schema cannot be
    /// created.
    pub fn open_in_memory() -> Result<Self, ExecError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ExecError::ConnectionFailure(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, ExecError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| ExecError::ConnectionFailure(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Appends a batch of events in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the write fails; the transaction is rolled
    /// back as a whole.
    pub async fn insert_batch(&self, events: &[LogEvent]) -> Result<(), ExecError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(map_sqlite_error)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO logs (timestamp, severity, host, source, message, raw) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(map_sqlite_error)?;
            for event in events {
                stmt.execute(rusqlite::params![
                    event.timestamp.timestamp_millis(),
                    event.severity.code(),
                    event.host,
                    event.source,
                    event.message,
                    event.raw,
                ])
                .map_err(map_sqlite_error)?;
            }
        }
        tx.commit().map_err(map_sqlite_error)
    }

    /// Returns the number of stored events.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the count query fails.
    pub async fn count(&self) -> Result<u64, ExecError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| {
            row.get::<_, i64>(0).map(|n| n as u64)
        })
        .map_err(map_sqlite_error)
    }

    /// Runs one rendered statement and returns its rows.
    pub(crate) async fn execute_statement(
        &self,
        statement: &RenderedStatement,
    ) -> Result<Vec<Row>, ExecError> {
        let conn = self.conn.lock().await;
        let mut prepared = conn.prepare(&statement.sql).map_err(map_sqlite_error)?;
        let column_names: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect();

        let params = rusqlite::params_from_iter(statement.params.iter().map(to_sql_value));
        let mut rows = prepared.query(params).map_err(map_sqlite_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_error)? {
            let mut mapped = Row::with_capacity(column_names.len());
            for (index, name) in column_names.iter().enumerate() {
                let value = row.get_ref(index).map_err(map_sqlite_error)?;
                mapped.insert(name.clone(), to_json(value));
            }
            out.push(mapped);
        }
        Ok(out)
    }
}

fn to_sql_value(param: &Param) -> rusqlite::types::Value {
    match param {
        Param::String(s) => rusqlite::types::Value::Text(s.clone()),
        Param::Integer(i) => rusqlite::types::Value::Integer(*i),
        Param::Float(f) => rusqlite::types::Value::Real(*f),
    }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::json!(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        ValueRef::Text(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Blob(_) => serde_json::Value::Null,
    }
}

fn map_sqlite_error(error: rusqlite::Error) -> ExecError {
    match &error {
        rusqlite::Error::SqliteFailure(ffi_error, _) => match ffi_error.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                ExecError::ResourceLimit(error.to_string())
            }
            rusqlite::ErrorCode::CannotOpen
            | rusqlite::ErrorCode::NotADatabase
            | rusqlite::ErrorCode::PermissionDenied => {
                ExecError::ConnectionFailure(error.to_string())
            }
            _ => ExecError::SyntaxTranslationBug(error.to_string()),
        },
        _ => ExecError::SyntaxTranslationBug(error.to_string()),
    }
}
