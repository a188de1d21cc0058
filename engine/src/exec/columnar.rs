//! Columnar execution backend: ClickHouse.
//!
//! Queries are fetched in `JSONEachRow` format so result shapes can vary per
//! plan without per-query row types. 64-bit integers arrive quoted in that
//! format; the gateway's normalization pass restores them to numbers.

use super::{ExecError, Row};
use crate::config::DatabaseConfig;
use crate::models::LogEvent;
use crate::render::{Param, RenderedStatement};
use clickhouse::Client;
use std::sync::Arc;

/// DDL for the events table. Applied by [`ColumnarBackend::ensure_schema`];
/// production deployments typically manage this out of band.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    timestamp DateTime64(3),
    severity UInt8,
    host String,
    source String,
    message String,
    raw String
)
ENGINE = MergeTree
ORDER BY (timestamp)
";

#[derive(clickhouse::Row, serde::Serialize)]
struct EventRow {
    timestamp: i64,
    severity: u8,
    host: String,
    source: String,
    message: String,
    raw: String,
}

/// ClickHouse-backed log store and query executor.
#[derive(Clone)]
pub struct ColumnarBackend {
    client: Arc<Client>,
}

impl ColumnarBackend {
    /// Creates a backend over an existing client.
    #[must_use]
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Creates a backend from connection configuration.
    #[must_use]
    pub fn connect(config: &DatabaseConfig) -> Self {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(&config.password);

        Self {
            client: Arc::new(client),
        }
    }

    /// Tests connectivity with a trivial query.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the database cannot be reached.
    pub async fn ping(&self) -> Result<(), ExecError> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .map(|_| ())
            .map_err(map_clickhouse_error)
    }

    /// Creates the events table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), ExecError> {
        self.client
            .query(SCHEMA)
            .execute()
            .await
            .map_err(map_clickhouse_error)
    }

    /// Appends a batch of events.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the insert fails.
    pub async fn insert_batch(&self, events: Vec<LogEvent>) -> Result<(), ExecError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut insert = self
            .client
            .insert::<EventRow>("logs")
            .await
            .map_err(map_clickhouse_error)?;

        for event in events {
            let row = EventRow {
                timestamp: event.timestamp.timestamp_millis(),
                severity: event.severity.code(),
                host: event.host,
                source: event.source,
                message: event.message,
                raw: event.raw,
            };
            insert.write(&row).await.map_err(map_clickhouse_error)?;
        }

        insert.end().await.map_err(map_clickhouse_error)
    }

    /// Runs one rendered statement and returns its rows.
    pub(crate) async fn execute_statement(
        &self,
        statement: &RenderedStatement,
    ) -> Result<Vec<Row>, ExecError> {
        let mut query = self.client.query(&statement.sql);
        for param in &statement.params {
            query = match param {
                Param::String(s) => query.bind(s.as_str()),
                Param::Integer(i) => query.bind(*i),
                Param::Float(f) => query.bind(*f),
            };
        }

        let mut cursor = query
            .fetch_bytes("JSONEachRow")
            .map_err(map_clickhouse_error)?;
        let mut buffer = Vec::new();
        while let Some(chunk) = cursor.next().await.map_err(map_clickhouse_error)? {
            buffer.extend_from_slice(&chunk);
        }

        let mut rows = Vec::new();
        for line in buffer.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let row: Row = serde_json::from_slice(line).map_err(|e| {
                ExecError::SyntaxTranslationBug(format!("malformed JSONEachRow line: {e}"))
            })?;
            rows.push(row);
        }
        Ok(rows)
    }
}

fn map_clickhouse_error(error: clickhouse::error::Error) -> ExecError {
    use clickhouse::error::Error;

    match &error {
        Error::TimedOut => ExecError::Timeout(error.to_string()),
        Error::Network(_) => ExecError::ConnectionFailure(error.to_string()),
        Error::BadResponse(text) => classify_server_error(text, &error),
        _ => ExecError::ConnectionFailure(error.to_string()),
    }
}

fn classify_server_error(text: &str, error: &clickhouse::error::Error) -> ExecError {
    if text.contains("MEMORY_LIMIT_EXCEEDED")
        || text.contains("TOO_MANY_SIMULTANEOUS_QUERIES")
        || text.contains("QUOTA_EXCEEDED")
    {
        ExecError::ResourceLimit(error.to_string())
    } else {
        ExecError::SyntaxTranslationBug(error.to_string())
    }
}
