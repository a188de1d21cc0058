//! Engine configuration.
//!
//! Handles loading configuration from environment variables with sensible
//! defaults. The backend choice is made once here and fixed for the life of
//! the process.

use anyhow::{bail, Result};

/// Which execution backend the process runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The columnar analytics store (ClickHouse).
    Columnar,
    /// The embedded relational store (SQLite + FTS5).
    Embedded,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "columnar" | "clickhouse" => Ok(Self::Columnar),
            "embedded" | "sqlite" => Ok(Self::Embedded),
            other => bail!("Unknown backend '{other}'. Expected 'columnar' or 'embedded'"),
        }
    }
}

/// Columnar database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// ClickHouse HTTP URL (e.g. <http://localhost:8123>).
    pub url: String,
    /// Database name.
    pub database: String,
    /// Username for authentication.
    pub user: String,
    /// Password for authentication.
    pub password: String,
}

impl DatabaseConfig {
    /// Loads connection settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LOOKOUT_DB_URL`: database URL (default: <http://localhost:8123>)
    /// - `LOOKOUT_DB_NAME`: database name (default: "lookout")
    /// - `LOOKOUT_DB_USER`: database user (default: "lookout")
    /// - `LOOKOUT_DB_PASSWORD`: database password (default: "`lookout_dev`")
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("LOOKOUT_DB_URL")
                .unwrap_or_else(|_| "http://localhost:8123".to_string()),
            database: std::env::var("LOOKOUT_DB_NAME").unwrap_or_else(|_| "lookout".to_string()),
            user: std::env::var("LOOKOUT_DB_USER").unwrap_or_else(|_| "lookout".to_string()),
            password: std::env::var("LOOKOUT_DB_PASSWORD")
                .unwrap_or_else(|_| "lookout_dev".to_string()),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "lookout".to_string(),
            user: "lookout".to_string(),
            password: "lookout_dev".to_string(),
        }
    }
}

/// Engine configuration.
///
/// Configuration values can be set via environment variables:
/// - `LOOKOUT_BACKEND`: `columnar` or `embedded` (default: "embedded")
/// - `LOOKOUT_DATA_PATH`: SQLite path for the embedded backend
///   (default: "lookout.db")
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The active backend kind.
    pub backend: BackendKind,
    /// Columnar connection settings, used when `backend` is columnar.
    pub database: DatabaseConfig,
    /// Embedded database path, used when `backend` is embedded.
    pub data_path: String,
}

impl EngineConfig {
    /// Creates a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `LOOKOUT_BACKEND` is set to an unknown value.
    pub fn from_env() -> Result<Self> {
        let backend = match std::env::var("LOOKOUT_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => BackendKind::Embedded,
        };

        Ok(Self {
            backend,
            database: DatabaseConfig::from_env(),
            data_path: std::env::var("LOOKOUT_DATA_PATH")
                .unwrap_or_else(|_| "lookout.db".to_string()),
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Embedded,
            database: DatabaseConfig::default(),
            data_path: "lookout.db".to_string(),
        }
    }
}
