//! Lookout Engine
//!
//! This crate contains the core of the Lookout log alerting platform: the
//! pipe-chained search language, its compilation to two SQL backends, and
//! the alert/report evaluation and scheduling subsystem built on top.
//!
//! # Modules
//!
//! - [`models`] - Data models for log events, alerts, and catalog records
//! - [`query`] - Search language parsing and plan building
//! - [`render`] - Backend-specific SQL generation
//! - [`exec`] - Execution gateway and backends
//! - [`alert`] - Alert evaluation, actions, and the service facade
//! - [`report`] - Scheduled report and synthetic probe runners
//! - [`schedule`] - Cron scheduling of alerts, reports, and probes
//! - [`template`] - Variable substitution for action payloads
//! - [`storage`] - Persistence contracts and the in-memory store
//! - [`config`] - Environment-based engine configuration
//!
//! # Example
//!
//! ```
//! use engine::query::compile;
//!
//! let plan = compile(
//!     "search severity<=3 | stats count by message | sort desc count | limit 25",
//!     "-24h",
//!     None,
//! )
//! .unwrap();
//!
//! assert_eq!(plan.output_fields, vec!["message", "count"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod alert;
pub mod config;
pub mod exec;
pub mod models;
pub mod query;
pub mod render;
pub mod report;
pub mod schedule;
pub mod storage;
pub mod template;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
