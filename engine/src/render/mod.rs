//! Backend renderers: query plan to backend-native SQL.
//!
//! Two independent code generators translate a [`QueryPlan`] into SQL for the
//! columnar store (ClickHouse) and the embedded store (SQLite + FTS5). Both
//! must produce the same logical result rows for the same plan.
//!
//! User literals are never interpolated into SQL text; every statement
//! carries its values as bound [`Param`]s. The only interpolated pieces are
//! field names validated against the closed base schema and integer spans
//! and limits that the plan builder has already checked.
//!
//! [`QueryPlan`]: crate::query::QueryPlan

pub mod columnar;
pub mod embedded;

use serde::{Deserialize, Serialize};

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Param {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating point value.
    Float(f64),
}

/// One SQL statement with its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedStatement {
    /// The SQL text with `?` placeholders.
    pub sql: String,
    /// Bound values, one per placeholder.
    pub params: Vec<Param>,
}

/// The rendered form of a plan for one backend.
///
/// When the plan carries a compare offset, `comparison` holds the same query
/// over the shifted window; the gateway tags rows from each statement so
/// callers can tell current from comparison data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeQuery {
    /// The statement over the plan's own window.
    pub current: RenderedStatement,
    /// The statement over the offset window, when requested.
    pub comparison: Option<RenderedStatement>,
}
