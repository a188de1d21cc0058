//! The pipe-chained search language for Lookout.
//!
//! This module provides the parser and plan builder for queries that filter,
//! aggregate, and shape log events.
//!
//! # Supported Syntax
//!
//! ```text
//! search severity<=3
//! search host="web-01" AND message~timeout | stats count by host
//! search severity<=3 | stats count by message | sort desc count | limit 25
//! search * | timechart span=5m avg(severity)
//! ```
//!
//! # Example
//!
//! ```
//! use engine::query::compile;
//!
//! let plan = compile("search severity<=3 | limit 10", "-1h", None).unwrap();
//! assert_eq!(plan.output_fields.len(), 6);
//! ```

mod ast;
mod parser;
mod plan;
pub mod time;

pub use ast::{
    AggFunc, Aggregation, CompareOp, Comparison, FilterExpr, FilterValue, Pipeline, SortDirection,
    Stage,
};
pub use parser::{parse, ParseError, ParseErrorKind};
pub use plan::{PlanError, QueryPlan, BASE_FIELDS};
pub use time::TimeRange;

use thiserror::Error;

/// A failure while compiling query text into a plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// The query text is malformed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The query parsed but violates a structural invariant.
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Compiles query text and a window expression into a validated plan.
///
/// # Errors
///
/// Returns [`QueryError::Parse`] for malformed text and [`QueryError::Plan`]
/// for structurally invalid pipelines or unresolvable windows.
pub fn compile(
    text: &str,
    range_expr: &str,
    compare_offset: Option<&str>,
) -> Result<QueryPlan, QueryError> {
    let pipeline = parse(text)?;
    Ok(QueryPlan::build(pipeline, range_expr, compare_offset)?)
}
