//! Abstract syntax tree for the pipe-chained search language.
//!
//! A parsed query is a [`Pipeline`] of [`Stage`]s. Every node implements
//! `Display`, and re-parsing a pipeline's rendered form yields a structurally
//! equal pipeline.

use serde::{Deserialize, Serialize};

/// Comparison operators usable in a search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    NotEq,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    LtEq,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    GtEq,
    /// Fuzzy / wildcard match (~)
    Fuzzy,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::Fuzzy => write!(f, "~"),
        }
    }
}

/// A literal value on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// String literal (quoted or bare word).
    String(String),
    /// Backtick-delimited pattern literal.
    Pattern(String),
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Float(f64),
}

impl std::fmt::Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Self::Pattern(p) => write!(f, "`{p}`"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl:?}"),
        }
    }
}

/// A single comparison (e.g. `severity<=3`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// The field name on the left-hand side.
    pub field: String,
    /// The comparison operator.
    pub op: CompareOp,
    /// The literal on the right-hand side.
    pub value: FilterValue,
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

/// A boolean filter expression over comparisons.
///
/// Precedence: NOT binds tighter than AND, which binds tighter than OR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Matches every event (`*`).
    MatchAll,
    /// A single comparison.
    Compare(Comparison),
    /// Logical negation.
    Not(Box<FilterExpr>),
    /// Logical conjunction.
    And(Box<FilterExpr>, Box<FilterExpr>),
    /// Logical disjunction.
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 1,
            Self::And(..) => 2,
            Self::Not(_) => 3,
            Self::MatchAll | Self::Compare(_) => 4,
        }
    }

    fn fmt_child(
        f: &mut std::fmt::Formatter<'_>,
        child: &Self,
        parent_precedence: u8,
    ) -> std::fmt::Result {
        if child.precedence() < parent_precedence {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl std::fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MatchAll => write!(f, "*"),
            Self::Compare(c) => write!(f, "{c}"),
            Self::Not(inner) => {
                write!(f, "NOT ")?;
                Self::fmt_child(f, inner, self.precedence())
            }
            Self::And(left, right) => {
                Self::fmt_child(f, left, self.precedence())?;
                write!(f, " AND ")?;
                Self::fmt_child(f, right, self.precedence())
            }
            Self::Or(left, right) => {
                Self::fmt_child(f, left, self.precedence())?;
                write!(f, " OR ")?;
                Self::fmt_child(f, right, self.precedence())
            }
        }
    }
}

/// Aggregate functions supported by `stats` and `timechart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    /// Row count.
    Count,
    /// Arithmetic mean.
    Avg,
    /// Sum.
    Sum,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

impl std::fmt::Display for AggFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Avg => write!(f, "avg"),
            Self::Sum => write!(f, "sum"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

/// One aggregation in a `stats` or `timechart` stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    /// The aggregate function.
    pub func: AggFunc,
    /// The aggregated field; `None` for a bare `count`.
    pub field: Option<String>,
}

impl Aggregation {
    /// Returns the output column name this aggregation declares
    /// (`count`, `avg(severity)`, ...).
    #[must_use]
    pub fn output_name(&self) -> String {
        match &self.field {
            None => self.func.to_string(),
            Some(field) => format!("{}({field})", self.func),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            None => write!(f, "{}", self.func),
            Some(field) => write!(f, "{}({field})", self.func),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Stage {
    /// Filter events (`search <filter>`).
    Search {
        /// The boolean filter.
        filter: FilterExpr,
    },
    /// Aggregate into groups (`stats <agg>... by <field>,...`).
    Stats {
        /// Aggregations to compute per group.
        aggregations: Vec<Aggregation>,
        /// Group-by fields; empty for a single overall group.
        by: Vec<String>,
    },
    /// Aggregate into time buckets (`timechart span=<duration> <agg>`).
    Timechart {
        /// Bucket width in seconds.
        span_seconds: u64,
        /// Aggregation to compute per bucket.
        aggregation: Aggregation,
    },
    /// Project an ordered field list (`table <field>,...`).
    Table {
        /// The projected fields, in output order.
        fields: Vec<String>,
    },
    /// Order rows (`sort <asc|desc> <field>`).
    Sort {
        /// Sort direction.
        direction: SortDirection,
        /// Field to sort by.
        field: String,
    },
    /// Cap the number of rows (`limit <n>`).
    Limit {
        /// Maximum number of rows.
        count: u64,
    },
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search { filter } => write!(f, "search {filter}"),
            Self::Stats { aggregations, by } => {
                write!(f, "stats ")?;
                for (i, agg) in aggregations.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{agg}")?;
                }
                if !by.is_empty() {
                    write!(f, " by {}", by.join(", "))?;
                }
                Ok(())
            }
            Self::Timechart {
                span_seconds,
                aggregation,
            } => {
                write!(
                    f,
                    "timechart span={} {aggregation}",
                    crate::query::time::format_duration(*span_seconds)
                )
            }
            Self::Table { fields } => write!(f, "table {}", fields.join(", ")),
            Self::Sort { direction, field } => write!(f, "sort {direction} {field}"),
            Self::Limit { count } => write!(f, "limit {count}"),
        }
    }
}

/// An ordered sequence of parsed stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// The stages, left to right.
    pub stages: Vec<Stage>,
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}
