//! Query plan construction and validation.
//!
//! A [`QueryPlan`] is the validated, backend-agnostic form of a parsed
//! pipeline: stages in order, a resolved time window, and the output field
//! list produced by the final stage. Plans are built once per query text +
//! window and never mutated.

use super::ast::{CompareOp, Comparison, FilterExpr, FilterValue, Pipeline, Stage};
use super::time::{self, TimeRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The base schema every pipeline starts from, in output order.
pub const BASE_FIELDS: [&str; 6] = ["timestamp", "severity", "host", "source", "message", "raw"];

/// Fields holding free text, eligible for `~` matching.
const TEXT_FIELDS: [&str; 4] = ["host", "source", "message", "raw"];

/// Errors produced while building a plan from a syntactically valid pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// More than one aggregating stage (`stats`, `timechart`) in the pipeline.
    #[error("Pipeline may contain at most one aggregating stage")]
    ConflictingAggregation,

    /// A referenced field does not exist in the schema at that stage.
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// A limit of zero, or a limit stage that is not last.
    #[error("Limit must be a positive count on the final stage")]
    InvalidLimit,

    /// The time range or compare offset expression could not be resolved.
    #[error("Invalid time range '{0}'")]
    InvalidTimeRange(String),

    /// A comparison whose value does not fit the field's type.
    #[error("Invalid comparison on '{field}': {reason}")]
    InvalidComparison {
        /// The field being compared.
        field: String,
        /// Why the comparison is invalid.
        reason: String,
    },
}

/// A validated, executable query plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// The validated stages, always starting with exactly one search stage.
    pub stages: Vec<Stage>,
    /// The resolved evaluation window.
    pub time_range: TimeRange,
    /// Field names of the final output schema, in order.
    pub output_fields: Vec<String>,
    /// Optional period-over-period comparison offset, in seconds.
    pub compare_offset_seconds: Option<u64>,
}

impl QueryPlan {
    /// Builds a plan from a parsed pipeline, resolving the window against the
    /// current time.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] when a structural invariant is violated or the
    /// window expression cannot be resolved.
    pub fn build(
        pipeline: Pipeline,
        range_expr: &str,
        compare_offset: Option<&str>,
    ) -> Result<Self, PlanError> {
        Self::build_at(pipeline, range_expr, compare_offset, Utc::now())
    }

    /// Builds a plan with an explicit `now`, for deterministic callers.
    ///
    /// # Errors
    ///
    /// See [`QueryPlan::build`].
    pub fn build_at(
        pipeline: Pipeline,
        range_expr: &str,
        compare_offset: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, PlanError> {
        let time_range = time::resolve_time_range(range_expr, now)
            .ok_or_else(|| PlanError::InvalidTimeRange(range_expr.to_string()))?;

        let compare_offset_seconds = compare_offset
            .map(|expr| {
                time::parse_duration(expr)
                    .ok_or_else(|| PlanError::InvalidTimeRange(expr.to_string()))
            })
            .transpose()?;

        let mut stages = pipeline.stages;
        if !matches!(stages.first(), Some(Stage::Search { .. })) {
            stages.insert(
                0,
                Stage::Search {
                    filter: FilterExpr::MatchAll,
                },
            );
        }

        let output_fields = validate_stages(&stages)?;

        Ok(Self {
            stages,
            time_range,
            output_fields,
            compare_offset_seconds,
        })
    }

    /// Returns the aggregating stage, if the pipeline has one.
    #[must_use]
    pub fn aggregation(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| matches!(s, Stage::Stats { .. } | Stage::Timechart { .. }))
    }
}

/// Walks the stages left to right, checking each against the schema flowing
/// out of the previous stage, and returns the final output field list.
fn validate_stages(stages: &[Stage]) -> Result<Vec<String>, PlanError> {
    let mut schema: Vec<String> = BASE_FIELDS.iter().map(ToString::to_string).collect();
    let mut saw_aggregation = false;
    let last_index = stages.len() - 1;

    for (index, stage) in stages.iter().enumerate() {
        match stage {
            Stage::Search { filter } => {
                validate_filter(filter)?;
            }
            Stage::Stats { aggregations, by } => {
                if saw_aggregation {
                    return Err(PlanError::ConflictingAggregation);
                }
                saw_aggregation = true;

                for field in by {
                    require_field(&schema, field)?;
                }
                let mut next = by.clone();
                for agg in aggregations {
                    if let Some(field) = &agg.field {
                        require_field(&schema, field)?;
                    }
                    next.push(agg.output_name());
                }
                schema = next;
            }
            Stage::Timechart { aggregation, .. } => {
                if saw_aggregation {
                    return Err(PlanError::ConflictingAggregation);
                }
                saw_aggregation = true;

                if let Some(field) = &aggregation.field {
                    require_field(&schema, field)?;
                }
                schema = vec!["_time".to_string(), aggregation.output_name()];
            }
            Stage::Table { fields } => {
                for field in fields {
                    require_field(&schema, field)?;
                }
                schema = fields.clone();
            }
            Stage::Sort { field, .. } => {
                require_field(&schema, field)?;
            }
            Stage::Limit { count } => {
                if *count == 0 || index != last_index {
                    return Err(PlanError::InvalidLimit);
                }
            }
        }
    }

    Ok(schema)
}

fn require_field(schema: &[String], field: &str) -> Result<(), PlanError> {
    if schema.iter().any(|f| f == field) {
        Ok(())
    } else {
        Err(PlanError::UnknownField(field.to_string()))
    }
}

fn validate_filter(filter: &FilterExpr) -> Result<(), PlanError> {
    match filter {
        FilterExpr::MatchAll => Ok(()),
        FilterExpr::Compare(comparison) => validate_comparison(comparison),
        FilterExpr::Not(inner) => validate_filter(inner),
        FilterExpr::And(left, right) | FilterExpr::Or(left, right) => {
            validate_filter(left)?;
            validate_filter(right)
        }
    }
}

fn validate_comparison(comparison: &Comparison) -> Result<(), PlanError> {
    let field = comparison.field.as_str();
    if !BASE_FIELDS.contains(&field) {
        return Err(PlanError::UnknownField(comparison.field.clone()));
    }

    // Pattern literals only make sense with the fuzzy operator.
    if matches!(comparison.value, FilterValue::Pattern(_)) && comparison.op != CompareOp::Fuzzy {
        return Err(PlanError::InvalidComparison {
            field: comparison.field.clone(),
            reason: "pattern literals require the ~ operator".to_string(),
        });
    }

    match field {
        "severity" => match &comparison.value {
            FilterValue::Integer(code) if (0..=7).contains(code) => {
                if comparison.op == CompareOp::Fuzzy {
                    Err(PlanError::InvalidComparison {
                        field: comparison.field.clone(),
                        reason: "severity does not support ~".to_string(),
                    })
                } else {
                    Ok(())
                }
            }
            _ => Err(PlanError::InvalidComparison {
                field: comparison.field.clone(),
                reason: "severity comparisons take an integer between 0 and 7".to_string(),
            }),
        },
        "timestamp" => match &comparison.value {
            FilterValue::Integer(_) => Ok(()),
            FilterValue::String(text) if DateTime::parse_from_rfc3339(text).is_ok() => Ok(()),
            _ => Err(PlanError::InvalidComparison {
                field: comparison.field.clone(),
                reason: "timestamp comparisons take epoch seconds or an RFC 3339 string"
                    .to_string(),
            }),
        },
        _ if TEXT_FIELDS.contains(&field) => match &comparison.value {
            FilterValue::String(_) | FilterValue::Pattern(_) => Ok(()),
            _ => Err(PlanError::InvalidComparison {
                field: comparison.field.clone(),
                reason: "text comparisons take a string value".to_string(),
            }),
        },
        _ => Ok(()),
    }
}
