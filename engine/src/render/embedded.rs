//! Query plan renderer for the embedded backend (SQLite + FTS5).
//!
//! The embedded store keeps timestamps as epoch milliseconds and maintains an
//! FTS5 index over `message` and `raw`. Fuzzy (`~`) comparisons on those
//! columns become full-text `MATCH` predicates; on other text columns, and
//! whenever the pattern carries `*` wildcards, they become `LIKE`.

use super::{NativeQuery, Param, RenderedStatement};
use crate::query::{
    AggFunc, Aggregation, CompareOp, Comparison, FilterExpr, FilterValue, QueryPlan,
    SortDirection, Stage, TimeRange,
};
use std::fmt::Write as _;

/// Columns covered by the full-text index.
const FTS_FIELDS: [&str; 2] = ["message", "raw"];

/// Renders a plan into SQLite SQL with bound parameters.
#[must_use]
pub fn render(plan: &QueryPlan) -> NativeQuery {
    let current = render_window(plan, &plan.time_range);
    let comparison = plan
        .compare_offset_seconds
        .map(|offset| render_window(plan, &plan.time_range.shifted_back(offset)));

    NativeQuery {
        current,
        comparison,
    }
}

fn render_window(plan: &QueryPlan, range: &TimeRange) -> RenderedStatement {
    let mut params = Vec::new();

    let select_list: Vec<String> = plan
        .output_fields
        .iter()
        .map(|field| select_expr(plan, field))
        .collect();
    let mut sql = format!("SELECT {} FROM logs WHERE ", select_list.join(", "));

    match plan.stages.first() {
        Some(Stage::Search { filter }) => render_filter(filter, &mut sql, &mut params),
        _ => sql.push_str("1 = 1"),
    }

    sql.push_str(" AND timestamp >= ? AND timestamp < ?");
    params.push(Param::Integer(range.start.timestamp_millis()));
    params.push(Param::Integer(range.end.timestamp_millis()));

    match plan.aggregation() {
        Some(Stage::Stats { by, .. }) if !by.is_empty() => {
            write!(sql, " GROUP BY {}", by.join(", ")).unwrap();
        }
        Some(Stage::Timechart { .. }) => sql.push_str(" GROUP BY \"_time\""),
        _ => {}
    }

    if let Some(order) = order_clause(plan) {
        write!(sql, " ORDER BY {order}").unwrap();
    }

    if let Some(count) = plan.stages.iter().find_map(|s| match s {
        Stage::Limit { count } => Some(*count),
        _ => None,
    }) {
        write!(sql, " LIMIT {count}").unwrap();
    }

    RenderedStatement { sql, params }
}

fn select_expr(plan: &QueryPlan, field: &str) -> String {
    match plan.aggregation() {
        Some(Stage::Stats { aggregations, by }) => {
            if by.iter().any(|f| f == field) {
                field.to_string()
            } else if let Some(agg) = aggregations.iter().find(|a| a.output_name() == field) {
                format!("{} AS \"{field}\"", agg_expr(agg))
            } else {
                field.to_string()
            }
        }
        Some(Stage::Timechart {
            span_seconds,
            aggregation,
        }) => {
            if field == "_time" {
                format!("{} AS \"_time\"", bucket_expr(*span_seconds))
            } else {
                format!("{} AS \"{field}\"", agg_expr(aggregation))
            }
        }
        _ => field.to_string(),
    }
}

fn agg_expr(agg: &Aggregation) -> String {
    match (&agg.func, &agg.field) {
        (AggFunc::Count, None) => "COUNT(*)".to_string(),
        (AggFunc::Count, Some(field)) => format!("COUNT({field})"),
        (AggFunc::Avg, Some(field)) => format!("AVG({field})"),
        (AggFunc::Sum, Some(field)) => format!("SUM({field})"),
        (AggFunc::Min, Some(field)) => format!("MIN({field})"),
        (AggFunc::Max, Some(field)) => format!("MAX({field})"),
        // the parser guarantees non-count aggregations carry a field
        (func, None) => format!("{func}(*)"),
    }
}

fn bucket_expr(span_seconds: u64) -> String {
    format!("((timestamp / 1000) / {span_seconds}) * {span_seconds} * 1000")
}

fn order_clause(plan: &QueryPlan) -> Option<String> {
    let explicit = plan.stages.iter().rev().find_map(|s| match s {
        Stage::Sort { direction, field } => Some((field.clone(), *direction)),
        _ => None,
    });

    if let Some((field, direction)) = explicit {
        let dir = match direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        return Some(format!("{} {dir}", sort_expr(plan, &field)));
    }

    match plan.aggregation() {
        Some(Stage::Timechart { .. }) => Some("\"_time\" ASC".to_string()),
        Some(_) => None,
        None => Some("\"timestamp\" DESC".to_string()),
    }
}

fn sort_expr(plan: &QueryPlan, field: &str) -> String {
    if plan.output_fields.iter().any(|f| f == field) {
        return format!("\"{field}\"");
    }
    if let Some(Stage::Stats { aggregations, .. }) = plan.aggregation() {
        if let Some(agg) = aggregations.iter().find(|a| a.output_name() == field) {
            return agg_expr(agg);
        }
    }
    field.to_string()
}

fn render_filter(expr: &FilterExpr, sql: &mut String, params: &mut Vec<Param>) {
    match expr {
        FilterExpr::MatchAll => sql.push_str("1 = 1"),
        FilterExpr::Compare(comparison) => render_comparison(comparison, sql, params),
        FilterExpr::Not(inner) => {
            sql.push_str("NOT (");
            render_filter(inner, sql, params);
            sql.push(')');
        }
        FilterExpr::And(left, right) => {
            sql.push('(');
            render_filter(left, sql, params);
            sql.push_str(" AND ");
            render_filter(right, sql, params);
            sql.push(')');
        }
        FilterExpr::Or(left, right) => {
            sql.push('(');
            render_filter(left, sql, params);
            sql.push_str(" OR ");
            render_filter(right, sql, params);
            sql.push(')');
        }
    }
}

fn render_comparison(comparison: &Comparison, sql: &mut String, params: &mut Vec<Param>) {
    let field = comparison.field.as_str();
    match field {
        "timestamp" => {
            write!(sql, "timestamp {} ?", sql_op(comparison.op)).unwrap();
            params.push(Param::Integer(timestamp_millis(&comparison.value)));
        }
        "severity" => {
            write!(sql, "severity {} ?", sql_op(comparison.op)).unwrap();
            params.push(to_param(&comparison.value));
        }
        _ if comparison.op == CompareOp::Fuzzy => {
            render_fuzzy(field, &comparison.value, sql, params);
        }
        _ => {
            write!(sql, "{field} {} ?", sql_op(comparison.op)).unwrap();
            params.push(to_param(&comparison.value));
        }
    }
}

fn render_fuzzy(field: &str, value: &FilterValue, sql: &mut String, params: &mut Vec<Param>) {
    let pattern = match value {
        FilterValue::String(s) | FilterValue::Pattern(s) => s.as_str(),
        _ => "",
    };
    if pattern.contains('*') {
        write!(sql, "{field} LIKE ? ESCAPE '\\'").unwrap();
        params.push(Param::String(wildcard_to_like(pattern)));
    } else if FTS_FIELDS.contains(&field) {
        sql.push_str("id IN (SELECT rowid FROM logs_fts WHERE logs_fts MATCH ?)");
        params.push(Param::String(fts_phrase(pattern)));
    } else {
        write!(sql, "{field} LIKE ? ESCAPE '\\'").unwrap();
        params.push(Param::String(format!("%{}%", escape_like(pattern))));
    }
}

fn sql_op(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::NotEq => "!=",
        CompareOp::Lt => "<",
        CompareOp::LtEq => "<=",
        CompareOp::Gt => ">",
        CompareOp::GtEq => ">=",
        // fuzzy comparisons are routed to render_fuzzy before this point
        CompareOp::Fuzzy => "=",
    }
}

fn to_param(value: &FilterValue) -> Param {
    match value {
        FilterValue::String(s) | FilterValue::Pattern(s) => Param::String(s.clone()),
        FilterValue::Integer(i) => Param::Integer(*i),
        FilterValue::Float(f) => Param::Float(*f),
    }
}

fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn wildcard_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Quotes the pattern as an FTS5 phrase so operator input is never parsed as
/// FTS query syntax.
fn fts_phrase(pattern: &str) -> String {
    format!("\"{}\"", pattern.replace('"', "\"\""))
}

fn timestamp_millis(value: &FilterValue) -> i64 {
    match value {
        FilterValue::Integer(seconds) => seconds.saturating_mul(1000),
        FilterValue::String(text) => chrono::DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_default(),
        _ => 0,
    }
}
