//! Query plan renderer for the columnar backend (ClickHouse).
//!
//! Timestamps are normalized to epoch milliseconds in both the emitted
//! predicates and the select list, so result rows compare equal across
//! backends. Fuzzy (`~`) comparisons become case-insensitive substring
//! predicates, or `LIKE` when the pattern carries `*` wildcards.

use super::{NativeQuery, Param, RenderedStatement};
use crate::query::{
    AggFunc, Aggregation, CompareOp, Comparison, FilterExpr, FilterValue, QueryPlan,
    SortDirection, Stage, TimeRange,
};
use std::fmt::Write as _;

/// Renders a plan into ClickHouse SQL with bound parameters.
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

    sql.push_str(
        " AND timestamp >= fromUnixTimestamp64Milli(?) AND timestamp < fromUnixTimestamp64Milli(?)",
    );
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
        _ => {
            if field == "timestamp" {
                "toUnixTimestamp64Milli(timestamp) AS \"timestamp\"".to_string()
            } else {
                field.to_string()
            }
        }
    }
}

fn agg_expr(agg: &Aggregation) -> String {
    match (&agg.func, &agg.field) {
        (AggFunc::Count, None) => "count()".to_string(),
        (AggFunc::Count, Some(field)) => format!("count({field})"),
        (AggFunc::Avg, Some(field)) => format!("avg({field})"),
        (AggFunc::Sum, Some(field)) => format!("sum({field})"),
        (AggFunc::Min, Some(field)) => format!("min({field})"),
        (AggFunc::Max, Some(field)) => format!("max({field})"),
        // the parser guarantees non-count aggregations carry a field
        (func, None) => format!("{func}()"),
    }
}

fn bucket_expr(span_seconds: u64) -> String {
    format!("toUnixTimestamp(toStartOfInterval(timestamp, INTERVAL {span_seconds} SECOND)) * 1000")
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
    // sort key projected away by a later table stage: fall back to the
    // underlying expression
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
            write!(
                sql,
                "timestamp {} fromUnixTimestamp64Milli(?)",
                sql_op(comparison.op)
            )
            .unwrap();
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
        write!(sql, "lower({field}) LIKE lower(?)").unwrap();
        params.push(Param::String(wildcard_to_like(pattern)));
    } else {
        write!(sql, "positionCaseInsensitive({field}, ?) > 0").unwrap();
        params.push(Param::String(pattern.to_string()));
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

/// Converts a `*`-wildcard pattern into a `LIKE` pattern, escaping the
/// characters `LIKE` treats specially.
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

fn timestamp_millis(value: &FilterValue) -> i64 {
    match value {
        FilterValue::Integer(seconds) => seconds.saturating_mul(1000),
        FilterValue::String(text) => chrono::DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_default(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse, QueryPlan};
    use chrono::{TimeZone, Utc};

    fn plan_at(query: &str, range: &str, offset: Option<&str>) -> QueryPlan {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        QueryPlan::build_at(parse(query).unwrap(), range, offset, now).unwrap()
    }

    #[test]
    fn test_render_simple_search() {
        let plan = plan_at("search severity<=3", "-1h", None);
        let query = render(&plan);

        assert_eq!(
            query.current.sql,
            "SELECT toUnixTimestamp64Milli(timestamp) AS \"timestamp\", severity, host, source, \
             message, raw FROM logs WHERE severity <= ? AND timestamp >= \
             fromUnixTimestamp64Milli(?) AND timestamp < fromUnixTimestamp64Milli(?) \
             ORDER BY \"timestamp\" DESC"
        );
        assert_eq!(query.current.params.len(), 3);
        assert_eq!(query.current.params[0], Param::Integer(3));
        assert!(query.comparison.is_none());
    }

    #[test]
    fn test_render_window_params_are_millis() {
        let plan = plan_at("search *", "-1h", None);
        let query = render(&plan);

        let start = plan.time_range.start.timestamp_millis();
        let end = plan.time_range.end.timestamp_millis();
        assert_eq!(query.current.params, vec![Param::Integer(start), Param::Integer(end)]);
        assert_eq!(end - start, 3_600_000);
    }

    #[test]
    fn test_render_stats_group_by() {
        let plan = plan_at("search severity<=3 | stats count by message", "-1h", None);
        let query = render(&plan);

        assert_eq!(
            query.current.sql,
            "SELECT message, count() AS \"count\" FROM logs WHERE severity <= ? AND timestamp >= \
             fromUnixTimestamp64Milli(?) AND timestamp < fromUnixTimestamp64Milli(?) \
             GROUP BY message"
        );
    }

    #[test]
    fn test_render_grouped_count_pipeline() {
        let plan = plan_at(
            "search severity<=3 | stats count by message | sort desc count | limit 25",
            "-1h",
            None,
        );
        let query = render(&plan);

        assert!(query.current.sql.ends_with("GROUP BY message ORDER BY \"count\" DESC LIMIT 25"));
    }

    #[test]
    fn test_render_stats_multiple_aggregations() {
        let plan = plan_at("search * | stats count, avg(severity) by host, source", "-1h", None);
        let query = render(&plan);

        assert!(query.current.sql.starts_with(
            "SELECT host, source, count() AS \"count\", avg(severity) AS \"avg(severity)\" FROM logs"
        ));
        assert!(query.current.sql.contains("GROUP BY host, source"));
    }

    #[test]
    fn test_render_timechart() {
        let plan = plan_at("search * | timechart span=5m count", "-1h", None);
        let query = render(&plan);

        assert!(query.current.sql.starts_with(
            "SELECT toUnixTimestamp(toStartOfInterval(timestamp, INTERVAL 300 SECOND)) * 1000 \
             AS \"_time\", count() AS \"count\" FROM logs"
        ));
        assert!(query.current.sql.contains("GROUP BY \"_time\""));
        assert!(query.current.sql.ends_with("ORDER BY \"_time\" ASC"));
    }

    #[test]
    fn test_render_fuzzy_substring() {
        let plan = plan_at("search message~timeout", "-1h", None);
        let query = render(&plan);

        assert!(query
            .current
            .sql
            .contains("positionCaseInsensitive(message, ?) > 0"));
        assert_eq!(query.current.params[0], Param::String("timeout".to_string()));
    }

    #[test]
    fn test_render_fuzzy_wildcard() {
        let plan = plan_at("search message~`conn*refused`", "-1h", None);
        let query = render(&plan);

        assert!(query.current.sql.contains("lower(message) LIKE lower(?)"));
        assert_eq!(
            query.current.params[0],
            Param::String("conn%refused".to_string())
        );
    }

    #[test]
    fn test_render_wildcard_escapes_like_metacharacters() {
        assert_eq!(wildcard_to_like("50%_done*"), "50\\%\\_done%");
    }

    #[test]
    fn test_render_boolean_filter_nesting() {
        let plan = plan_at("search (severity<=2 OR message~panic) AND host=\"web-01\"", "-1h", None);
        let query = render(&plan);

        assert!(query.current.sql.contains(
            "((severity <= ? OR positionCaseInsensitive(message, ?) > 0) AND host = ?)"
        ));
        assert_eq!(
            query.current.params[..3],
            [
                Param::Integer(2),
                Param::String("panic".to_string()),
                Param::String("web-01".to_string())
            ]
        );
    }

    #[test]
    fn test_render_not_filter() {
        let plan = plan_at("search NOT severity>4", "-1h", None);
        let query = render(&plan);

        assert!(query.current.sql.contains("NOT (severity > ?)"));
    }

    #[test]
    fn test_render_compare_offset_produces_shifted_statement() {
        let plan = plan_at("search * | stats count", "-1h", Some("1d"));
        let query = render(&plan);

        let comparison = query.comparison.expect("comparison statement");
        assert_eq!(comparison.sql, query.current.sql);

        let current_start = query.current.params[0].clone();
        let shifted_start = comparison.params[0].clone();
        let (Param::Integer(a), Param::Integer(b)) = (current_start, shifted_start) else {
            panic!("window params must be integers");
        };
        assert_eq!(a - b, 86_400_000);
    }

    #[test]
    fn test_render_timestamp_comparison() {
        let plan = plan_at("search timestamp>=\"2024-01-15T10:00:00Z\"", "-1h", None);
        let query = render(&plan);

        assert!(query
            .current
            .sql
            .contains("timestamp >= fromUnixTimestamp64Milli(?)"));
        let expected = chrono::DateTime::parse_from_rfc3339("2024-01-15T10:00:00Z")
            .unwrap()
            .timestamp_millis();
        assert_eq!(query.current.params[0], Param::Integer(expected));
    }

    #[test]
    fn test_render_table_projection() {
        let plan = plan_at("search * | table host, message", "-1h", None);
        let query = render(&plan);

        assert!(query.current.sql.starts_with("SELECT host, message FROM logs"));
    }
}
