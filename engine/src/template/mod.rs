//! Variable substitution for action payloads.
//!
//! Renders `{{...}}` placeholders in notification templates from evaluation
//! results and run metadata. Placeholders that do not resolve are left
//! verbatim in the output so operators can see which variable failed to bind.
//!
//! Resolution order for a placeholder key:
//! 1. a metadata key (`alert_name`, `alert_severity`, `result_count`,
//!    `timestamp`, ...),
//! 2. `result.<path>` against the first result row, or `result[<n>].<path>`
//!    against the n-th row,
//! 3. a bare `<path>` against the first result row.
//!
//! Dotted paths traverse nested objects; a missing intermediate leaves the
//! placeholder unresolved.

use crate::exec::Row;
use std::collections::HashMap;

/// Renders a template against results and metadata.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
///
/// let metadata = HashMap::from([
///     ("alert_name".to_string(), serde_json::json!("High Error Rate")),
///     ("result_count".to_string(), serde_json::json!(150)),
/// ]);
/// let rendered = engine::template::render(
///     "Alert: {{alert_name}} - Count: {{result_count}}",
///     &[],
///     &metadata,
/// );
/// assert_eq!(rendered, "Alert: High Error Rate - Count: 150");
/// ```
#[must_use]
pub fn render(template: &str, results: &[Row], metadata: &HashMap<String, serde_json::Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // no closing braces: emit the tail untouched
            out.push_str(&rest[start..]);
            return out;
        };

        let placeholder = &rest[start..start + 2 + end + 2];
        let key = after[..end].trim();
        match resolve(key, results, metadata) {
            Some(value) => out.push_str(&value),
            None => out.push_str(placeholder),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn resolve(
    key: &str,
    results: &[Row],
    metadata: &HashMap<String, serde_json::Value>,
) -> Option<String> {
    if key.is_empty() {
        return None;
    }
    if let Some(value) = metadata.get(key) {
        return format_value(value);
    }

    if let Some(rest) = key.strip_prefix("result[") {
        let (index_text, path) = rest.split_once(']')?;
        let index: usize = index_text.trim().parse().ok()?;
        let row = results.get(index)?;
        let path = path.strip_prefix('.').unwrap_or(path);
        if path.is_empty() {
            return None;
        }
        resolve_path(row, path)
    } else if let Some(path) = key.strip_prefix("result.") {
        resolve_path(results.first()?, path)
    } else {
        resolve_path(results.first()?, key)
    }
}

fn resolve_path(row: &Row, path: &str) -> Option<String> {
    let mut segments = path.split('.');
    let mut current = row.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    format_value(current)
}

fn format_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
