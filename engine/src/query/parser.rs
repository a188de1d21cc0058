//! Parser for the pipe-chained search language.
//!
//! Parses queries like:
//! - `search severity<=3`
//! - `search host="web-01" AND message~timeout | stats count by host`
//! - `search severity<=3 | stats count by message | sort desc count | limit 25`
//!
//! The input is first segmented at top-level `|` characters (quoted and
//! backtick literals are respected), then each stage body is parsed by verb.
//! The boolean filter grammar is recursive descent with NOT binding tighter
//! than AND, and AND tighter than OR. Errors carry the byte offset of the
//! offending character in the original query text.

use super::ast::{
    AggFunc, Aggregation, CompareOp, Comparison, FilterExpr, FilterValue, Pipeline, SortDirection,
    Stage,
};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{multispace0, multispace1},
    combinator::{peek, recognize, value},
    multi::many0,
    sequence::preceded,
    IResult, Parser as _,
};
use thiserror::Error;

/// The category of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// The query text is empty.
    #[error("Empty query")]
    EmptyQuery,

    /// A token that does not belong at this position.
    #[error("Unexpected token")]
    UnexpectedToken,

    /// A quoted or backtick literal was never closed.
    #[error("Unterminated literal")]
    UnterminatedLiteral,

    /// A stage verb that is not part of the language.
    #[error("Unknown stage verb '{0}'")]
    UnknownStageVerb(String),

    /// A malformed field, aggregation, or comparison expression.
    #[error("Invalid field expression")]
    InvalidFieldExpression,
}

/// A parse failure, positioned at the offending character.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at position {position}")]
pub struct ParseError {
    /// What went wrong.
    pub kind: ParseErrorKind,
    /// Byte offset of the offending character in the query text.
    pub position: usize,
}

impl ParseError {
    fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self { kind, position }
    }
}

/// Parses query text into an ordered stage pipeline.
///
/// No structural validation happens here; the plan builder (§ plan module)
/// enforces stage ordering and schema rules. The parser guarantees only that
/// every stage is syntactically well formed.
///
/// # Errors
///
/// Returns a [`ParseError`] with the byte position of the offending
/// character. No partial pipeline is ever returned.
///
/// # Examples
///
/// ```
/// use engine::query::parse;
///
/// let pipeline = parse("search severity<=3 | stats count by message").unwrap();
/// assert_eq!(pipeline.stages.len(), 2);
/// ```
pub fn parse(input: &str) -> Result<Pipeline, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::new(ParseErrorKind::EmptyQuery, 0));
    }

    let segments = split_stages(input)?;
    let mut stages = Vec::with_capacity(segments.len());
    for (index, (offset, segment)) in segments.into_iter().enumerate() {
        stages.push(parse_stage(offset, segment, index)?);
    }

    Ok(Pipeline { stages })
}

// ============================================================================
// Stage segmentation
// ============================================================================

/// Splits the query at top-level `|` characters, respecting `"..."` and
/// backtick literals, and reports unterminated literals.
fn split_stages(input: &str) -> Result<Vec<(usize, &str)>, ParseError> {
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut in_quote = false;
    let mut in_backtick = false;
    let mut literal_start = 0usize;

    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if in_quote => {
                chars.next();
            }
            '"' if !in_backtick => {
                if in_quote {
                    in_quote = false;
                } else {
                    in_quote = true;
                    literal_start = i;
                }
            }
            '`' if !in_quote => {
                if in_backtick {
                    in_backtick = false;
                } else {
                    in_backtick = true;
                    literal_start = i;
                }
            }
            '|' if !in_quote && !in_backtick => {
                segments.push((start, &input[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }

    if in_quote || in_backtick {
        return Err(ParseError::new(
            ParseErrorKind::UnterminatedLiteral,
            literal_start,
        ));
    }

    segments.push((start, &input[start..]));
    Ok(segments)
}

// ============================================================================
// Stage dispatch
// ============================================================================

fn parse_stage(offset: usize, text: &str, index: usize) -> Result<Stage, ParseError> {
    let rest = text.trim_start();
    let verb_offset = offset + (text.len() - rest.len());
    if rest.is_empty() {
        return Err(ParseError::new(ParseErrorKind::UnexpectedToken, verb_offset));
    }

    let verb_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let verb = &rest[..verb_len];
    let body = &rest[verb_len..];
    let body_offset = verb_offset + verb_len;

    match verb.to_ascii_lowercase().as_str() {
        "search" => {
            if index > 0 {
                // search is only legal as the leading stage
                return Err(ParseError::new(ParseErrorKind::UnexpectedToken, verb_offset));
            }
            parse_search_body(body_offset, body)
        }
        "stats" => parse_stats_body(body_offset, body),
        "timechart" => parse_timechart_body(body_offset, body),
        "table" => parse_table_body(body_offset, body),
        "sort" => parse_sort_body(body_offset, body),
        "limit" => parse_limit_body(body_offset, body),
        _ => Err(ParseError::new(
            ParseErrorKind::UnknownStageVerb(verb.to_string()),
            verb_offset,
        )),
    }
}

/// Byte position of the start of `remaining` within the segment that began
/// at `base` with content `whole`.
fn pos(base: usize, whole: &str, remaining: &str) -> usize {
    base + (whole.len() - remaining.len())
}

/// Maps a nom failure inside a segment to a positioned [`ParseError`].
fn from_nom(base: usize, whole: &str, err: nom::Err<nom::error::Error<&str>>) -> ParseError {
    let remaining = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => "",
    };
    ParseError::new(
        ParseErrorKind::InvalidFieldExpression,
        pos(base, whole, remaining),
    )
}

/// Fails with `UnexpectedToken` unless `remaining` is blank.
fn expect_end(base: usize, whole: &str, remaining: &str) -> Result<(), ParseError> {
    let trailing = remaining.trim_start();
    if trailing.is_empty() {
        Ok(())
    } else {
        Err(ParseError::new(
            ParseErrorKind::UnexpectedToken,
            pos(base, whole, trailing),
        ))
    }
}

// ============================================================================
// search
// ============================================================================

fn parse_search_body(offset: usize, text: &str) -> Result<Stage, ParseError> {
    let rest = text.trim_start();
    if rest.is_empty() {
        // bare `search` means match everything
        return Ok(Stage::Search {
            filter: FilterExpr::MatchAll,
        });
    }
    let base = pos(offset, text, rest);

    match filter_expr(rest) {
        Ok((remaining, filter)) => {
            expect_end(base, rest, remaining)?;
            Ok(Stage::Search { filter })
        }
        Err(e) => Err(from_nom(base, rest, e)),
    }
}

// ============================================================================
// Filter grammar (recursive descent: OR < AND < NOT < primary)
// ============================================================================

fn filter_expr(input: &str) -> IResult<&str, FilterExpr> {
    or_expr(input)
}

fn or_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(
        (multispace1, tag_no_case("OR"), multispace1),
        and_expr,
    ))
    .parse(input)?;

    let expr = rest
        .into_iter()
        .fold(first, |left, right| FilterExpr::Or(Box::new(left), Box::new(right)));
    Ok((input, expr))
}

fn and_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(
        (multispace1, tag_no_case("AND"), multispace1),
        not_expr,
    ))
    .parse(input)?;

    let expr = rest
        .into_iter()
        .fold(first, |left, right| FilterExpr::And(Box::new(left), Box::new(right)));
    Ok((input, expr))
}

fn not_expr(input: &str) -> IResult<&str, FilterExpr> {
    alt((negated, primary)).parse(input)
}

fn negated(input: &str) -> IResult<&str, FilterExpr> {
    let (input, _) = tag_no_case("NOT").parse(input)?;
    let (input, _) = alt((multispace1, peek(tag("(")))).parse(input)?;
    let (input, inner) = not_expr(input)?;
    Ok((input, FilterExpr::Not(Box::new(inner))))
}

fn primary(input: &str) -> IResult<&str, FilterExpr> {
    alt((grouped, comparison_expr, match_all)).parse(input)
}

fn match_all(input: &str) -> IResult<&str, FilterExpr> {
    value(FilterExpr::MatchAll, tag("*")).parse(input)
}

fn grouped(input: &str) -> IResult<&str, FilterExpr> {
    let (input, _) = tag("(").parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, expr) = filter_expr(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = tag(")").parse(input)?;
    Ok((input, expr))
}

fn comparison_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, field) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = compare_op(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = filter_value(input)?;

    Ok((
        input,
        FilterExpr::Compare(Comparison {
            field: field.to_string(),
            op,
            value,
        }),
    ))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize((
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::NotEq, tag("!=")),
        value(CompareOp::LtEq, tag("<=")),
        value(CompareOp::GtEq, tag(">=")),
        value(CompareOp::Eq, tag("=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Fuzzy, tag("~")),
    ))
    .parse(input)
}

fn filter_value(input: &str) -> IResult<&str, FilterValue> {
    alt((backtick_pattern, quoted_string, bare_token)).parse(input)
}

fn backtick_pattern(input: &str) -> IResult<&str, FilterValue> {
    let (input, _) = tag("`").parse(input)?;
    let (input, pattern) = take_while(|c: char| c != '`').parse(input)?;
    let (input, _) = tag("`").parse(input)?;
    Ok((input, FilterValue::Pattern(pattern.to_string())))
}

fn quoted_string(input: &str) -> IResult<&str, FilterValue> {
    let (input, _) = tag("\"").parse(input)?;
    let mut unescaped = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&input[i + 1..], FilterValue::String(unescaped))),
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    unescaped.push(escaped);
                }
            }
            _ => unescaped.push(c),
        }
    }
    // unreachable in practice: split_stages already rejects unterminated
    // literals before segment parsing begins
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

fn bare_token(input: &str) -> IResult<&str, FilterValue> {
    let (input, token) = take_while1(|c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '*' | '/' | ':' | '@')
    })
    .parse(input)?;

    let value = if let Ok(integer) = token.parse::<i64>() {
        FilterValue::Integer(integer)
    } else if let Ok(float) = token.parse::<f64>() {
        FilterValue::Float(float)
    } else {
        FilterValue::String(token.to_string())
    };
    Ok((input, value))
}

// ============================================================================
// stats
// ============================================================================

fn parse_stats_body(offset: usize, text: &str) -> Result<Stage, ParseError> {
    let rest = text.trim_start();
    let base = pos(offset, text, rest);
    if rest.is_empty() {
        return Err(ParseError::new(ParseErrorKind::InvalidFieldExpression, base));
    }

    let mut aggregations = Vec::new();
    let mut input = rest;
    loop {
        let (next, agg) = parse_aggregation(base, rest, input)?;
        aggregations.push(agg);

        let trimmed = next.trim_start();
        if trimmed.is_empty() {
            input = trimmed;
            break;
        }
        if let Some(after_comma) = trimmed.strip_prefix(',') {
            input = after_comma.trim_start();
            continue;
        }
        if next.len() == trimmed.len() {
            // junk directly after the aggregation, e.g. `count#`
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                pos(base, rest, trimmed),
            ));
        }
        if starts_with_keyword(trimmed, "by") {
            input = trimmed;
            break;
        }
        input = trimmed;
    }

    let by = if input.is_empty() {
        Vec::new()
    } else {
        let after_by = input[2..].trim_start();
        if after_by.is_empty() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidFieldExpression,
                base + rest.len(),
            ));
        }
        let (remaining, fields) = parse_field_list(base, rest, after_by)?;
        expect_end(base, rest, remaining)?;
        fields
    };

    Ok(Stage::Stats { aggregations, by })
}

/// Returns whether `input` starts with `keyword` (case-insensitive) followed
/// by a word boundary.
fn starts_with_keyword(input: &str, keyword: &str) -> bool {
    let Some(prefix) = input.get(..keyword.len()) else {
        return false;
    };
    prefix.eq_ignore_ascii_case(keyword)
        && !input[keyword.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_aggregation<'a>(
    base: usize,
    whole: &'a str,
    input: &'a str,
) -> Result<(&'a str, Aggregation), ParseError> {
    let error_at = pos(base, whole, input);
    let (after_name, name) = identifier(input)
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidFieldExpression, error_at))?;

    let func = match name.to_ascii_lowercase().as_str() {
        "count" => AggFunc::Count,
        "avg" => AggFunc::Avg,
        "sum" => AggFunc::Sum,
        "min" => AggFunc::Min,
        "max" => AggFunc::Max,
        _ => return Err(ParseError::new(ParseErrorKind::InvalidFieldExpression, error_at)),
    };

    if let Some(after_paren) = after_name.strip_prefix('(') {
        let inner = after_paren.trim_start();
        let (after_field, field) = identifier(inner).map_err(|_| {
            ParseError::new(ParseErrorKind::InvalidFieldExpression, pos(base, whole, inner))
        })?;
        let closing = after_field.trim_start();
        let Some(remaining) = closing.strip_prefix(')') else {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                pos(base, whole, closing),
            ));
        };
        Ok((
            remaining,
            Aggregation {
                func,
                field: Some(field.to_string()),
            },
        ))
    } else if func == AggFunc::Count {
        Ok((after_name, Aggregation { func, field: None }))
    } else {
        // avg/sum/min/max require an argument
        Err(ParseError::new(ParseErrorKind::InvalidFieldExpression, error_at))
    }
}

fn parse_field_list<'a>(
    base: usize,
    whole: &'a str,
    input: &'a str,
) -> Result<(&'a str, Vec<String>), ParseError> {
    let mut fields = Vec::new();
    let mut input = input.trim_start();
    loop {
        let (remaining, field) = identifier(input).map_err(|_| {
            ParseError::new(ParseErrorKind::InvalidFieldExpression, pos(base, whole, input))
        })?;
        fields.push(field.to_string());

        let trimmed = remaining.trim_start();
        if let Some(after_comma) = trimmed.strip_prefix(',') {
            input = after_comma.trim_start();
        } else {
            return Ok((remaining, fields));
        }
    }
}

// ============================================================================
// timechart
// ============================================================================

fn parse_timechart_body(offset: usize, text: &str) -> Result<Stage, ParseError> {
    let rest = text.trim_start();
    let base = pos(offset, text, rest);

    if !starts_with_keyword(rest, "span") {
        return Err(ParseError::new(ParseErrorKind::InvalidFieldExpression, base));
    }
    let after_span = rest[4..].trim_start();
    let Some(after_eq) = after_span.strip_prefix('=') else {
        return Err(ParseError::new(
            ParseErrorKind::UnexpectedToken,
            pos(base, rest, after_span),
        ));
    };
    let duration_text = after_eq.trim_start();
    let duration_len = duration_text
        .find(|c: char| !(c.is_ascii_alphanumeric()))
        .unwrap_or(duration_text.len());
    let duration_token = &duration_text[..duration_len];
    let Some(span_seconds) = super::time::parse_duration(duration_token) else {
        return Err(ParseError::new(
            ParseErrorKind::InvalidFieldExpression,
            pos(base, rest, duration_text),
        ));
    };

    let agg_text = duration_text[duration_len..].trim_start();
    if agg_text.is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::InvalidFieldExpression,
            base + rest.len(),
        ));
    }
    let (remaining, aggregation) = parse_aggregation(base, rest, agg_text)?;
    expect_end(base, rest, remaining)?;

    Ok(Stage::Timechart {
        span_seconds,
        aggregation,
    })
}

// ============================================================================
// table / sort / limit
// ============================================================================

fn parse_table_body(offset: usize, text: &str) -> Result<Stage, ParseError> {
    let rest = text.trim_start();
    let base = pos(offset, text, rest);
    if rest.is_empty() {
        return Err(ParseError::new(ParseErrorKind::InvalidFieldExpression, base));
    }

    let (remaining, fields) = parse_field_list(base, rest, rest)?;
    expect_end(base, rest, remaining)?;
    Ok(Stage::Table { fields })
}

fn parse_sort_body(offset: usize, text: &str) -> Result<Stage, ParseError> {
    let rest = text.trim_start();
    let base = pos(offset, text, rest);
    if rest.is_empty() {
        return Err(ParseError::new(ParseErrorKind::InvalidFieldExpression, base));
    }

    let (after_first, first) = identifier(rest)
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidFieldExpression, base))?;

    let (direction, field, remaining) = match first.to_ascii_lowercase().as_str() {
        "asc" | "desc" => {
            let direction = if first.eq_ignore_ascii_case("asc") {
                SortDirection::Asc
            } else {
                SortDirection::Desc
            };
            let field_text = after_first.trim_start();
            let (remaining, field) = identifier(field_text).map_err(|_| {
                ParseError::new(
                    ParseErrorKind::InvalidFieldExpression,
                    pos(base, rest, field_text),
                )
            })?;
            (direction, field, remaining)
        }
        _ => (SortDirection::default(), first, after_first),
    };

    expect_end(base, rest, remaining)?;
    Ok(Stage::Sort {
        direction,
        field: field.to_string(),
    })
}

fn parse_limit_body(offset: usize, text: &str) -> Result<Stage, ParseError> {
    let rest = text.trim_start();
    let base = pos(offset, text, rest);
    if rest.is_empty() {
        return Err(ParseError::new(ParseErrorKind::UnexpectedToken, base));
    }

    let digits_len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let Ok(count) = rest[..digits_len].parse::<u64>() else {
        return Err(ParseError::new(ParseErrorKind::UnexpectedToken, base));
    };
    expect_end(base, rest, &rest[digits_len..])?;

    Ok(Stage::Limit { count })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn single_filter(query: &str) -> FilterExpr {
        let pipeline = parse(query).unwrap();
        match pipeline.stages.into_iter().next().unwrap() {
            Stage::Search { filter } => filter,
            other => panic!("Expected search stage, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty_query() {
        let err = parse("").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyQuery);

        let err = parse("   ").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyQuery);
    }

    #[test]
    fn test_parse_bare_search() {
        assert_eq!(single_filter("search"), FilterExpr::MatchAll);
        assert_eq!(single_filter("search *"), FilterExpr::MatchAll);
    }

    #[test]
    fn test_parse_simple_comparison() {
        let filter = single_filter("search severity<=3");
        assert_eq!(
            filter,
            FilterExpr::Compare(Comparison {
                field: "severity".to_string(),
                op: CompareOp::LtEq,
                value: FilterValue::Integer(3),
            })
        );
    }

    #[test]
    fn test_parse_comparison_with_spaces() {
        let filter = single_filter("search severity <= 3");
        assert!(matches!(filter, FilterExpr::Compare(_)));
    }

    #[test]
    fn test_parse_all_operators() {
        let cases = [
            ("=", CompareOp::Eq),
            ("!=", CompareOp::NotEq),
            ("<", CompareOp::Lt),
            ("<=", CompareOp::LtEq),
            (">", CompareOp::Gt),
            (">=", CompareOp::GtEq),
            ("~", CompareOp::Fuzzy),
        ];
        for (text, expected) in cases {
            let filter = single_filter(&format!("search severity{text}3"));
            match filter {
                FilterExpr::Compare(c) => assert_eq!(c.op, expected, "operator {text}"),
                other => panic!("Expected comparison for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_quoted_string_value() {
        let filter = single_filter("search host=\"web-01\"");
        match filter {
            FilterExpr::Compare(c) => {
                assert_eq!(c.value, FilterValue::String("web-01".to_string()));
            }
            other => panic!("Expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_quoted_string_with_escapes() {
        let filter = single_filter(r#"search message="said \"hi\"""#);
        match filter {
            FilterExpr::Compare(c) => {
                assert_eq!(c.value, FilterValue::String("said \"hi\"".to_string()));
            }
            other => panic!("Expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_quoted_string_with_pipe() {
        let pipeline = parse("search message=\"a|b\" | limit 5").unwrap();
        assert_eq!(pipeline.stages.len(), 2);
    }

    #[test]
    fn test_parse_backtick_pattern() {
        let filter = single_filter("search message~`conn.* refused`");
        match filter {
            FilterExpr::Compare(c) => {
                assert_eq!(c.op, CompareOp::Fuzzy);
                assert_eq!(c.value, FilterValue::Pattern("conn.* refused".to_string()));
            }
            other => panic!("Expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bare_word_value() {
        let filter = single_filter("search host=web-01");
        match filter {
            FilterExpr::Compare(c) => {
                assert_eq!(c.value, FilterValue::String("web-01".to_string()));
            }
            other => panic!("Expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_float_value() {
        let filter = single_filter("search severity=3.5");
        match filter {
            FilterExpr::Compare(c) => assert_eq!(c.value, FilterValue::Float(3.5)),
            other => panic!("Expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_and_or_precedence() {
        // a = 1 OR b = 2 AND c = 3 parses as a = 1 OR (b = 2 AND c = 3)
        let filter = single_filter("search a=1 OR b=2 AND c=3");
        match filter {
            FilterExpr::Or(left, right) => {
                assert!(matches!(*left, FilterExpr::Compare(_)));
                assert!(matches!(*right, FilterExpr::And(..)));
            }
            other => panic!("Expected OR at top level, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_keywords_case_insensitive() {
        let filter = single_filter("search a=1 and b=2 or c=3");
        assert!(matches!(filter, FilterExpr::Or(..)));
    }

    #[test]
    fn test_parse_grouped() {
        // (a = 1 OR b = 2) AND c = 3
        let filter = single_filter("search (a=1 OR b=2) AND c=3");
        match filter {
            FilterExpr::And(left, right) => {
                assert!(matches!(*left, FilterExpr::Or(..)));
                assert!(matches!(*right, FilterExpr::Compare(_)));
            }
            other => panic!("Expected AND at top level, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_not() {
        let filter = single_filter("search NOT severity>4");
        assert!(matches!(filter, FilterExpr::Not(_)));

        let filter = single_filter("search NOT (a=1 OR b=2)");
        match filter {
            FilterExpr::Not(inner) => assert!(matches!(*inner, FilterExpr::Or(..))),
            other => panic!("Expected NOT, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_full_pipeline() {
        let pipeline =
            parse("search severity<=3 | stats count by message | sort desc count | limit 25")
                .unwrap();

        assert_eq!(pipeline.stages.len(), 4);
        assert!(matches!(pipeline.stages[0], Stage::Search { .. }));
        match &pipeline.stages[1] {
            Stage::Stats { aggregations, by } => {
                assert_eq!(aggregations.len(), 1);
                assert_eq!(aggregations[0].func, AggFunc::Count);
                assert!(aggregations[0].field.is_none());
                assert_eq!(by, &["message".to_string()]);
            }
            other => panic!("Expected stats, got {other:?}"),
        }
        match &pipeline.stages[2] {
            Stage::Sort { direction, field } => {
                assert_eq!(*direction, SortDirection::Desc);
                assert_eq!(field, "count");
            }
            other => panic!("Expected sort, got {other:?}"),
        }
        assert_eq!(pipeline.stages[3], Stage::Limit { count: 25 });
    }

    #[test]
    fn test_parse_stats_multiple_aggregations() {
        let pipeline = parse("search * | stats count, avg(severity), max(severity) by host, source")
            .unwrap();

        match &pipeline.stages[1] {
            Stage::Stats { aggregations, by } => {
                assert_eq!(aggregations.len(), 3);
                assert_eq!(aggregations[1].func, AggFunc::Avg);
                assert_eq!(aggregations[1].field.as_deref(), Some("severity"));
                assert_eq!(by, &["host".to_string(), "source".to_string()]);
            }
            other => panic!("Expected stats, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_stats_space_separated_aggregations() {
        let pipeline = parse("search * | stats count avg(severity) by host").unwrap();

        match &pipeline.stages[1] {
            Stage::Stats { aggregations, .. } => assert_eq!(aggregations.len(), 2),
            other => panic!("Expected stats, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_stats_without_by() {
        let pipeline = parse("search * | stats count").unwrap();
        match &pipeline.stages[1] {
            Stage::Stats { aggregations, by } => {
                assert_eq!(aggregations.len(), 1);
                assert!(by.is_empty());
            }
            other => panic!("Expected stats, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_stats_agg_requires_argument() {
        let err = parse("search * | stats avg").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFieldExpression);
    }

    #[test]
    fn test_parse_stats_unknown_function() {
        let err = parse("search * | stats median(severity)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFieldExpression);
    }

    #[test]
    fn test_parse_timechart() {
        let pipeline = parse("search * | timechart span=5m count").unwrap();
        match &pipeline.stages[1] {
            Stage::Timechart {
                span_seconds,
                aggregation,
            } => {
                assert_eq!(*span_seconds, 300);
                assert_eq!(aggregation.func, AggFunc::Count);
            }
            other => panic!("Expected timechart, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_timechart_with_aggregation_field() {
        let pipeline = parse("search * | timechart span=1h avg(severity)").unwrap();
        match &pipeline.stages[1] {
            Stage::Timechart { aggregation, .. } => {
                assert_eq!(aggregation.func, AggFunc::Avg);
                assert_eq!(aggregation.field.as_deref(), Some("severity"));
            }
            other => panic!("Expected timechart, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_timechart_invalid_span() {
        let err = parse("search * | timechart span=5x count").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidFieldExpression);
    }

    #[test]
    fn test_parse_table() {
        let pipeline = parse("search * | table timestamp, host, message").unwrap();
        match &pipeline.stages[1] {
            Stage::Table { fields } => {
                assert_eq!(
                    fields,
                    &["timestamp".to_string(), "host".to_string(), "message".to_string()]
                );
            }
            other => panic!("Expected table, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_sort_default_direction() {
        let pipeline = parse("search * | sort severity").unwrap();
        match &pipeline.stages[1] {
            Stage::Sort { direction, field } => {
                assert_eq!(*direction, SortDirection::Desc);
                assert_eq!(field, "severity");
            }
            other => panic!("Expected sort, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_sort_asc() {
        let pipeline = parse("search * | sort asc timestamp").unwrap();
        match &pipeline.stages[1] {
            Stage::Sort { direction, .. } => assert_eq!(*direction, SortDirection::Asc),
            other => panic!("Expected sort, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_verb() {
        let err = parse("search * | explode").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnknownStageVerb("explode".to_string())
        );
        assert_eq!(err.position, 11);
    }

    #[test]
    fn test_parse_search_not_first_rejected() {
        let err = parse("search * | search severity=1").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_parse_unterminated_quote_position() {
        let err = parse("search message=\"oops | limit 5").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedLiteral);
        assert_eq!(err.position, 15);
    }

    #[test]
    fn test_parse_unterminated_backtick() {
        let err = parse("search message~`conn").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedLiteral);
        assert_eq!(err.position, 15);
    }

    #[test]
    fn test_parse_empty_stage_segment() {
        let err = parse("search * | | limit 5").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_parse_trailing_garbage_position() {
        let err = parse("search severity<=3 ???").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
        assert_eq!(err.position, 19);
    }

    #[test]
    fn test_parse_limit_requires_number() {
        let err = parse("search * | limit many").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_parse_twice_yields_equal_pipelines() {
        let text = "search severity<=3 AND host=\"web-01\" | stats count by message | limit 10";
        assert_eq!(parse(text).unwrap(), parse(text).unwrap());
    }

    #[test]
    fn test_parse_display_round_trip() {
        let texts = [
            "search severity<=3 | stats count by message | sort desc count | limit 25",
            "search (a=1 OR b=2) AND NOT c~`x.*y` | timechart span=5m avg(severity)",
            "search host=\"web 01\" | table timestamp, message",
        ];
        for text in texts {
            let pipeline = parse(text).unwrap();
            let reparsed = parse(&pipeline.to_string()).unwrap();
            assert_eq!(pipeline, reparsed, "round trip failed for {text}");
        }
    }
}
