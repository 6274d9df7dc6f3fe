//! The filter expression mini-language.
//!
//! A [`FilterExpression`] is a pattern string plus positional values. [`parse`] turns it
//! into a predicate on one field. Rules are tried in a fixed order and the first match
//! wins; a pattern matched by an earlier rule is never re-read by a later one.
//!
//! | pattern        | values       | predicate                         |
//! |----------------|--------------|-----------------------------------|
//! | `"%1"`         | `[5]`        | `field = 5`                       |
//! | `">=%1"`       | `[5]`        | `field >= 5`                      |
//! | `"%1..%2"`     | `[1, 9]`     | `field >= 1 AND field <= 9`       |
//! | `"%1\|%2\|%3"` | `[a, b, c]`  | `field IN (a, b, c)`              |
//! | `">%1&<>%2"`   | `[1, 4]`     | `field > 1 AND field <> 4`        |
//! | `"*%1*"`       | `["ab"]`     | `field LIKE '%ab%'`               |
//! | `"@%1*"`       | `["Ab"]`     | `field ILIKE 'Ab%'`               |
//!
//! Placeholders are substituted textually before any other rule runs. Combinations of
//! `..`, `|` and `&` are not composed: only the first matching rule applies, so
//! `"1..5|9"` is a range over the first two values.

use bson::Bson;

use crate::{
    error::{ServiceError, ServiceResult},
    predicate::{Expr, FieldOp, WILDCARD},
};

/// Marks a pattern as case-insensitive.
const CASE_INSENSITIVE_MARKER: char = '@';
const RANGE_SEPARATOR: &str = "..";
const ANY_SEPARATOR: char = '|';
const ALL_SEPARATOR: char = '&';
const PATTERN_WILDCARD: char = '*';

/// Comparison tokens, longest first so `>=` is never read as `>`.
const OPERATORS: [(&str, FieldOp); 5] = [
    (">=", FieldOp::Gte),
    ("<=", FieldOp::Lte),
    ("<>", FieldOp::Ne),
    (">", FieldOp::Gt),
    ("<", FieldOp::Lt),
];

/// A pattern string with its positional values.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    pattern: String,
    values: Vec<Bson>,
}

impl FilterExpression {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            values: Vec::new(),
        }
    }

    /// Appends a positional value (`%1` is the first appended value).
    pub fn value(mut self, value: impl Into<Bson>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Appends several positional values.
    pub fn values<V: Into<Bson>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn positional(&self) -> &[Bson] {
        &self.values
    }
}

/// Field-to-expression pairs applied together by `search`.
///
/// Order is preserved; every pair is conjoined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    entries: Vec<(String, FilterExpression)>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: impl Into<String>, expression: FilterExpression) -> Self {
        self.entries.push((field.into(), expression));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterExpression)> {
        self.entries.iter().map(|(field, expr)| (field.as_str(), expr))
    }

    /// Parses every entry and conjoins the results.
    pub fn to_predicate(&self) -> ServiceResult<Option<Expr>> {
        let mut parts = self
            .iter()
            .map(|(field, expression)| parse(field, expression))
            .collect::<ServiceResult<Vec<_>>>()?;

        Ok(match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Expr::And(parts)),
        })
    }
}

/// Parses `expression` into a predicate on `field`.
///
/// # Errors
///
/// Returns a `Validation` error naming `field` when the pattern needs a positional value
/// that is missing or null.
pub fn parse(field: &str, expression: &FilterExpression) -> ServiceResult<Expr> {
    FilterParser {
        field,
        values: &expression.values,
        original: &expression.pattern,
    }
    .parse()
}

struct FilterParser<'a> {
    field: &'a str,
    values: &'a [Bson],
    original: &'a str,
}

impl<'a> FilterParser<'a> {
    fn parse(&self) -> ServiceResult<Expr> {
        let (case_insensitive, raw) = match self.original.strip_prefix(CASE_INSENSITIVE_MARKER) {
            Some(rest) => (true, rest),
            None => (false, self.original),
        };
        let pattern = self.substitute(raw);

        if pattern.contains(RANGE_SEPARATOR) {
            return self.range();
        }
        if pattern.contains(ANY_SEPARATOR) {
            return self.any_of(&pattern);
        }
        if pattern.contains(ALL_SEPARATOR) {
            return self.all_of(&pattern);
        }
        if pattern.contains(PATTERN_WILDCARD) {
            return Ok(self.wildcard(&pattern, case_insensitive));
        }
        if let Some(op) = leading_operator(&pattern) {
            return self.compare(op, 0);
        }

        self.literal(case_insensitive)
    }

    /// Replaces `%N` placeholders, highest index first so `%10` survives `%1`.
    fn substitute(&self, pattern: &str) -> String {
        self.values
            .iter()
            .enumerate()
            .rev()
            .fold(pattern.to_string(), |acc, (index, value)| {
                acc.replace(&format!("%{}", index + 1), &display(value))
            })
    }

    fn range(&self) -> ServiceResult<Expr> {
        let parts = [FieldOp::Gte, FieldOp::Lte]
            .into_iter()
            .enumerate()
            .filter_map(|(index, op)| self.part(op, index))
            .collect::<Vec<_>>();

        self.conjunction_or_equality(parts)
    }

    fn any_of(&self, pattern: &str) -> ServiceResult<Expr> {
        let segments = pattern.split(ANY_SEPARATOR).count();
        let values = self
            .values
            .iter()
            .take(segments)
            .filter(|value| !matches!(value, Bson::Null))
            .cloned()
            .collect::<Vec<_>>();

        if values.is_empty() {
            return Err(self.missing_value(0));
        }

        Ok(Expr::field(self.field.to_string(), FieldOp::In, Bson::Array(values)))
    }

    fn all_of(&self, pattern: &str) -> ServiceResult<Expr> {
        let parts = pattern
            .split(ALL_SEPARATOR)
            .enumerate()
            .filter_map(|(index, segment)| {
                let op = leading_operator(segment.trim()).unwrap_or(FieldOp::Eq);

                self.part(op, index)
            })
            .collect::<Vec<_>>();

        self.conjunction_or_equality(parts)
    }

    fn wildcard(&self, pattern: &str, case_insensitive: bool) -> Expr {
        let like = pattern.replace(PATTERN_WILDCARD, &WILDCARD.to_string());
        let op = if case_insensitive { FieldOp::ILike } else { FieldOp::Like };

        Expr::field(self.field.to_string(), op, Bson::String(like))
    }

    fn literal(&self, case_insensitive: bool) -> ServiceResult<Expr> {
        let value = self.value_at(0)?;

        match (case_insensitive, value) {
            (true, Bson::String(text)) => Ok(Expr::field(
                self.field.to_string(),
                FieldOp::ILike,
                Bson::String(text.clone()),
            )),
            _ => Ok(Expr::field(self.field.to_string(), FieldOp::Eq, value.clone())),
        }
    }

    fn compare(&self, op: FieldOp, index: usize) -> ServiceResult<Expr> {
        Ok(Expr::field(self.field.to_string(), op, self.value_at(index)?.clone()))
    }

    /// A comparison for a multi-part rule, or `None` when its value is unusable.
    fn part(&self, op: FieldOp, index: usize) -> Option<Expr> {
        self.value_at(index).ok().map(|value| {
            Expr::field(self.field.to_string(), op, value.clone())
        })
    }

    fn conjunction_or_equality(&self, mut parts: Vec<Expr>) -> ServiceResult<Expr> {
        match parts.len() {
            0 => self.compare(FieldOp::Eq, 0),
            1 => Ok(parts.remove(0)),
            _ => Ok(Expr::And(parts)),
        }
    }

    fn value_at(&self, index: usize) -> ServiceResult<&'a Bson> {
        match self.values.get(index) {
            Some(Bson::Null) | None => Err(self.missing_value(index)),
            Some(value) => Ok(value),
        }
    }

    fn missing_value(&self, index: usize) -> ServiceError {
        ServiceError::validation(
            format!(
                "filter pattern '{}' requires a value at position {}",
                self.original,
                index + 1
            ),
            Some(self.field),
        )
    }
}

/// Returns the comparison operator `segment` starts with, if any.
fn leading_operator(segment: &str) -> Option<FieldOp> {
    OPERATORS
        .iter()
        .find(|(token, _)| segment.starts_with(token))
        .map(|(_, op)| *op)
}

/// Text form of a value used for placeholder substitution.
fn display(value: &Bson) -> String {
    match value {
        Bson::String(text) => text.clone(),
        Bson::Int32(number) => number.to_string(),
        Bson::Int64(number) => number.to_string(),
        Bson::Double(number) => number.to_string(),
        Bson::Boolean(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Filter;

    fn parse_ok(pattern: &str, values: Vec<Bson>) -> Expr {
        parse("score", &FilterExpression::new(pattern).values(values)).unwrap()
    }

    #[test]
    fn placeholders_feed_an_and_conjunction() {
        let expr = parse_ok(">=%1&<=%2", vec![10.into(), 20.into()]);

        assert_eq!(expr, Filter::and([Filter::gte("score", 10), Filter::lte("score", 20)]));
    }

    #[test]
    fn wildcards_wrap_substituted_text() {
        let expr = parse("name", &FilterExpression::new("*%1*").value("ab")).unwrap();

        assert_eq!(expr, Filter::like("name", "%ab%"));
    }

    #[test]
    fn case_insensitive_marker_routes_wildcards_through_ilike() {
        let expr = parse("name", &FilterExpression::new("@%1*").value("Ab")).unwrap();

        assert_eq!(expr, Filter::ilike("name", "Ab%"));
    }

    #[test]
    fn case_insensitive_literal_uses_ilike_without_wildcards() {
        let expr = parse("name", &FilterExpression::new("@%1").value("Alice")).unwrap();

        assert_eq!(expr, Filter::ilike("name", "Alice"));
    }

    #[test]
    fn range_is_inclusive() {
        let expr = parse_ok("%1..%2", vec![1.into(), 9.into()]);

        assert_eq!(expr, Filter::between("score", 1, 9));
    }

    #[test]
    fn range_takes_precedence_over_or() {
        let expr = parse_ok("1..5|9", vec![1.into(), 5.into(), 9.into()]);

        assert_eq!(expr, Filter::between("score", 1, 5));
    }

    #[test]
    fn or_takes_precedence_over_and() {
        let expr = parse_ok("%1|%2&%3", vec![1.into(), 2.into(), 3.into()]);

        assert_eq!(expr, Filter::in_list("score", [1, 2]));
    }

    #[test]
    fn or_consumes_one_value_per_segment() {
        let expr = parse_ok("a|b|c", vec!["x".into(), "y".into(), "z".into(), "extra".into()]);

        assert_eq!(expr, Filter::in_list("score", ["x", "y", "z"]));
    }

    #[test]
    fn range_with_one_value_keeps_the_lower_bound() {
        let expr = parse_ok("%1..", vec![3.into()]);

        assert_eq!(expr, Filter::gte("score", 3));
    }

    #[test]
    fn and_segments_without_operator_compare_for_equality() {
        let expr = parse_ok(">%1&%2", vec![1.into(), 4.into()]);

        assert_eq!(expr, Filter::and([Filter::gt("score", 1), Filter::eq("score", 4)]));
    }

    #[test]
    fn operators_are_matched_longest_first() {
        assert_eq!(parse_ok(">=%1", vec![5.into()]), Filter::gte("score", 5));
        assert_eq!(parse_ok("<=%1", vec![5.into()]), Filter::lte("score", 5));
        assert_eq!(parse_ok("<>%1", vec![5.into()]), Filter::ne("score", 5));
        assert_eq!(parse_ok(">%1", vec![5.into()]), Filter::gt("score", 5));
        assert_eq!(parse_ok("<%1", vec![5.into()]), Filter::lt("score", 5));
    }

    #[test]
    fn default_rule_is_equality_on_the_first_value() {
        assert_eq!(parse_ok("%1", vec![7.into()]), Filter::eq("score", 7));
    }

    #[test]
    fn double_digit_placeholders_are_not_clobbered() {
        let values = (1..=10).map(Bson::from).collect::<Vec<_>>();
        let expr = parse("name", &FilterExpression::new("*%10*").values(values)).unwrap();

        assert_eq!(expr, Filter::like("name", "%10%"));
    }

    #[test]
    fn missing_value_is_a_validation_error() {
        let err = parse("score", &FilterExpression::new(">=%1")).unwrap_err();

        match err {
            ServiceError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("score")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn null_value_is_not_silently_compared() {
        let result = parse("score", &FilterExpression::new("%1").value(Bson::Null));

        assert!(matches!(result, Err(ServiceError::Validation { .. })));
    }

    #[test]
    fn parsing_is_idempotent() {
        let expression = FilterExpression::new(">=%1&<%2").values([3, 8]);

        assert_eq!(
            parse("score", &expression).unwrap(),
            parse("score", &expression).unwrap()
        );
    }

    #[test]
    fn criteria_conjoin_every_field() {
        let criteria = FilterCriteria::new()
            .field("score", FilterExpression::new(">%1").value(1))
            .field("name", FilterExpression::new("*x*"));

        assert_eq!(
            criteria.to_predicate().unwrap(),
            Some(Filter::and([Filter::gt("score", 1), Filter::like("name", "%x%")]))
        );
    }
}
