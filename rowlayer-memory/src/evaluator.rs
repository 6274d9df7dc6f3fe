//! Predicate evaluation for in-memory row filtering.
//!
//! This module provides the evaluation engine for predicates, enabling filtering, ordering
//! and pattern matching on BSON rows. A missing field always reads as null.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, DateTime, Document};

use rowlayer_core::{
    entity::field_value,
    error::{ServiceError, ServiceResult},
    predicate::{Expr, FieldOp, QueryVisitor, WILDCARD},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so `Int32(1)` equals `Double(1.0)`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    /// All integers and floats normalized to f64
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values compared by raw BSON equality only (binary, object ids...)
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Whether two values are equal under evaluator semantics.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Total order used for sorting: nulls first, incomparable values tie.
pub(crate) fn sort_order(left: &Bson, right: &Bson) -> Ordering {
    match (Comparable::from(left), Comparable::from(right)) {
        (Comparable::Null, Comparable::Null) => Ordering::Equal,
        (Comparable::Null, _) => Ordering::Less,
        (_, Comparable::Null) => Ordering::Greater,
        (left, right) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

/// SQL `LIKE` matching: `%` matches any run of characters, `_` exactly one.
pub(crate) fn like(value: &str, pattern: &str, case_insensitive: bool) -> bool {
    let fold = |s: &str| -> Vec<char> {
        if case_insensitive {
            s.chars().flat_map(char::to_lowercase).collect()
        } else {
            s.chars().collect()
        }
    };
    let value = fold(value);
    let pattern = fold(pattern);

    let (mut v, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        if p < pattern.len() && pattern[p] == WILDCARD {
            backtrack = Some((p, v));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == value[v]) {
            p += 1;
            v += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            v = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == WILDCARD)
}

pub(crate) struct RowEvaluator<'a> {
    row: &'a Document,
}

impl<'a> RowEvaluator<'a> {
    pub fn new(row: &'a Document) -> Self {
        Self { row }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> ServiceResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns the rows matching `expr`, in their original order.
    pub fn filter_rows(rows: Vec<Document>, expr: &Expr) -> ServiceResult<Vec<Document>> {
        let mut matched = Vec::with_capacity(rows.len());

        for row in rows {
            if RowEvaluator::new(&row).evaluate(expr)? {
                matched.push(row);
            }
        }

        Ok(matched)
    }
}

impl QueryVisitor for RowEvaluator<'_> {
    type Output = bool;
    type Error = ServiceError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_null(&mut self, field: &str, is_null: bool) -> Result<Self::Output, Self::Error> {
        let null = matches!(Comparable::from(field_value(self.row, field)), Comparable::Null);

        Ok(null == is_null)
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        let left = Comparable::from(field_value(self.row, field));

        match op {
            FieldOp::Eq => Ok(left == Comparable::from(value)),
            FieldOp::Ne => Ok(left != Comparable::from(value)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                Ok(match left.partial_cmp(&Comparable::from(value)) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                })
            }
            FieldOp::In | FieldOp::NotIn => {
                let Bson::Array(candidates) = value else {
                    return Err(ServiceError::validation(
                        format!("'{field}' membership test needs an array of values"),
                        Some(field),
                    ));
                };
                let found = candidates
                    .iter()
                    .any(|candidate| left == Comparable::from(candidate));

                Ok(if *op == FieldOp::In { found } else { !found })
            }
            FieldOp::Like | FieldOp::ILike => match (left, value) {
                (Comparable::String(text), Bson::String(pattern)) => {
                    Ok(like(text, pattern, *op == FieldOp::ILike))
                }
                _ => Ok(false),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use rowlayer_core::predicate::Filter;

    use super::*;

    fn matches(row: &Document, expr: Expr) -> bool {
        RowEvaluator::new(row).evaluate(&expr).unwrap()
    }

    #[test]
    fn missing_fields_read_as_null() {
        let row = doc! { "a": 1 };

        assert!(matches(&row, Filter::is_null("b")));
        assert!(!matches(&row, Filter::is_not_null("b")));
        assert!(matches(&row, Filter::ne("b", true)));
        assert!(!matches(&row, Filter::gt("b", 0)));
    }

    #[test]
    fn numbers_compare_across_widths() {
        let row = doc! { "n": 5_i64 };

        assert!(matches(&row, Filter::eq("n", 5)));
        assert!(matches(&row, Filter::between("n", 1, 5.0)));
        assert!(!matches(&row, Filter::lt("n", 5)));
    }

    #[test]
    fn membership() {
        let row = doc! { "status": "open" };

        assert!(matches(&row, Filter::in_list("status", ["open", "closed"])));
        assert!(!matches(&row, Filter::not_in("status", ["open"])));
        assert!(matches(&row, Filter::not_in("status", ["done"])));
    }

    #[test]
    fn membership_needs_an_array() {
        let row = doc! { "status": "open" };
        let expr = Expr::field("status".into(), FieldOp::In, Bson::String("open".into()));

        assert!(RowEvaluator::new(&row).evaluate(&expr).is_err());
    }

    #[test]
    fn like_patterns() {
        assert!(like("hello world", "%world", false));
        assert!(like("hello world", "hello%", false));
        assert!(like("hello world", "%lo w%", false));
        assert!(like("hello", "h_llo", false));
        assert!(!like("hello", "h_lo", false));
        assert!(!like("Hello", "hello", false));
        assert!(like("Hello", "hello", true));
        assert!(like("", "%", false));
        assert!(like("abcabc", "%abc", false));
        assert!(!like("abcab", "%abc", false));
    }

    #[test]
    fn ilike_through_the_visitor() {
        let row = doc! { "title": "Write Report" };

        assert!(matches(&row, Filter::ilike("title", "%report")));
        assert!(!matches(&row, Filter::like("title", "%report")));
    }

    #[test]
    fn nulls_sort_first() {
        assert_eq!(sort_order(&Bson::Null, &Bson::Int32(1)), Ordering::Less);
        assert_eq!(sort_order(&Bson::Int32(2), &Bson::Int32(1)), Ordering::Greater);
        assert_eq!(sort_order(&Bson::String("a".into()), &Bson::Int32(1)), Ordering::Equal);
    }

    #[test]
    fn not_negates() {
        let row = doc! { "done": true };

        assert!(!matches(&row, Filter::eq("done", true).not()));
        assert!(matches(&row, Filter::or([Filter::eq("done", false), Filter::eq("done", true)])));
    }
}
