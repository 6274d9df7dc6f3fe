//! Backend-neutral predicate model.
//!
//! Predicates are plain data. Each backend walks them with a [`QueryVisitor`] and produces
//! its native representation (an in-memory evaluator, a MongoDB filter document, ...).
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides static constructors:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`, `between`
//! - Membership: `in_list`, `not_in`
//! - Pattern: `like`, `ilike` (`%` matches any run, `_` a single character)
//! - Null checks: `is_null`, `is_not_null`
//! - Logical: `and`, `or`
//!
//! ```ignore
//! use rowlayer::predicate::Filter;
//!
//! let expr = Filter::eq("status", "active")
//!     .and(Filter::between("age", 18, 65));
//! ```

use bson::Bson;

use crate::error::ServiceError;

/// Wildcard token understood by [`FieldOp::Like`] and [`FieldOp::ILike`].
pub const WILDCARD: char = '%';

/// Field comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to.
    Eq,
    /// Not equal to. A null or missing field is not equal to any non-null value.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field value is one of the values in an array.
    In,
    /// Field value is none of the values in an array.
    NotIn,
    /// Case-sensitive pattern match.
    Like,
    /// Case-insensitive pattern match.
    ILike,
}

impl FieldOp {
    /// The textual operator token used by the filter mini-language, if any.
    pub fn token(&self) -> Option<&'static str> {
        match self {
            FieldOp::Eq => Some("="),
            FieldOp::Ne => Some("<>"),
            FieldOp::Gt => Some(">"),
            FieldOp::Gte => Some(">="),
            FieldOp::Lt => Some("<"),
            FieldOp::Lte => Some("<="),
            _ => None,
        }
    }
}

/// A boolean condition over one or more columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// All sub-expressions must match.
    And(Vec<Expr>),
    /// Any sub-expression must match.
    Or(Vec<Expr>),
    /// Inverts the sub-expression.
    Not(Box<Expr>),
    /// `field IS NULL` when the flag is true, `field IS NOT NULL` otherwise.
    /// Missing fields count as null.
    Null(String, bool),
    /// Field comparison expression.
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Conjoins an optional existing predicate with a new one.
    pub fn conjoin(existing: Option<Expr>, other: Expr) -> Expr {
        match existing {
            Some(expr) => expr.and(other),
            None => other,
        }
    }
}

/// Static constructors for [`Expr`] values.
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Inclusive range: `low <= field <= high`.
    pub fn between(
        field: impl Into<String>,
        low: impl Into<Bson>,
        high: impl Into<Bson>,
    ) -> Expr {
        let field = field.into();

        Expr::And(vec![
            Expr::field(field.clone(), FieldOp::Gte, low.into()),
            Expr::field(field, FieldOp::Lte, high.into()),
        ])
    }

    /// Matches rows whose field equals any of `values`.
    pub fn in_list<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::In,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches rows whose field equals none of `values`.
    pub fn not_in<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NotIn,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Case-sensitive pattern match using `%` and `_` wildcards.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Expr {
        Expr::field(field.into(), FieldOp::Like, Bson::String(pattern.into()))
    }

    /// Case-insensitive pattern match using `%` and `_` wildcards.
    pub fn ilike(field: impl Into<String>, pattern: impl Into<String>) -> Expr {
        Expr::field(field.into(), FieldOp::ILike, Bson::String(pattern.into()))
    }

    pub fn is_null(field: impl Into<String>) -> Expr {
        Expr::Null(field.into(), true)
    }

    pub fn is_not_null(field: impl Into<String>) -> Expr {
        Expr::Null(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

/// Walks an [`Expr`] tree, producing a backend-specific output.
pub trait QueryVisitor {
    type Output;
    type Error: Into<ServiceError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_null(&mut self, field: &str, is_null: bool) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Null(field, is_null) => self.visit_null(field, *is_null),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_flattens_into_existing_conjunction() {
        let expr = Filter::eq("a", 1).and(Filter::eq("b", 2)).and(Filter::eq("c", 3));

        match expr {
            Expr::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn conjoin_without_existing_returns_new_predicate() {
        let expr = Expr::conjoin(None, Filter::is_null("deleted_at"));

        assert_eq!(expr, Expr::Null("deleted_at".into(), true));
    }

    #[test]
    fn between_is_inclusive_conjunction() {
        assert_eq!(
            Filter::between("age", 10, 20),
            Expr::And(vec![
                Expr::field("age".into(), FieldOp::Gte, Bson::Int32(10)),
                Expr::field("age".into(), FieldOp::Lte, Bson::Int32(20)),
            ])
        );
    }
}
