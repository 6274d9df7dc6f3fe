//! The backend query object.
//!
//! A [`Query`] is what the service hands to a [`StoreBackend`](crate::backend::StoreBackend):
//! a filter predicate, relation joins, ordering terms and an optional limit/offset.
//! Every combinator consumes the query and returns a new value, so a query is never
//! mutated in place once built.
//!
//! ```ignore
//! use rowlayer::query::{Query, Join, SortDirection};
//! use rowlayer::predicate::Filter;
//!
//! let query = Query::new()
//!     .filter(Filter::eq("status", "active"))
//!     .join(Join::left("profiles", "profile", "id", "user_id"))
//!     .order_by("created_at", SortDirection::Desc)
//!     .limit(10)
//!     .offset(0);
//! ```

use serde::{Deserialize, Serialize};

use crate::predicate::Expr;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// A single ordering term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction }
    }
}

/// Kind of relation join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Left,
    Inner,
    Right,
}

/// A relation join descriptor.
///
/// Joins are equi-joins: `local_field = alias.foreign_field`. `local_field` may itself
/// reference an earlier join (`alias.column`). Joined columns are exposed to filters and
/// ordering as `alias.column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    /// Table to join.
    pub table: String,
    /// Name the joined row is exposed under.
    pub alias: String,
    /// Field on the rows joined so far.
    pub local_field: String,
    /// Field on the joined table.
    pub foreign_field: String,
}

impl Join {
    pub fn new(
        kind: JoinKind,
        table: impl Into<String>,
        alias: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            alias: alias.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
        }
    }

    pub fn left(
        table: impl Into<String>,
        alias: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self::new(JoinKind::Left, table, alias, local_field, foreign_field)
    }

    pub fn inner(
        table: impl Into<String>,
        alias: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self::new(JoinKind::Inner, table, alias, local_field, foreign_field)
    }

    pub fn right(
        table: impl Into<String>,
        alias: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self::new(JoinKind::Right, table, alias, local_field, foreign_field)
    }
}

/// A composed backend query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Predicate rows must satisfy.
    pub filter: Option<Expr>,
    /// Joins, applied in order.
    pub joins: Vec<Join>,
    /// Ordering terms, earlier terms take precedence.
    pub sort: Vec<Sort>,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
    /// Number of rows to skip.
    pub offset: Option<usize>,
}

impl Query {
    /// Creates an empty query: no filter, no joins, unbounded.
    pub fn new() -> Self {
        Query::default()
    }

    /// Conjoins `expr` with the current filter.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(Expr::conjoin(self.filter.take(), expr));
        self
    }

    /// Conjoins `expr` with the current filter when present.
    pub fn filter_opt(self, expr: Option<Expr>) -> Self {
        match expr {
            Some(expr) => self.filter(expr),
            None => self,
        }
    }

    /// Appends a join.
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Appends an ordering term.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort::new(field, direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Filter;

    #[test]
    fn filter_conjoins_instead_of_replacing() {
        let query = Query::new()
            .filter(Filter::eq("a", 1))
            .filter(Filter::eq("b", 2));

        assert_eq!(
            query.filter,
            Some(Expr::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)]))
        );
    }

    #[test]
    fn combinators_leave_the_original_untouched() {
        let base = Query::new().filter(Filter::eq("a", 1));
        let derived = base.clone().limit(5).order_by("a", SortDirection::Asc);

        assert_eq!(base.limit, None);
        assert!(base.sort.is_empty());
        assert_eq!(derived.limit, Some(5));
    }
}
