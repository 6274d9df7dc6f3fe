//! Declarative query options.
//!
//! [`QueryOptions`] describe *what* a caller wants (a page, an ordering, a tenant, joined
//! relations...) without saying how a backend should do it. The
//! [`QueryComposer`](crate::compose::QueryComposer) turns them into a [`Query`](crate::query::Query).
//!
//! Options are immutable once built. To derive a variant, reopen them with
//! [`QueryOptions::to_builder`] and build a new value.
//!
//! ```ignore
//! use rowlayer::options::QueryOptions;
//! use rowlayer::query::SortDirection;
//!
//! let options = QueryOptions::builder()
//!     .page(2)
//!     .limit(25)
//!     .order_by("created_at", SortDirection::Desc)
//!     .workspace("workspace_id", "acme")
//!     .build();
//! ```

use std::{fmt, sync::Arc};

use bson::{Bson, Document};
use chrono::{DateTime, Utc};

use crate::{
    predicate::Expr,
    query::{Join, Sort, SortDirection},
};

/// Tenant/workspace scope: an equality filter applied to every query.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceScope {
    pub field: String,
    pub value: Bson,
}

/// A row-reshaping function applied to each result row before deserialization.
#[derive(Clone)]
pub struct RowParser(Arc<dyn Fn(Document) -> Document + Send + Sync>);

impl RowParser {
    pub fn new(parse: impl Fn(Document) -> Document + Send + Sync + 'static) -> Self {
        Self(Arc::new(parse))
    }

    pub fn apply(&self, row: Document) -> Document {
        (self.0)(row)
    }
}

impl fmt::Debug for RowParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowParser(..)")
    }
}

/// Options shared by every query operation.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// 1-based page number.
    pub page: Option<usize>,
    /// Requested page size, capped by the service's `max_limit`.
    pub limit: Option<usize>,
    /// Ordering terms, in tie-break order.
    pub order_by: Vec<Sort>,
    /// Include soft-deleted rows.
    pub with_deleted: bool,
    /// Only rows created strictly after this instant.
    pub cursor: Option<DateTime<Utc>>,
    /// Relations to join, in order.
    pub relations: Vec<Join>,
    /// Tenant/workspace scope.
    pub workspace: Option<WorkspaceScope>,
    /// Extra predicate, conjoined last.
    pub custom: Option<Expr>,
    /// Result reshaping hook.
    pub parse: Option<RowParser>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> QueryOptionsBuilder {
        QueryOptionsBuilder::new()
    }

    /// Reopens these options for building a variant.
    pub fn to_builder(&self) -> QueryOptionsBuilder {
        QueryOptionsBuilder { options: self.clone() }
    }

    /// Whether the caller asked for offset pagination.
    pub fn is_paginated(&self) -> bool {
        self.page.is_some() || self.limit.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptionsBuilder {
    options: QueryOptions,
}

impl QueryOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the 1-based page number.
    pub fn page(mut self, page: usize) -> Self {
        self.options.page = Some(page);
        self
    }

    /// Sets the requested page size.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Adds an ordering term.
    ///
    /// Setting a field that is already ordered replaces its direction and keeps its
    /// position in the tie-break order.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();

        match self.options.order_by.iter_mut().find(|sort| sort.field == field) {
            Some(existing) => existing.direction = direction,
            None => self.options.order_by.push(Sort::new(field, direction)),
        }
        self
    }

    pub fn with_deleted(mut self, with_deleted: bool) -> Self {
        self.options.with_deleted = with_deleted;
        self
    }

    pub fn cursor(mut self, cursor: DateTime<Utc>) -> Self {
        self.options.cursor = Some(cursor);
        self
    }

    /// Adds a relation join.
    pub fn relation(mut self, join: Join) -> Self {
        self.options.relations.push(join);
        self
    }

    pub fn workspace(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.options.workspace = Some(WorkspaceScope {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Sets the custom predicate. Calling it again conjoins with the previous one.
    pub fn custom(mut self, expr: Expr) -> Self {
        self.options.custom = Some(Expr::conjoin(self.options.custom.take(), expr));
        self
    }

    pub fn parse(mut self, parse: impl Fn(Document) -> Document + Send + Sync + 'static) -> Self {
        self.options.parse = Some(RowParser::new(parse));
        self
    }

    pub fn build(self) -> QueryOptions {
        self.options
    }
}
