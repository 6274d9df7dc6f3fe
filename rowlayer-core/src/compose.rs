//! Query composition pipeline.
//!
//! [`QueryComposer::apply`] turns [`QueryOptions`] into a [`Query`] through a fixed sequence
//! of independent transforms:
//!
//! 1. soft-delete scope
//! 2. workspace scope
//! 3. relation joins
//! 4. ordering
//! 5. offset pagination
//! 6. cursor
//! 7. custom predicate
//!
//! The order is load-bearing: later steps assume the row shape produced by earlier ones
//! (ordering may reference joined `alias.column` fields, for instance). Each step takes the
//! query by value and returns a new one.

use bson::{Bson, DateTime};

use crate::{
    config::ServiceConfig,
    entity::EntityDescriptor,
    options::QueryOptions,
    predicate::Filter,
    query::Query,
    soft_delete::SoftDeletePolicy,
};

/// Applies [`QueryOptions`] to queries for one entity.
#[derive(Debug, Clone, Copy)]
pub struct QueryComposer<'a> {
    entity: &'a EntityDescriptor,
    config: &'a ServiceConfig,
    soft: Option<&'a SoftDeletePolicy>,
}

impl<'a> QueryComposer<'a> {
    pub fn new(
        entity: &'a EntityDescriptor,
        config: &'a ServiceConfig,
        soft: Option<&'a SoftDeletePolicy>,
    ) -> Self {
        Self { entity, config, soft }
    }

    /// Runs the full pipeline.
    pub fn apply(&self, query: Query, options: &QueryOptions) -> Query {
        let query = self.scope_soft_delete(query, options);
        let query = self.scope_workspace(query, options);
        let query = self.join_relations(query, options);
        let query = self.order(query, options);
        let query = self.paginate(query, options);
        let query = self.after_cursor(query, options);

        self.custom_predicate(query, options)
    }

    /// The query used to count rows for pagination metadata.
    ///
    /// Shares the scoping, joins and custom predicate of [`apply`](Self::apply) but never
    /// orders, paginates or applies the cursor.
    pub fn count_query(&self, query: Query, options: &QueryOptions) -> Query {
        let query = self.scope_soft_delete(query, options);
        let query = self.scope_workspace(query, options);
        let query = self.join_relations(query, options);

        self.custom_predicate(query, options)
    }

    pub fn scope_soft_delete(&self, query: Query, options: &QueryOptions) -> Query {
        match self.soft {
            Some(policy) if !options.with_deleted => query.filter(policy.active_predicate()),
            _ => query,
        }
    }

    pub fn scope_workspace(&self, query: Query, options: &QueryOptions) -> Query {
        match &options.workspace {
            Some(scope) => query.filter(Filter::eq(scope.field.clone(), scope.value.clone())),
            None => query,
        }
    }

    pub fn join_relations(&self, query: Query, options: &QueryOptions) -> Query {
        options
            .relations
            .iter()
            .cloned()
            .fold(query, Query::join)
    }

    pub fn order(&self, query: Query, options: &QueryOptions) -> Query {
        options
            .order_by
            .iter()
            .fold(query, |query, sort| query.order_by(sort.field.clone(), sort.direction))
    }

    /// Applies `LIMIT`/`OFFSET` only when the caller asked for a page or a limit.
    pub fn paginate(&self, query: Query, options: &QueryOptions) -> Query {
        if !options.is_paginated() {
            return query;
        }

        let page_size = self.config.page_size(options.limit);
        let offset = options.page.unwrap_or(1).saturating_sub(1).saturating_mul(page_size);

        query.limit(page_size).offset(offset)
    }

    /// Restricts to rows created strictly after the cursor.
    pub fn after_cursor(&self, query: Query, options: &QueryOptions) -> Query {
        match options.cursor {
            Some(cursor) => query.filter(Filter::gt(
                self.entity.created_field(),
                Bson::DateTime(DateTime::from_chrono(cursor)),
            )),
            None => query,
        }
    }

    pub fn custom_predicate(&self, query: Query, options: &QueryOptions) -> Query {
        query.filter_opt(options.custom.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        entity::fixtures::Task,
        predicate::Expr,
        query::{Join, Sort, SortDirection},
        soft_delete::SoftDeleteConfig,
    };

    struct Fixture {
        entity: EntityDescriptor,
        config: ServiceConfig,
        soft: SoftDeletePolicy,
    }

    impl Fixture {
        fn new() -> Self {
            let entity = EntityDescriptor::resolve::<Task>(None).unwrap();
            let soft = SoftDeletePolicy::bind(SoftDeleteConfig::timestamp("archived_at"), &entity)
                .unwrap();
            let config = ServiceConfig::builder().default_limit(10).max_limit(50).build();

            Self { entity, config, soft }
        }

        fn composer(&self) -> QueryComposer<'_> {
            QueryComposer::new(&self.entity, &self.config, Some(&self.soft))
        }
    }

    #[test]
    fn empty_options_only_scope_soft_deletes() {
        let fixture = Fixture::new();
        let query = fixture.composer().apply(Query::new(), &QueryOptions::new());

        assert_eq!(query.filter, Some(Filter::is_null("archived_at")));
        assert_eq!(query.limit, None);
        assert_eq!(query.offset, None);
        assert!(query.sort.is_empty());
    }

    #[test]
    fn with_deleted_skips_the_soft_delete_scope() {
        let fixture = Fixture::new();
        let options = QueryOptions::builder().with_deleted(true).build();

        assert_eq!(fixture.composer().apply(Query::new(), &options).filter, None);
    }

    #[test]
    fn no_policy_means_no_scope() {
        let fixture = Fixture::new();
        let composer = QueryComposer::new(&fixture.entity, &fixture.config, None);

        assert_eq!(composer.apply(Query::new(), &QueryOptions::new()).filter, None);
    }

    #[test]
    fn pagination_offsets_by_whole_pages() {
        let fixture = Fixture::new();
        let options = QueryOptions::builder().page(3).limit(20).build();
        let query = fixture.composer().apply(Query::new(), &options);

        assert_eq!(query.limit, Some(20));
        assert_eq!(query.offset, Some(40));
    }

    #[test]
    fn huge_page_numbers_saturate_the_offset() {
        let fixture = Fixture::new();
        let options = QueryOptions::builder().page(usize::MAX).limit(10).build();
        let query = fixture.composer().apply(Query::new(), &options);

        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(usize::MAX));
    }

    #[test]
    fn pagination_falls_back_to_default_and_caps_at_max() {
        let fixture = Fixture::new();

        let query = fixture
            .composer()
            .apply(Query::new(), &QueryOptions::builder().page(2).build());
        assert_eq!((query.limit, query.offset), (Some(10), Some(10)));

        let query = fixture
            .composer()
            .apply(Query::new(), &QueryOptions::builder().limit(5000).build());
        assert_eq!((query.limit, query.offset), (Some(50), Some(0)));
    }

    #[test]
    fn page_zero_is_treated_as_the_first_page() {
        let fixture = Fixture::new();
        let query = fixture
            .composer()
            .apply(Query::new(), &QueryOptions::builder().page(0).limit(5).build());

        assert_eq!(query.offset, Some(0));
    }

    #[test]
    fn ordering_keeps_insertion_order() {
        let fixture = Fixture::new();
        let options = QueryOptions::builder()
            .order_by("title", SortDirection::Asc)
            .order_by("created_at", SortDirection::Desc)
            .build();
        let query = fixture.composer().apply(Query::new(), &options);

        assert_eq!(
            query.sort,
            vec![
                Sort::new("title", SortDirection::Asc),
                Sort::new("created_at", SortDirection::Desc),
            ]
        );
    }

    #[test]
    fn predicates_are_injected_in_pipeline_order() {
        let fixture = Fixture::new();
        let cursor = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let options = QueryOptions::builder()
            .workspace("workspace", "acme")
            .cursor(cursor)
            .custom(Filter::eq("done", false))
            .relation(Join::left("users", "owner", "owner_id", "id"))
            .build();
        let query = fixture.composer().apply(Query::new(), &options);

        assert_eq!(
            query.filter,
            Some(Expr::And(vec![
                Filter::is_null("archived_at"),
                Filter::eq("workspace", "acme"),
                Filter::gt("created_at", Bson::DateTime(DateTime::from_chrono(cursor))),
                Filter::eq("done", false),
            ]))
        );
        assert_eq!(query.joins, vec![Join::left("users", "owner", "owner_id", "id")]);
    }

    #[test]
    fn cursor_composes_with_pagination() {
        let fixture = Fixture::new();
        let cursor = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let options = QueryOptions::builder().cursor(cursor).page(2).limit(5).build();
        let query = fixture.composer().apply(Query::new(), &options);

        assert_eq!(query.offset, Some(5));
        assert!(matches!(query.filter, Some(Expr::And(ref parts)) if parts.len() == 2));
    }

    #[test]
    fn count_query_shares_scope_but_not_paging() {
        let fixture = Fixture::new();
        let cursor = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let options = QueryOptions::builder()
            .workspace("workspace", "acme")
            .order_by("title", SortDirection::Asc)
            .page(2)
            .limit(5)
            .cursor(cursor)
            .custom(Filter::eq("done", true))
            .build();
        let query = fixture.composer().count_query(Query::new(), &options);

        assert_eq!(
            query.filter,
            Some(Expr::And(vec![
                Filter::is_null("archived_at"),
                Filter::eq("workspace", "acme"),
                Filter::eq("done", true),
            ]))
        );
        assert!(query.sort.is_empty());
        assert_eq!((query.limit, query.offset), (None, None));
    }

    #[test]
    fn apply_does_not_touch_the_input_query() {
        let fixture = Fixture::new();
        let base = Query::new().filter(Filter::eq("title", "x"));
        let composed = fixture
            .composer()
            .apply(base.clone(), &QueryOptions::builder().limit(1).build());

        assert_eq!(base.limit, None);
        assert_ne!(base, composed);
    }
}
