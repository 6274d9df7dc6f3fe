//! In-memory storage implementation.
//!
//! Tables are insertion-ordered vectors of rows behind a single async-safe read-write lock.
//! Every backend call takes the lock once, so each call is atomic with respect to the others.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use tracing::debug;

use rowlayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    entity::field_value,
    error::{ServiceError, ServiceResult},
    predicate::Expr,
    query::{Join, JoinKind, Query, SortDirection},
};

use crate::evaluator::{RowEvaluator, sort_order, values_equal};

#[derive(Debug, Default, Clone)]
struct Table {
    rows: Vec<Document>,
    indexes: Vec<String>,
    unique: Vec<String>,
}

impl Table {
    /// Checks that `candidates` can sit next to the rows at positions not in `replacing`
    /// without breaking a unique index.
    fn check_unique(
        &self,
        name: &str,
        candidates: &[Document],
        replacing: &[usize],
    ) -> ServiceResult<()> {
        for field in &self.unique {
            let mut seen: Vec<&Bson> = self
                .rows
                .iter()
                .enumerate()
                .filter(|(position, _)| !replacing.contains(position))
                .map(|(_, row)| field_value(row, field))
                .filter(|value| **value != Bson::Null)
                .collect();

            for candidate in candidates {
                let value = field_value(candidate, field);
                if *value == Bson::Null {
                    continue;
                }
                if seen.iter().any(|existing| values_equal(existing, value)) {
                    return Err(ServiceError::database(format!(
                        "duplicate value {value} for unique field '{field}' in '{name}'"
                    )));
                }
                seen.push(value);
            }
        }

        Ok(())
    }
}

type TableMap = HashMap<String, Table>;

/// Thread-safe in-memory storage backend.
///
/// `MemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones share
/// the same underlying tables.
///
/// # Behaviour
///
/// - Inserting into a missing table creates it; selecting from one returns no rows.
/// - Joins are nested loops. Joined columns are returned flat, as `alias.column` keys.
/// - `LIKE` follows SQL: `%` matches any run, `_` a single character.
/// - Unique indexes are enforced per call: a violating insert or update writes nothing.
///
/// # Example
///
/// ```ignore
/// use rowlayer_memory::MemoryStore;
/// use rowlayer::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     store.insert("users", vec![doc! { "id": "u1", "name": "Alice" }]).await?;
///     let count = store.count("users", Default::default()).await?;
///     assert_eq!(count, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryStore {
    tables: Arc<RwLock<TableMap>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(TableMap::new())),
        }
    }

    /// Creates a builder for a store with pre-declared tables and indexes.
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }
}

/// Joins, filters and returns the rows of `table`, unordered and unpaginated.
fn matching_rows(tables: &TableMap, table: &str, query: &Query) -> ServiceResult<Vec<Document>> {
    let mut rows = match tables.get(table) {
        Some(table) => table.rows.clone(),
        None => return Ok(vec![]),
    };

    for join in &query.joins {
        let joined = tables
            .get(&join.table)
            .map(|table| table.rows.as_slice())
            .unwrap_or_default();
        rows = join_rows(rows, joined, join);
    }

    match &query.filter {
        Some(filter) => RowEvaluator::filter_rows(rows, filter),
        None => Ok(rows),
    }
}

fn join_rows(left: Vec<Document>, right: &[Document], join: &Join) -> Vec<Document> {
    let related = |row: &Document, other: &Document| {
        let local = field_value(row, &join.local_field);
        *local != Bson::Null && values_equal(local, field_value(other, &join.foreign_field))
    };
    let merge = |base: Document, other: &Document| {
        let mut merged = base;
        for (column, value) in other {
            merged.insert(format!("{}.{column}", join.alias), value.clone());
        }
        merged
    };

    match join.kind {
        JoinKind::Left | JoinKind::Inner => {
            let mut joined = Vec::with_capacity(left.len());

            for row in left {
                let mut found = right.iter().filter(|other| related(&row, *other)).peekable();

                if found.peek().is_none() {
                    if join.kind == JoinKind::Left {
                        joined.push(row);
                    }
                    continue;
                }
                for other in found {
                    joined.push(merge(row.clone(), other));
                }
            }

            joined
        }
        JoinKind::Right => {
            let mut joined = Vec::with_capacity(right.len());

            for other in right {
                let paired = left
                    .iter()
                    .filter(|row| related(*row, other))
                    .map(|row| merge(row.clone(), other))
                    .collect::<Vec<_>>();

                if paired.is_empty() {
                    joined.push(merge(Document::new(), other));
                } else {
                    joined.extend(paired);
                }
            }

            joined
        }
    }
}

fn sort_rows(rows: &mut [Document], query: &Query) {
    if query.sort.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for sort in &query.sort {
            let ordering = sort_order(field_value(a, &sort.field), field_value(b, &sort.field));
            let ordering = match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}

fn matches(row: &Document, filter: &Expr) -> ServiceResult<bool> {
    RowEvaluator::new(row).evaluate(filter)
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>> {
        let tables = self.tables.read().await;
        let mut rows = matching_rows(&tables, table, &query)?;

        sort_rows(&mut rows, &query);
        debug!(table, rows = rows.len(), "memory select");

        Ok(rows
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64> {
        let tables = self.tables.read().await;

        Ok(matching_rows(&tables, table, &query)?.len() as u64)
    }

    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>> {
        let mut tables = self.tables.write().await;
        let target = tables.entry(table.to_string()).or_default();

        target.check_unique(table, &rows, &[])?;
        target.rows.extend(rows.iter().cloned());
        debug!(table, rows = rows.len(), "memory insert");

        Ok(rows)
    }

    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>> {
        let mut tables = self.tables.write().await;
        let Some(target) = tables.get_mut(table) else {
            return Ok(vec![]);
        };

        let mut positions = Vec::new();
        let mut updated = Vec::new();
        for (position, row) in target.rows.iter().enumerate() {
            if matches(row, &filter)? {
                let mut row = row.clone();
                for (column, value) in &changes {
                    row.insert(column.clone(), value.clone());
                }
                positions.push(position);
                updated.push(row);
            }
        }

        target.check_unique(table, &updated, &positions)?;
        for (position, row) in positions.iter().zip(&updated) {
            target.rows[*position] = row.clone();
        }
        debug!(table, rows = updated.len(), "memory update");

        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>> {
        let mut tables = self.tables.write().await;
        let Some(target) = tables.get_mut(table) else {
            return Ok(vec![]);
        };

        let mut kept = Vec::with_capacity(target.rows.len());
        let mut removed = Vec::new();
        for row in target.rows.drain(..) {
            if matches(&row, &filter)? {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }
        target.rows = kept;
        debug!(table, rows = removed.len(), "memory delete");

        Ok(removed)
    }

    async fn create_table(&self, name: &str) -> ServiceResult<()> {
        self.tables
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_table(&self, name: &str) -> ServiceResult<()> {
        let mut tables = self.tables.write().await;

        if tables.remove(name).is_none() {
            return Err(ServiceError::not_found("table", name));
        }

        Ok(())
    }

    async fn list_tables(&self) -> ServiceResult<Vec<String>> {
        let mut names = self
            .tables
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()> {
        let mut tables = self.tables.write().await;
        let target = tables.entry(table.to_string()).or_default();

        if unique && !target.unique.iter().any(|existing| existing == field) {
            let staged = Table {
                unique: vec![field.to_string()],
                ..Table::default()
            };
            staged.check_unique(table, &target.rows, &[])?;
            target.unique.push(field.to_string());
        }
        if !target.indexes.iter().any(|existing| existing == field) {
            target.indexes.push(field.to_string());
        }

        Ok(())
    }

    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()> {
        let mut tables = self.tables.write().await;

        if let Some(target) = tables.get_mut(table) {
            target.indexes.retain(|existing| existing != field);
            target.unique.retain(|existing| existing != field);
        }

        Ok(())
    }
}

/// Builder for [`MemoryStore`] instances with tables and indexes declared up front.
///
/// # Example
///
/// ```ignore
/// use rowlayer_memory::MemoryStore;
/// use rowlayer::backend::StoreBackendBuilder;
///
/// let store = MemoryStore::builder()
///     .table("users")
///     .unique("users", "email")
///     .build()
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryStoreBuilder {
    tables: Vec<String>,
    unique: Vec<(String, String)>,
}

impl MemoryStoreBuilder {
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.tables.push(name.into());
        self
    }

    /// Declares a unique index on `table.field`.
    pub fn unique(mut self, table: impl Into<String>, field: impl Into<String>) -> Self {
        self.unique.push((table.into(), field.into()));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MemoryStoreBuilder {
    type Backend = MemoryStore;

    async fn build(self) -> ServiceResult<Self::Backend> {
        let store = MemoryStore::new();

        for table in &self.tables {
            store.create_table(table).await?;
        }
        for (table, field) in &self.unique {
            store.add_index(table, field, true).await?;
        }

        Ok(store)
    }
}
