//! Storage backend abstraction.
//!
//! This module defines the traits that abstract over different query-builder backends,
//! allowing the service layer to run unchanged on an in-memory store, MongoDB, or anything
//! else that can evaluate a [`Query`].
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for row selection, counting,
//! insertion, predicate-driven update and delete, and table administration. Rows are
//! [`bson::Document`]s keyed by column name. Implementations are required to be thread-safe
//! (`Send + Sync`) and support concurrent access.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: A trait for dynamic dispatch over backend implementations
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use rowlayer::backend::StoreBackend;
//! use rowlayer::predicate::Filter;
//! use rowlayer::query::Query;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert("users", vec![doc! { "id": "u1", "name": "Alice" }]).await?;
//! let rows = backend
//!     .select("users", Query::new().filter(Filter::eq("name", "Alice")))
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{any::Any, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::Document;

use crate::{error::ServiceResult, predicate::Expr, query::Query};

/// Abstract interface for row storage backends.
///
/// # Row Shape
///
/// Rows are flat documents keyed by column name. When a [`Query`] carries joins, each joined
/// row's columns are exposed as `alias.column`: a backend may return them either as flat
/// `alias.column` keys or nested under an `alias` sub-document.
///
/// # Error Handling
///
/// Operations return [`ServiceResult<T>`](crate::error::ServiceResult). Driver failures are
/// reported as [`ServiceError::Database`](crate::error::ServiceError::Database) with the
/// driver error as source.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the rows of `table` matching `query`, joined, ordered and paginated as the
    /// query describes.
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>>;

    /// Counts the rows of `table` matching `query`'s filter and joins.
    ///
    /// Ordering, limit and offset are ignored.
    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64>;

    /// Inserts rows and returns them as stored.
    ///
    /// The call is atomic with respect to constraint violations: if any row is rejected,
    /// none are written.
    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>>;

    /// Sets `changes` on every row matching `filter` and returns the updated rows.
    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>>;

    /// Removes every row matching `filter` and returns the removed rows.
    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>>;

    /// Creates an empty table. Creating an existing table is a no-op.
    async fn create_table(&self, name: &str) -> ServiceResult<()>;

    /// Drops a table and all its rows.
    async fn drop_table(&self, name: &str) -> ServiceResult<()>;

    /// Lists the names of all tables in the store.
    async fn list_tables(&self) -> ServiceResult<Vec<String>>;

    /// Creates an index on a field, optionally enforcing uniqueness.
    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()>;

    /// Removes the index on a field.
    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> ServiceResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>> {
        StoreBackend::select(&**self, table, query).await
    }

    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64> {
        StoreBackend::count(&**self, table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>> {
        StoreBackend::insert(&**self, table, rows).await
    }

    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>> {
        StoreBackend::update(&**self, table, filter, changes).await
    }

    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>> {
        StoreBackend::delete(&**self, table, filter).await
    }

    async fn create_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::create_table(&**self, name).await
    }

    async fn drop_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::drop_table(&**self, name).await
    }

    async fn list_tables(&self) -> ServiceResult<Vec<String>> {
        StoreBackend::list_tables(&**self).await
    }

    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()> {
        StoreBackend::add_index(&**self, table, field, unique).await
    }

    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()> {
        StoreBackend::drop_index(&**self, table, field).await
    }
}

#[async_trait]
impl<B> StoreBackend for &mut B
where
    B: StoreBackend,
{
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>> {
        StoreBackend::select(&**self, table, query).await
    }

    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64> {
        StoreBackend::count(&**self, table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>> {
        StoreBackend::insert(&**self, table, rows).await
    }

    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>> {
        StoreBackend::update(&**self, table, filter, changes).await
    }

    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>> {
        StoreBackend::delete(&**self, table, filter).await
    }

    async fn create_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::create_table(&**self, name).await
    }

    async fn drop_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::drop_table(&**self, name).await
    }

    async fn list_tables(&self) -> ServiceResult<Vec<String>> {
        StoreBackend::list_tables(&**self).await
    }

    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()> {
        StoreBackend::add_index(&**self, table, field, unique).await
    }

    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()> {
        StoreBackend::drop_index(&**self, table, field).await
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend,
{
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>> {
        StoreBackend::select(&**self, table, query).await
    }

    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64> {
        StoreBackend::count(&**self, table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>> {
        StoreBackend::insert(&**self, table, rows).await
    }

    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>> {
        StoreBackend::update(&**self, table, filter, changes).await
    }

    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>> {
        StoreBackend::delete(&**self, table, filter).await
    }

    async fn create_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::create_table(&**self, name).await
    }

    async fn drop_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::drop_table(&**self, name).await
    }

    async fn list_tables(&self) -> ServiceResult<Vec<String>> {
        StoreBackend::list_tables(&**self).await
    }

    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()> {
        StoreBackend::add_index(&**self, table, field, unique).await
    }

    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()> {
        StoreBackend::drop_index(&**self, table, field).await
    }
}

/// Object-safe counterpart of [`StoreBackend`], for backends chosen at runtime.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>>;
    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64>;
    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>>;
    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>>;
    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>>;
    async fn create_table(&self, name: &str) -> ServiceResult<()>;
    async fn drop_table(&self, name: &str) -> ServiceResult<()>;
    async fn list_tables(&self) -> ServiceResult<Vec<String>>;
    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()>;
    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()>;
    async fn shutdown_boxed(self: Box<Self>) -> ServiceResult<()>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

#[async_trait]
impl<B: StoreBackend + Send + Sync + 'static> DynStoreBackend for B {
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>> {
        StoreBackend::select(self, table, query).await
    }

    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64> {
        StoreBackend::count(self, table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>> {
        StoreBackend::insert(self, table, rows).await
    }

    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>> {
        StoreBackend::update(self, table, filter, changes).await
    }

    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>> {
        StoreBackend::delete(self, table, filter).await
    }

    async fn create_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::create_table(self, name).await
    }

    async fn drop_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::drop_table(self, name).await
    }

    async fn list_tables(&self) -> ServiceResult<Vec<String>> {
        StoreBackend::list_tables(self).await
    }

    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()> {
        StoreBackend::add_index(self, table, field, unique).await
    }

    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()> {
        StoreBackend::drop_index(self, table, field).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> ServiceResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A boxed runtime-selected backend is itself a [`StoreBackend`].
#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>> {
        DynStoreBackend::select(&**self, table, query).await
    }

    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64> {
        DynStoreBackend::count(&**self, table, query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>> {
        DynStoreBackend::insert(&**self, table, rows).await
    }

    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>> {
        DynStoreBackend::update(&**self, table, filter, changes).await
    }

    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>> {
        DynStoreBackend::delete(&**self, table, filter).await
    }

    async fn create_table(&self, name: &str) -> ServiceResult<()> {
        DynStoreBackend::create_table(&**self, name).await
    }

    async fn drop_table(&self, name: &str) -> ServiceResult<()> {
        DynStoreBackend::drop_table(&**self, name).await
    }

    async fn list_tables(&self) -> ServiceResult<Vec<String>> {
        DynStoreBackend::list_tables(&**self).await
    }

    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()> {
        DynStoreBackend::add_index(&**self, table, field, unique).await
    }

    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()> {
        DynStoreBackend::drop_index(&**self, table, field).await
    }

    async fn shutdown(self) -> ServiceResult<()> {
        DynStoreBackend::shutdown_boxed(self).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> ServiceResult<Self::Backend>;
}
