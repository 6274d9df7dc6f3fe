//! Main rowlayer crate providing a unified interface for relational-style data access.
//!
//! This crate is the primary entry point for users of rowlayer. It re-exports the core types
//! and functionality from the sub-crates and provides convenient access to the different
//! storage backends.
//!
//! # Features
//!
//! - **Typed entities** - Declare a column registry once, read and write rows as Serde types
//! - **Declarative queries** - Pagination, ordering, tenant scoping and relation joins as options
//! - **Filter mini-language** - `">=%1&<=%2"`, `"%1|%2"`, `"~%1"` and friends
//! - **Soft deletes** - Boolean, timestamp or arbitrary marker fields with restore
//! - **Batch mutations** - Chunked bulk writes with per-item failure reports
//! - **Multiple backends** - In-memory and MongoDB, behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use rowlayer::{prelude::*, memory::MemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Task {
//!     pub id: String,
//!     pub title: String,
//!     pub deleted_at: Option<bson::DateTime>,
//!     pub created_at: bson::DateTime,
//!     pub updated_at: bson::DateTime,
//! }
//!
//! #[derive(Debug, Clone, Serialize)]
//! pub struct NewTask {
//!     pub id: String,
//!     pub title: String,
//! }
//!
//! impl Entity for Task {
//!     type Insert = NewTask;
//!
//!     fn table_name() -> &'static str { "tasks" }
//!
//!     fn columns() -> Vec<Column> {
//!         vec![
//!             Column::text("id"),
//!             Column::text("title"),
//!             Column::timestamp("deleted_at"),
//!             Column::timestamp("created_at"),
//!             Column::timestamp("updated_at"),
//!         ]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ServiceResult<()> {
//!     let store = DataStore::new(MemoryStore::builder().build().await?);
//!     let tasks = store.service::<Task>(
//!         ServiceConfig::builder()
//!             .soft(SoftDeleteConfig::timestamp("deleted_at"))
//!             .build(),
//!     )?;
//!
//!     tasks.create(NewTask { id: "t1".into(), title: "Write report".into() }, &NoHooks).await?;
//!
//!     let found = tasks
//!         .search(
//!             &FilterCriteria::new().field("title", FilterExpression::new("@*%1*").value("report")),
//!             &QueryOptions::new(),
//!         )
//!         .await?;
//!     println!("Found tasks: {:?}", found);
//!
//!     tasks.delete("t1", &NoHooks).await?;
//!     tasks.restore("t1", &NoHooks).await?;
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! A typed `DataStore` can be converted into a [`DynDataStore`](store::DynDataStore) with
//! `into_dyn`, for when the backend is chosen at runtime. Services built from it work the
//! same way.
//!
//! ```ignore
//! let store = DataStore::new(MemoryStore::new()).into_dyn();
//! let tasks = store.service::<Task>(ServiceConfig::default())?;
//!
//! assert!(store.downcast_backend::<MemoryStore>().is_some());
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use rowlayer_core::{
    backend, batch, compose, config, entity, error, filter, hooks, options, page, predicate,
    query, service, soft_delete, store,
};

// Re-export BSON and chrono types for convenience
pub use bson;
pub use chrono;

/// In-memory storage backend implementations.
pub mod memory {
    pub use rowlayer_memory::{MemoryStore, MemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use rowlayer_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
