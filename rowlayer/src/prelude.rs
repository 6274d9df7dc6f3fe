//! Convenient re-exports of commonly used types from rowlayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use rowlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - Entity traits and column declarations
//! - Store backends, builders and the data store
//! - Query options, predicates and the filter mini-language
//! - Services, hooks, soft-delete policies and bulk results
//! - Error types

pub use async_trait::async_trait;

pub use rowlayer_core::{
    backend::{DynStoreBackend, StoreBackend, StoreBackendBuilder},
    batch::{BatchError, BatchInfo, BulkOperationResult},
    config::ServiceConfig,
    entity::{Column, ColumnKind, Entity},
    error::{ServiceError, ServiceResult},
    filter::{FilterCriteria, FilterExpression},
    hooks::{Mutation, MutationHooks, NoHooks},
    options::QueryOptions,
    page::{Pagination, PaginationResult},
    predicate::{Expr, FieldOp, Filter},
    query::{Join, JoinKind, Query, SortDirection},
    service::{EntityService, OperationStatus},
    soft_delete::{DeletedValue, SoftDeleteConfig},
    store::{DataStore, DynDataStore},
};
