//! A generic data-access layer over query-builder backends.
//!
//! This crate is the core of the rowlayer project and provides:
//!
//! - **Entities** ([`entity`]) - Typed column registries and row conversion
//! - **Predicates** ([`predicate`]) - Backend-neutral filter expressions and the visitor backends translate them with
//! - **Filter mini-language** ([`filter`]) - Parses strings like `">=%1&<=%2"` into predicates
//! - **Query options and composition** ([`options`], [`compose`], [`query`]) - Declarative options turned into backend queries
//! - **Soft deletes** ([`soft_delete`]) - Marker-field delete and restore policies
//! - **Batch mutations** ([`batch`]) - Chunked bulk operations with per-item failure tracking
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage backends
//! - **Services** ([`service`], [`store`]) - The per-entity query and mutation surface
//! - **Error handling** ([`error`]) - The error taxonomy shared by every operation
//!
//! # Example
//!
//! ```ignore
//! use rowlayer::entity::{Column, Entity};
//! use bson::DateTime;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: String,
//!     pub name: String,
//!     pub created_at: DateTime,
//!     pub updated_at: DateTime,
//! }
//!
//! impl Entity for User {
//!     type Insert = User;
//!
//!     fn table_name() -> &'static str {
//!         "users"
//!     }
//!
//!     fn columns() -> Vec<Column> {
//!         vec![
//!             Column::text("id"),
//!             Column::text("name"),
//!             Column::timestamp("created_at"),
//!             Column::timestamp("updated_at"),
//!         ]
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as rowlayer_core;

pub mod backend;
pub mod batch;
pub mod compose;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod options;
pub mod page;
pub mod predicate;
pub mod query;
pub mod service;
pub mod soft_delete;
pub mod store;
