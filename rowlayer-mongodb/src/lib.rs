//! MongoDB backend implementation for rowlayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait,
//! running every select and count as an aggregation pipeline.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! rowlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Relation joins** - Left and inner joins run as `$lookup` stages; right joins are rejected
//! - **Pattern matching** - `LIKE`/`ILIKE` patterns become anchored regular expressions
//! - **Indexing** - Support for creating and dropping single-field indexes
//!
//! Writes are not transactional: a multi-row insert that hits a unique index keeps the rows
//! written before the violation.
//!
//! # Example
//!
//! ```ignore
//! use rowlayer::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as rowlayer_mongodb;

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
