//! In-memory table storage backend for rowlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Relation joins** - Left, inner and right equi-joins across tables
//! - **Full query support** - Supports filtering, multi-key sorting, and pagination
//! - **Unique indexes** - Violating writes are rejected as a whole
//!
//! # Quick Start
//!
//! ```ignore
//! use rowlayer::{prelude::*, memory::MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DataStore::new(MemoryStore::builder().table("users").build().await?);
//!     let users = store.service::<User>(ServiceConfig::default())?;
//!
//!     users.create(NewUser { name: "Alice".into() }, &NoHooks).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as rowlayer_memory;

mod evaluator;
pub mod store;

pub use store::{MemoryStore, MemoryStoreBuilder};
