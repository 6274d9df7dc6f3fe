//! Main store interface.
//!
//! A [`DataStore`] owns a backend and hands out per-entity
//! [`EntityService`]s that borrow it. Table administration goes through the store directly.
//!
//! - [`DataStore<B>`] - Typed store for a specific backend implementation
//! - [`DynDataStore`] - Store over a backend selected at runtime
//!
//! # Example
//!
//! ```ignore
//! use rowlayer::store::DataStore;
//! use rowlayer::config::ServiceConfig;
//!
//! let store = DataStore::new(backend);
//! store.ensure_table::<User>().await?;
//!
//! let users = store.service::<User>(ServiceConfig::default())?;
//! ```

use crate::{
    backend::{DynStoreBackend, StoreBackend},
    config::ServiceConfig,
    entity::Entity,
    error::ServiceResult,
    service::EntityService,
};

/// A store bound to a specific backend implementation.
#[derive(Debug)]
pub struct DataStore<B: StoreBackend> {
    backend: B,
}

/// A store over a backend selected at runtime.
pub type DynDataStore = DataStore<Box<dyn DynStoreBackend>>;

impl<B: StoreBackend> DataStore<B> {
    /// Creates a new store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates a service for `E` borrowing this store's backend.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error when `config` does not fit the entity's column registry.
    pub fn service<E: Entity>(&self, config: ServiceConfig) -> ServiceResult<EntityService<&B, E>> {
        EntityService::new(&self.backend, config)
    }

    /// Creates the table backing `E`.
    pub async fn ensure_table<E: Entity>(&self) -> ServiceResult<()> {
        StoreBackend::create_table(&self.backend, E::table_name()).await
    }

    pub async fn create_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::create_table(&self.backend, name).await
    }

    pub async fn drop_table(&self, name: &str) -> ServiceResult<()> {
        StoreBackend::drop_table(&self.backend, name).await
    }

    pub async fn list_tables(&self) -> ServiceResult<Vec<String>> {
        StoreBackend::list_tables(&self.backend).await
    }

    /// Adds an index to a field in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if `unique` is set and existing rows already collide.
    pub async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()> {
        StoreBackend::add_index(&self.backend, table, field, unique).await
    }

    pub async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()> {
        StoreBackend::drop_index(&self.backend, table, field).await
    }

    pub async fn shutdown(self) -> ServiceResult<()> {
        StoreBackend::shutdown(self.backend).await
    }
}

impl<B: StoreBackend + 'static> DataStore<B> {
    /// Erases the backend type.
    pub fn into_dyn(self) -> DynDataStore {
        DynDataStore::new(Box::new(self.backend))
    }
}

impl DynDataStore {
    /// Recovers a reference to the concrete backend, if it is a `B`.
    pub fn downcast_backend<B: StoreBackend + 'static>(&self) -> Option<&B> {
        DynStoreBackend::as_any(&*self.backend).downcast_ref::<B>()
    }
}
