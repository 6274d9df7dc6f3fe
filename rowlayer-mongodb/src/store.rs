use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{ClientOptions, IndexOptions},
};
use tracing::debug;

use rowlayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{ServiceError, ServiceResult},
    predicate::Expr,
    query::Query,
};

use crate::query::{MongoQueryTranslator, pipeline};

/// MongoDB-backed [`StoreBackend`].
///
/// Tables map to collections and rows to documents. The driver-assigned `_id` is never
/// exposed; row identity is whatever column the entity declares.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, table: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(table)
    }

    async fn table_exists(&self, table: &str) -> ServiceResult<bool> {
        Ok(self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(ServiceError::backend)?
            .iter()
            .any(|name| name == table))
    }

    /// Returns the `_id`s of the rows matching `filter` alongside the rows themselves.
    async fn matching(&self, table: &str, filter: &Expr) -> ServiceResult<(Vec<Bson>, Vec<Document>)> {
        let rows = self
            .get_collection(table)
            .find(MongoQueryTranslator::translate(filter)?)
            .await
            .map_err(ServiceError::backend)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(ServiceError::backend)?;

        Ok(rows
            .into_iter()
            .map(|mut row| {
                let id = row.remove("_id").unwrap_or(Bson::Null);
                (id, row)
            })
            .unzip())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn select(&self, table: &str, query: Query) -> ServiceResult<Vec<Document>> {
        let stages = pipeline(&query, false)?;
        debug!(table, stages = stages.len(), "mongodb select");

        self.get_collection(table)
            .aggregate(stages)
            .await
            .map_err(ServiceError::backend)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(ServiceError::backend)
    }

    async fn count(&self, table: &str, query: Query) -> ServiceResult<u64> {
        let result = self
            .get_collection(table)
            .aggregate(pipeline(&query, true)?)
            .await
            .map_err(ServiceError::backend)?
            .try_next()
            .await
            .map_err(ServiceError::backend)?;

        Ok(match result.as_ref().and_then(|doc| doc.get("count")) {
            Some(Bson::Int32(count)) => *count as u64,
            Some(Bson::Int64(count)) => *count as u64,
            _ => 0,
        })
    }

    async fn insert(&self, table: &str, rows: Vec<Document>) -> ServiceResult<Vec<Document>> {
        if rows.is_empty() {
            return Ok(rows);
        }

        self.get_collection(table)
            .insert_many(&rows)
            .await
            .map_err(ServiceError::backend)?;
        debug!(table, rows = rows.len(), "mongodb insert");

        Ok(rows)
    }

    async fn update(
        &self,
        table: &str,
        filter: Expr,
        changes: Document,
    ) -> ServiceResult<Vec<Document>> {
        let (ids, rows) = self.matching(table, &filter).await?;
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.get_collection(table)
            .update_many(doc! { "_id": { "$in": ids } }, doc! { "$set": changes.clone() })
            .await
            .map_err(ServiceError::backend)?;
        debug!(table, rows = rows.len(), "mongodb update");

        Ok(rows
            .into_iter()
            .map(|mut row| {
                for (column, value) in &changes {
                    row.insert(column.clone(), value.clone());
                }
                row
            })
            .collect())
    }

    async fn delete(&self, table: &str, filter: Expr) -> ServiceResult<Vec<Document>> {
        let (ids, rows) = self.matching(table, &filter).await?;
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.get_collection(table)
            .delete_many(doc! { "_id": { "$in": ids } })
            .await
            .map_err(ServiceError::backend)?;
        debug!(table, rows = rows.len(), "mongodb delete");

        Ok(rows)
    }

    async fn create_table(&self, name: &str) -> ServiceResult<()> {
        if self.table_exists(name).await? {
            return Ok(());
        }

        self.client
            .database(&self.database)
            .create_collection(name)
            .await
            .map_err(ServiceError::backend)?;

        Ok(())
    }

    async fn drop_table(&self, name: &str) -> ServiceResult<()> {
        if !self.table_exists(name).await? {
            return Err(ServiceError::not_found("table", name));
        }

        self.get_collection(name)
            .drop()
            .await
            .map_err(ServiceError::backend)?;

        Ok(())
    }

    async fn list_tables(&self) -> ServiceResult<Vec<String>> {
        let mut names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(ServiceError::backend)?;
        names.sort();

        Ok(names)
    }

    async fn add_index(&self, table: &str, field: &str, unique: bool) -> ServiceResult<()> {
        self.get_collection(table)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(IndexOptions::builder().unique(unique).build())
                    .build(),
            )
            .await
            .map_err(ServiceError::backend)?;

        Ok(())
    }

    async fn drop_index(&self, table: &str, field: &str) -> ServiceResult<()> {
        self.get_collection(table)
            .drop_index(format!("{field}_1"))
            .await
            .map_err(ServiceError::backend)?;

        Ok(())
    }

    async fn shutdown(self) -> ServiceResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Builder connecting a [`MongoDbStore`] from a connection string.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> ServiceResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(ServiceError::backend)?;
        let client = Client::with_options(options).map_err(ServiceError::backend)?;

        Ok(MongoDbStore::new(client, self.database))
    }
}
