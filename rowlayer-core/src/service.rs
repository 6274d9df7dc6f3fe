//! Per-entity service facade.
//!
//! An [`EntityService`] binds a backend to one [`Entity`] and a [`ServiceConfig`]. It exposes
//! the query surface (`find`, `search`, `count`, cursor pagination...), single-row mutations
//! routed through [`MutationHooks`], and bulk mutations run by the
//! [`BatchProcessor`](crate::batch::BatchProcessor).
//!
//! The only state a service carries is resolved once at construction: the entity descriptor,
//! the configuration and the bound soft-delete policy. Every call is otherwise independent.
//!
//! # Example
//!
//! ```ignore
//! use rowlayer::prelude::*;
//!
//! let store = DataStore::new(MemoryStore::new());
//! let tasks = store.service::<Task>(
//!     ServiceConfig::builder()
//!         .soft(SoftDeleteConfig::timestamp("deleted_at"))
//!         .build(),
//! )?;
//!
//! let task = tasks.create(new_task, &NoHooks).await?;
//! tasks.delete(task.id.clone(), &NoHooks).await?;
//! assert!(tasks.find_one(task.id, &QueryOptions::new()).await?.is_none());
//! ```

use std::marker::PhantomData;

use bson::{Bson, DateTime, Document};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error, warn};

use crate::{
    backend::StoreBackend,
    batch::{BatchError, BatchProcessor, BulkOperationResult, ChunkResult},
    compose::QueryComposer,
    config::ServiceConfig,
    entity::{Entity, EntityDescriptor, field_value, from_row, to_row},
    error::{ServiceError, ServiceResult},
    filter::FilterCriteria,
    hooks::{Mutation, MutationHooks},
    options::QueryOptions,
    page::{Pagination, PaginationResult},
    predicate::{Expr, Filter},
    query::{Join, Query, SortDirection},
    soft_delete::SoftDeletePolicy,
};

/// Outcome of a single-row delete, hard delete or restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationStatus {
    pub success: bool,
    pub message: String,
}

impl OperationStatus {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Query and mutation surface for one entity.
#[derive(Debug)]
pub struct EntityService<B, E> {
    backend: B,
    config: ServiceConfig,
    entity: EntityDescriptor,
    soft: Option<SoftDeletePolicy>,
    _entity: PhantomData<fn() -> E>,
}

impl<B, E> EntityService<B, E>
where
    B: StoreBackend,
    E: Entity,
{
    /// Creates a service for `E` over `backend`.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error when the identity, timestamp or soft-delete columns are
    /// not declared on the entity.
    pub fn new(backend: B, config: ServiceConfig) -> ServiceResult<Self> {
        let entity = EntityDescriptor::resolve::<E>(config.id.as_deref())?;
        let soft = config
            .soft
            .clone()
            .map(|soft| SoftDeletePolicy::bind(soft, &entity))
            .transpose()?;

        if let Some(policy) = &soft {
            if let Err(err) = policy.not_deleted_value() {
                warn!(
                    table = entity.table(),
                    field = policy.field(),
                    error = %err,
                    "soft delete policy cannot restore rows"
                );
            }
        }

        debug!(
            table = entity.table(),
            id = entity.id_field(),
            soft_delete = soft.is_some(),
            "created entity service"
        );

        Ok(Self {
            backend,
            config,
            entity,
            soft,
            _entity: PhantomData,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn entity(&self) -> &EntityDescriptor {
        &self.entity
    }

    pub fn soft_delete(&self) -> Option<&SoftDeletePolicy> {
        self.soft.as_ref()
    }

    fn table(&self) -> &'static str {
        self.entity.table()
    }

    fn composer(&self) -> QueryComposer<'_> {
        QueryComposer::new(&self.entity, &self.config, self.soft.as_ref())
    }

    fn id_filter(&self, id: &Bson) -> Expr {
        Filter::eq(self.entity.id_field(), id.clone())
    }

    // Queries

    /// Returns every row matching `options`.
    pub async fn find(&self, options: &QueryOptions) -> ServiceResult<Vec<E>> {
        self.find_as(options).await
    }

    /// Like [`find`](Self::find), deserializing rows into `T`.
    ///
    /// Useful with relations: joined rows are exposed as nested documents under their alias.
    pub async fn find_as<T: DeserializeOwned>(&self, options: &QueryOptions) -> ServiceResult<Vec<T>> {
        self.select_where(None, options).await
    }

    /// Finds a row by identity.
    pub async fn find_one(
        &self,
        id: impl Into<Bson>,
        options: &QueryOptions,
    ) -> ServiceResult<Option<E>> {
        let id = id.into();

        Ok(self
            .select_where(Some(self.id_filter(&id)), &single(options))
            .await?
            .into_iter()
            .next())
    }

    /// Returns the first row matching `options`.
    pub async fn find_first(&self, options: &QueryOptions) -> ServiceResult<Option<E>> {
        Ok(self
            .select_where(None, &single(options))
            .await?
            .into_iter()
            .next())
    }

    /// Returns rows matching every field of `criteria`. Null values match null or missing
    /// fields.
    pub async fn find_by(&self, criteria: Document, options: &QueryOptions) -> ServiceResult<Vec<E>> {
        self.select_where(criteria_predicate(&criteria, Expr::And), options)
            .await
    }

    /// Returns rows matching any field of `criteria`.
    pub async fn find_by_matching(
        &self,
        criteria: Document,
        options: &QueryOptions,
    ) -> ServiceResult<Vec<E>> {
        self.select_where(criteria_predicate(&criteria, Expr::Or), options)
            .await
    }

    /// Returns rows matching filter expressions.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error naming the field when a criterion targets a column the
    /// entity does not declare, or when an expression cannot be parsed.
    pub async fn search(
        &self,
        criteria: &FilterCriteria,
        options: &QueryOptions,
    ) -> ServiceResult<Vec<E>> {
        for (field, _) in criteria.iter() {
            if !field.contains('.') && !self.entity.has_column(field) {
                return Err(ServiceError::validation(
                    format!("unknown column '{field}' on '{}'", self.table()),
                    Some(field),
                ));
            }
        }

        self.select_where(criteria.to_predicate()?, options).await
    }

    /// Counts rows matching `criteria` and the scoping in `options`.
    pub async fn count(
        &self,
        criteria: Option<Document>,
        options: &QueryOptions,
    ) -> ServiceResult<u64> {
        let filter = criteria.and_then(|criteria| criteria_predicate(&criteria, Expr::And));
        let query = self
            .composer()
            .count_query(Query::new().filter_opt(filter), options);

        debug!(table = self.table(), "count");
        self.backend.count(self.table(), query).await
    }

    /// Returns a page of rows created after `options.cursor`, ordered by creation time
    /// unless another ordering is given.
    ///
    /// `total` counts every row in scope, ignoring the cursor. The cursor comparison is
    /// strict, so rows sharing the boundary timestamp with the last row of a page are not
    /// returned on the next one; the sequence ends when `next_cursor` is `None`.
    pub async fn find_with_cursor(
        &self,
        options: &QueryOptions,
    ) -> ServiceResult<PaginationResult<E>> {
        let page = options.page.unwrap_or(1).max(1);
        let page_size = self.config.page_size(options.limit);

        let mut builder = options.to_builder().page(page).limit(page_size);
        if options.order_by.is_empty() {
            builder = builder.order_by(self.entity.created_field(), SortDirection::Asc);
        }
        let options = builder.build();

        let composer = self.composer();
        let total = self
            .backend
            .count(self.table(), composer.count_query(Query::new(), &options))
            .await?;

        debug!(table = self.table(), page, page_size, total, "select page");
        let rows = self
            .backend
            .select(self.table(), composer.apply(Query::new(), &options))
            .await?;

        let next_cursor = rows
            .last()
            .and_then(|row| match field_value(row, self.entity.created_field()) {
                Bson::DateTime(created) => Some(created.to_chrono()),
                _ => None,
            });
        let items = self.shape_rows(rows, &options)?;

        Ok(PaginationResult::new(
            items,
            next_cursor,
            Pagination::new(page, page_size, total),
        ))
    }

    async fn select_where<T: DeserializeOwned>(
        &self,
        filter: Option<Expr>,
        options: &QueryOptions,
    ) -> ServiceResult<Vec<T>> {
        let query = self
            .composer()
            .apply(Query::new().filter_opt(filter), options);

        debug!(table = self.table(), "select");
        let rows = self.backend.select(self.table(), query).await?;

        self.shape_rows(rows, options)
    }

    fn shape_rows<T: DeserializeOwned>(
        &self,
        rows: Vec<Document>,
        options: &QueryOptions,
    ) -> ServiceResult<Vec<T>> {
        rows.into_iter()
            .map(|row| {
                let row = unflatten_relations(row, &options.relations);
                let row = match &options.parse {
                    Some(parse) => parse.apply(row),
                    None => row,
                };
                from_row(row)
            })
            .collect()
    }

    /// Looks a row up by identity, optionally including soft-deleted rows.
    async fn require(&self, id: &Bson, with_deleted: bool) -> ServiceResult<Document> {
        let options = QueryOptions::builder()
            .with_deleted(with_deleted)
            .limit(1)
            .build();
        let query = self
            .composer()
            .apply(Query::new().filter(self.id_filter(id)), &options);

        self.backend
            .select(self.table(), query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found(self.table(), display_id(id)))
    }

    // Mutations

    /// Inserts a row.
    ///
    /// Timestamps left empty are set to the current time and an empty soft-delete field is
    /// seeded with the not-deleted value.
    pub async fn create<H>(&self, data: E::Insert, hooks: &H) -> ServiceResult<E>
    where
        H: MutationHooks<E::Insert, E>,
    {
        match self.try_create(Mutation::Create, &data, hooks).await {
            Ok(row) => Ok(row),
            Err(err) => Err(self.fail::<E::Insert, E, H>(hooks, Mutation::Create, err).await),
        }
    }

    /// Applies `patch` to the row with the given identity and bumps its update timestamp.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no active row has that identity.
    pub async fn update<H>(&self, id: impl Into<Bson>, patch: Document, hooks: &H) -> ServiceResult<E>
    where
        H: MutationHooks<Document, E>,
    {
        let id = id.into();

        match self.try_update(&id, patch, hooks).await {
            Ok(row) => Ok(row),
            Err(err) => Err(self.fail::<Document, E, H>(hooks, Mutation::Update, err).await),
        }
    }

    /// Returns the matching row, creating it when none exists.
    ///
    /// Rows are matched by identity when `data` carries one, otherwise by every
    /// non-timestamp field. The flag is `true` when the row was created.
    pub async fn find_or_create<H>(&self, data: E::Insert, hooks: &H) -> ServiceResult<(E, bool)>
    where
        H: MutationHooks<E::Insert, E>,
    {
        match self.try_find_or_create(&data, hooks).await {
            Ok(found) => Ok(found),
            Err(err) => {
                Err(self
                    .fail::<E::Insert, E, H>(hooks, Mutation::FindOrCreate, err)
                    .await)
            }
        }
    }

    /// Updates the row with `data`'s identity when it exists, inserts `data` otherwise.
    pub async fn upsert<H>(&self, data: E::Insert, hooks: &H) -> ServiceResult<E>
    where
        H: MutationHooks<E::Insert, E>,
    {
        match self.try_upsert(&data, hooks).await {
            Ok(row) => Ok(row),
            Err(err) => Err(self.fail::<E::Insert, E, H>(hooks, Mutation::Upsert, err).await),
        }
    }

    /// Soft-deletes the row with the given identity.
    ///
    /// Entities without a soft-delete policy are hard-deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no active row has that identity.
    pub async fn delete<H>(&self, id: impl Into<Bson>, hooks: &H) -> ServiceResult<OperationStatus>
    where
        H: MutationHooks<Bson, OperationStatus>,
    {
        let id = id.into();

        match self.try_transition(Mutation::Delete, &id, hooks).await {
            Ok(status) => Ok(status),
            Err(err) => {
                Err(self
                    .fail::<Bson, OperationStatus, H>(hooks, Mutation::Delete, err)
                    .await)
            }
        }
    }

    /// Permanently removes the row with the given identity, deleted or not.
    pub async fn hard_delete<H>(
        &self,
        id: impl Into<Bson>,
        hooks: &H,
    ) -> ServiceResult<OperationStatus>
    where
        H: MutationHooks<Bson, OperationStatus>,
    {
        let id = id.into();

        match self.try_transition(Mutation::HardDelete, &id, hooks).await {
            Ok(status) => Ok(status),
            Err(err) => {
                Err(self
                    .fail::<Bson, OperationStatus, H>(hooks, Mutation::HardDelete, err)
                    .await)
            }
        }
    }

    /// Restores a soft-deleted row.
    ///
    /// Without a soft-delete policy this reports `success: false` and leaves the backend
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error when the policy has no usable not-deleted value, and
    /// `NotFound` when no row has that identity.
    pub async fn restore<H>(&self, id: impl Into<Bson>, hooks: &H) -> ServiceResult<OperationStatus>
    where
        H: MutationHooks<Bson, OperationStatus>,
    {
        let id = id.into();

        if self.soft.is_none() {
            return Ok(OperationStatus::failed(format!(
                "soft delete is not configured for '{}'",
                self.table()
            )));
        }

        match self.try_transition(Mutation::Restore, &id, hooks).await {
            Ok(status) => Ok(status),
            Err(err) => {
                Err(self
                    .fail::<Bson, OperationStatus, H>(hooks, Mutation::Restore, err)
                    .await)
            }
        }
    }

    async fn try_create<H>(&self, mutation: Mutation, data: &E::Insert, hooks: &H) -> ServiceResult<E>
    where
        H: MutationHooks<E::Insert, E>,
    {
        hooks.before_action(mutation, data).await?;

        let row = self.prepare_insert(data)?;
        debug!(table = self.table(), %mutation, "insert");
        let created = self
            .backend
            .insert(self.table(), vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::database("insert returned no rows"))?;
        let created: E = from_row(created)?;

        hooks.after_action(mutation, &created).await;
        Ok(created)
    }

    async fn try_update<H>(&self, id: &Bson, patch: Document, hooks: &H) -> ServiceResult<E>
    where
        H: MutationHooks<Document, E>,
    {
        hooks.before_action(Mutation::Update, &patch).await?;

        let updated = self.apply_update(id, patch).await?;

        hooks.after_action(Mutation::Update, &updated).await;
        Ok(updated)
    }

    async fn try_find_or_create<H>(&self, data: &E::Insert, hooks: &H) -> ServiceResult<(E, bool)>
    where
        H: MutationHooks<E::Insert, E>,
    {
        let mut criteria = to_row(data)?;
        if let Some(id) = criteria.get(self.entity.id_field()).filter(|id| **id != Bson::Null) {
            return match self.active_identity(id).await? {
                Some(found) => Ok((from_row(found)?, false)),
                None => Ok((self.try_create(Mutation::FindOrCreate, data, hooks).await?, true)),
            };
        }

        criteria.remove(self.entity.created_field());
        criteria.remove(self.entity.updated_field());
        let lookup = criteria_predicate(&criteria, Expr::And);

        let existing = self
            .select_where::<E>(lookup, &QueryOptions::builder().limit(1).build())
            .await?;
        if let Some(found) = existing.into_iter().next() {
            return Ok((found, false));
        }

        Ok((self.try_create(Mutation::FindOrCreate, data, hooks).await?, true))
    }

    async fn try_upsert<H>(&self, data: &E::Insert, hooks: &H) -> ServiceResult<E>
    where
        H: MutationHooks<E::Insert, E>,
    {
        let row = to_row(data)?;
        let id = match row.get(self.entity.id_field()) {
            Some(id) if *id != Bson::Null => id.clone(),
            _ => return self.try_create(Mutation::Upsert, data, hooks).await,
        };

        if self.active_identity(&id).await?.is_none() {
            return self.try_create(Mutation::Upsert, data, hooks).await;
        }

        hooks.before_action(Mutation::Upsert, data).await?;

        let mut patch = row;
        patch.remove(self.entity.created_field());
        let updated = self.apply_update(&id, patch).await?;

        hooks.after_action(Mutation::Upsert, &updated).await;
        Ok(updated)
    }

    /// Looks up the active row holding `id`.
    ///
    /// An identity held by a soft-deleted row is a `Validation` error, so callers never
    /// insert a second row under it.
    async fn active_identity(&self, id: &Bson) -> ServiceResult<Option<Document>> {
        match self.require(id, false).await {
            Ok(row) => return Ok(Some(row)),
            Err(ServiceError::NotFound { .. }) if self.soft.is_some() => {}
            Err(ServiceError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        }

        match self.require(id, true).await {
            Ok(_) => Err(ServiceError::validation(
                format!(
                    "{} '{}' is soft-deleted; restore it first",
                    self.table(),
                    display_id(id)
                ),
                Some(self.entity.id_field()),
            )),
            Err(ServiceError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn try_transition<H>(
        &self,
        mutation: Mutation,
        id: &Bson,
        hooks: &H,
    ) -> ServiceResult<OperationStatus>
    where
        H: MutationHooks<Bson, OperationStatus>,
    {
        let with_deleted = !matches!(mutation, Mutation::Delete);
        let transition = self.transition(mutation)?;

        hooks.before_action(mutation, id).await?;
        self.require(id, with_deleted).await?;

        if self.write_transition(&transition, id).await?.is_none() {
            return Err(ServiceError::not_found(self.table(), display_id(id)));
        }

        let status = OperationStatus::succeeded(format!(
            "{} '{}' {}",
            self.table(),
            display_id(id),
            transition.verb()
        ));
        hooks.after_action(mutation, &status).await;
        Ok(status)
    }

    async fn apply_update(&self, id: &Bson, patch: Document) -> ServiceResult<E> {
        let mut changes = patch;
        changes.remove(self.entity.id_field());
        changes.insert(self.entity.updated_field(), Bson::DateTime(DateTime::now()));

        let filter = self
            .composer()
            .scope_soft_delete(Query::new().filter(self.id_filter(id)), &QueryOptions::new())
            .filter
            .unwrap_or_else(|| self.id_filter(id));

        debug!(table = self.table(), id = %display_id(id), "update");
        let updated = self
            .backend
            .update(self.table(), filter, changes)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found(self.table(), display_id(id)))?;

        from_row(updated)
    }

    /// Resolves how `mutation` changes a row.
    fn transition(&self, mutation: Mutation) -> ServiceResult<Transition> {
        match (mutation, &self.soft) {
            (Mutation::Delete | Mutation::BulkDelete, Some(policy)) => Ok(Transition::SoftDelete {
                state: policy.active_predicate(),
                changes: self.marker_changes(policy.field(), policy.deleted_value_for_write()),
            }),
            (Mutation::Restore | Mutation::BulkRestore, Some(policy)) => Ok(Transition::Restore {
                state: policy.deleted_predicate(),
                changes: self.marker_changes(policy.field(), policy.not_deleted_value()?),
            }),
            (Mutation::Restore | Mutation::BulkRestore, None) => Err(ServiceError::database(
                format!("soft delete is not configured for '{}'", self.table()),
            )),
            _ => Ok(Transition::Remove),
        }
    }

    fn marker_changes(&self, field: &str, value: Bson) -> Document {
        let mut changes = Document::new();
        changes.insert(field, value);
        changes.insert(self.entity.updated_field(), Bson::DateTime(DateTime::now()));
        changes
    }

    /// Writes a transition for one identity, returning the affected row if any.
    ///
    /// Only a row in the transition's source state is written.
    async fn write_transition(
        &self,
        transition: &Transition,
        id: &Bson,
    ) -> ServiceResult<Option<Document>> {
        debug!(table = self.table(), id = %display_id(id), verb = transition.verb(), "write");

        let filter = match transition.state() {
            Some(state) => self.id_filter(id).and(state),
            None => self.id_filter(id),
        };
        let rows = match transition {
            Transition::SoftDelete { changes, .. } | Transition::Restore { changes, .. } => {
                self.backend
                    .update(self.table(), filter, changes.clone())
                    .await?
            }
            Transition::Remove => self.backend.delete(self.table(), filter).await?,
        };

        Ok(rows.into_iter().next())
    }

    fn prepare_insert(&self, data: &E::Insert) -> ServiceResult<Document> {
        let mut row = to_row(data)?;
        let now = Bson::DateTime(DateTime::now());

        for field in [self.entity.created_field(), self.entity.updated_field()] {
            if *field_value(&row, field) == Bson::Null {
                row.insert(field, now.clone());
            }
        }

        if let Some(policy) = &self.soft {
            if *field_value(&row, policy.field()) == Bson::Null {
                if let Ok(value) = policy.not_deleted_value() {
                    row.insert(policy.field(), value);
                }
            }
        }

        Ok(row)
    }

    fn insert_id(&self, data: &E::Insert) -> Option<Bson> {
        to_row(data)
            .ok()
            .and_then(|row| row.get(self.entity.id_field()).cloned())
    }

    async fn fail<I, O, H>(&self, hooks: &H, mutation: Mutation, err: ServiceError) -> ServiceError
    where
        I: ?Sized + Sync,
        O: ?Sized + Sync,
        H: MutationHooks<I, O>,
    {
        error!(
            table = self.table(),
            %mutation,
            kind = err.kind(),
            error = %err,
            "mutation failed"
        );
        hooks.on_error(mutation, &err).await;
        err
    }

    // Bulk mutations

    /// Inserts rows in chunks of `batch_size`, one backend insert per chunk.
    ///
    /// A rejected insert fails every item of its chunk with the backend's message.
    pub async fn bulk_create<H>(&self, items: Vec<E::Insert>, hooks: &H) -> BulkOperationResult<E>
    where
        H: MutationHooks<[E::Insert], [E]>,
    {
        BatchProcessor::new(self.config.batch_size)
            .process(items, |offset, chunk| self.create_chunk(offset, chunk, hooks))
            .await
    }

    /// Applies `(id, patch)` updates in chunks, one backend update per item.
    pub async fn bulk_update<H>(
        &self,
        items: Vec<(Bson, Document)>,
        hooks: &H,
    ) -> BulkOperationResult<E>
    where
        H: MutationHooks<[(Bson, Document)], [E]>,
    {
        BatchProcessor::new(self.config.batch_size)
            .process(items, |offset, chunk| self.update_chunk(offset, chunk, hooks))
            .await
    }

    /// Soft-deletes rows by identity. Identities that are missing or already deleted are
    /// reported as failed.
    pub async fn bulk_delete<H>(&self, ids: Vec<Bson>, hooks: &H) -> BulkOperationResult<E>
    where
        H: MutationHooks<[Bson], [E]>,
    {
        self.bulk_transition(Mutation::BulkDelete, ids, hooks).await
    }

    /// Permanently removes rows by identity.
    pub async fn bulk_hard_delete<H>(&self, ids: Vec<Bson>, hooks: &H) -> BulkOperationResult<E>
    where
        H: MutationHooks<[Bson], [E]>,
    {
        self.bulk_transition(Mutation::BulkHardDelete, ids, hooks).await
    }

    /// Restores soft-deleted rows by identity. Identities that are missing or not deleted
    /// are reported as failed.
    pub async fn bulk_restore<H>(&self, ids: Vec<Bson>, hooks: &H) -> BulkOperationResult<E>
    where
        H: MutationHooks<[Bson], [E]>,
    {
        self.bulk_transition(Mutation::BulkRestore, ids, hooks).await
    }

    async fn bulk_transition<H>(
        &self,
        mutation: Mutation,
        ids: Vec<Bson>,
        hooks: &H,
    ) -> BulkOperationResult<E>
    where
        H: MutationHooks<[Bson], [E]>,
    {
        if ids.is_empty() {
            return BulkOperationResult::empty();
        }

        let transition = match self.transition(mutation) {
            Ok(transition) => transition,
            Err(err) => {
                let err = self.fail::<[Bson], [E], H>(hooks, mutation, err).await;
                return BulkOperationResult::rejected(
                    ids.into_iter().map(Some).collect(),
                    &err.to_string(),
                );
            }
        };

        BatchProcessor::new(self.config.batch_size)
            .process(ids, |offset, chunk| {
                self.transition_chunk(mutation, &transition, offset, chunk, hooks)
            })
            .await
    }

    async fn create_chunk<H>(&self, offset: usize, chunk: Vec<E::Insert>, hooks: &H) -> ChunkResult<E>
    where
        H: MutationHooks<[E::Insert], [E]>,
    {
        let mutation = Mutation::BulkCreate;
        let mut result = ChunkResult::new();

        if let Err(err) = hooks.before_action(mutation, chunk.as_slice()).await {
            let ids = chunk.iter().map(|item| self.insert_id(item));
            result.fail_all((offset..).zip(ids), &err.to_string());
            hooks.on_error(mutation, &err).await;
            return result;
        }

        let mut rows = Vec::with_capacity(chunk.len());
        let mut positions = Vec::with_capacity(chunk.len());
        for (index, item) in (offset..).zip(chunk.iter()) {
            match self.prepare_insert(item) {
                Ok(row) => {
                    positions.push((index, row.get(self.entity.id_field()).cloned()));
                    rows.push(row);
                }
                Err(err) => result.fail(BatchError::new(index, None, err.to_string())),
            }
        }

        if rows.is_empty() {
            return result;
        }

        debug!(table = self.table(), offset, rows = rows.len(), "bulk insert");
        match self.backend.insert(self.table(), rows).await {
            Ok(stored) => {
                let mut stored = stored.into_iter();
                for (index, id) in positions {
                    match stored.next().map(from_row::<E>) {
                        Some(Ok(created)) => result.succeed(created),
                        Some(Err(err)) => result.fail(BatchError::new(index, id, err.to_string())),
                        None => result.fail(BatchError::new(
                            index,
                            id,
                            "insert returned no row for this item",
                        )),
                    }
                }
                if !result.data.is_empty() {
                    hooks.after_action(mutation, result.data.as_slice()).await;
                }
            }
            Err(err) => {
                error!(table = self.table(), offset, error = %err, "bulk insert failed");
                result.fail_all(positions, &err.to_string());
                hooks.on_error(mutation, &err).await;
            }
        }

        result
    }

    async fn update_chunk<H>(
        &self,
        offset: usize,
        chunk: Vec<(Bson, Document)>,
        hooks: &H,
    ) -> ChunkResult<E>
    where
        H: MutationHooks<[(Bson, Document)], [E]>,
    {
        let mutation = Mutation::BulkUpdate;

        if let Err(err) = hooks.before_action(mutation, chunk.as_slice()).await {
            let mut result = ChunkResult::new();
            let ids = chunk.into_iter().map(|(id, _)| Some(id));
            result.fail_all((offset..).zip(ids), &err.to_string());
            hooks.on_error(mutation, &err).await;
            return result;
        }

        let result = BatchProcessor::each(offset, chunk, |index, (id, patch)| async move {
            match self.apply_update(&id, patch).await {
                Ok(updated) => Ok(updated),
                Err(err) => {
                    hooks.on_error(mutation, &err).await;
                    Err(BatchError::new(index, Some(id), err.to_string()))
                }
            }
        })
        .await;

        if !result.data.is_empty() {
            hooks.after_action(mutation, result.data.as_slice()).await;
        }

        result
    }

    async fn transition_chunk<H>(
        &self,
        mutation: Mutation,
        transition: &Transition,
        offset: usize,
        chunk: Vec<Bson>,
        hooks: &H,
    ) -> ChunkResult<E>
    where
        H: MutationHooks<[Bson], [E]>,
    {
        let mut result = ChunkResult::new();

        if let Err(err) = hooks.before_action(mutation, chunk.as_slice()).await {
            result.fail_all((offset..).zip(chunk.into_iter().map(Some)), &err.to_string());
            hooks.on_error(mutation, &err).await;
            return result;
        }

        let query = Query::new()
            .filter(Filter::in_list(self.entity.id_field(), chunk.iter().cloned()))
            .filter_opt(transition.state());
        let mut eligible = match self.backend.select(self.table(), query).await {
            Ok(rows) => rows
                .iter()
                .map(|row| field_value(row, self.entity.id_field()).clone())
                .collect::<Vec<_>>(),
            Err(err) => {
                error!(table = self.table(), offset, error = %err, "bulk lookup failed");
                result.fail_all((offset..).zip(chunk.into_iter().map(Some)), &err.to_string());
                hooks.on_error(mutation, &err).await;
                return result;
            }
        };

        for (index, id) in (offset..).zip(chunk) {
            let ineligible = || {
                format!("{} '{}' {}", self.table(), display_id(&id), transition.ineligible())
            };

            // Each looked-up row is consumed once, so a repeated identity fails.
            match eligible.iter().position(|found| same_identity(found, &id)) {
                Some(position) => {
                    eligible.swap_remove(position);
                }
                None => {
                    result.fail(BatchError::new(index, Some(id.clone()), ineligible()));
                    continue;
                }
            }

            let written = match self.write_transition(transition, &id).await {
                Ok(Some(row)) => from_row::<E>(row),
                Ok(None) => {
                    result.fail(BatchError::new(index, Some(id.clone()), ineligible()));
                    continue;
                }
                Err(err) => Err(err),
            };

            match written {
                Ok(row) => result.succeed(row),
                Err(err) => {
                    hooks.on_error(mutation, &err).await;
                    result.fail(BatchError::new(index, Some(id), err.to_string()));
                }
            }
        }

        if !result.data.is_empty() {
            hooks.after_action(mutation, result.data.as_slice()).await;
        }

        result
    }
}

/// How a delete, restore or hard delete changes a row.
enum Transition {
    SoftDelete { state: Expr, changes: Document },
    Restore { state: Expr, changes: Document },
    Remove,
}

impl Transition {
    /// Predicate rows must satisfy to be eligible.
    fn state(&self) -> Option<Expr> {
        match self {
            Transition::SoftDelete { state, .. } | Transition::Restore { state, .. } => {
                Some(state.clone())
            }
            Transition::Remove => None,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Transition::SoftDelete { .. } => "deleted",
            Transition::Restore { .. } => "restored",
            Transition::Remove => "permanently deleted",
        }
    }

    fn ineligible(&self) -> &'static str {
        match self {
            Transition::SoftDelete { .. } => "not found or already deleted",
            Transition::Restore { .. } => "not found or not deleted",
            Transition::Remove => "not found",
        }
    }
}

/// Options for a single-row lookup: one row unless the caller paginates.
fn single(options: &QueryOptions) -> QueryOptions {
    if options.is_paginated() {
        options.clone()
    } else {
        options.to_builder().limit(1).build()
    }
}

/// Builds a predicate from field/value pairs; null values match null or missing fields.
fn criteria_predicate(
    criteria: &Document,
    combine: fn(Vec<Expr>) -> Expr,
) -> Option<Expr> {
    let mut parts = criteria
        .iter()
        .map(|(field, value)| match value {
            Bson::Null => Filter::is_null(field.as_str()),
            value => Filter::eq(field.as_str(), value.clone()),
        })
        .collect::<Vec<_>>();

    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(combine(parts)),
    }
}

fn display_id(id: &Bson) -> String {
    match id {
        Bson::String(id) => id.clone(),
        other => other.to_string(),
    }
}

/// Identity equality across integer widths: an `Int32` key matches the same `Int64` or
/// `Double` value, as backends compare them.
fn same_identity(left: &Bson, right: &Bson) -> bool {
    match (left, right) {
        (Bson::Int32(a), Bson::Int64(b)) | (Bson::Int64(b), Bson::Int32(a)) => i64::from(*a) == *b,
        (Bson::Int32(a), Bson::Double(b)) | (Bson::Double(b), Bson::Int32(a)) => f64::from(*a) == *b,
        (Bson::Int64(a), Bson::Double(b)) | (Bson::Double(b), Bson::Int64(a)) => *a as f64 == *b,
        _ => left == right,
    }
}

/// Moves joined `alias.column` keys under a nested `alias` document.
///
/// A relation whose columns are all null or missing (a left join without a match) becomes
/// null.
pub(crate) fn unflatten_relations(row: Document, relations: &[Join]) -> Document {
    if relations.is_empty() {
        return row;
    }

    let mut flat = Document::new();
    let mut nested: Vec<(String, Document)> = relations
        .iter()
        .map(|join| (join.alias.clone(), Document::new()))
        .collect();

    for (key, value) in row {
        let target = nested.iter_mut().find_map(|(alias, doc)| {
            if key == *alias {
                return Some((doc, None));
            }
            key.strip_prefix(alias.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|column| (doc, Some(column.to_string())))
        });

        match (target, value) {
            (Some((doc, None)), Bson::Document(existing)) => {
                for (column, value) in existing {
                    doc.insert(column, value);
                }
            }
            (Some((_, None)), _) => {}
            (Some((doc, Some(column))), value) => {
                doc.insert(column, value);
            }
            (None, value) => {
                flat.insert(key, value);
            }
        }
    }

    for (alias, doc) in nested {
        let value = if doc.iter().all(|(_, value)| *value == Bson::Null) {
            Bson::Null
        } else {
            Bson::Document(doc)
        };
        flat.insert(alias, value);
    }

    flat
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn unflattens_joined_columns() {
        let row = doc! { "id": "t1", "owner.id": "u1", "owner.name": "Ada" };
        let joins = vec![Join::left("users", "owner", "owner_id", "id")];

        assert_eq!(
            unflatten_relations(row, &joins),
            doc! { "id": "t1", "owner": { "id": "u1", "name": "Ada" } }
        );
    }

    #[test]
    fn identities_compare_across_integer_widths() {
        assert!(same_identity(&Bson::Int32(2), &Bson::Int64(2)));
        assert!(same_identity(&Bson::Int64(2), &Bson::Double(2.0)));
        assert!(!same_identity(&Bson::Int32(2), &Bson::Int64(3)));
        assert!(!same_identity(&Bson::Int32(2), &Bson::String("2".into())));
    }

    #[test]
    fn unmatched_left_join_becomes_null() {
        let row = doc! { "id": "t1", "owner.id": Bson::Null, "owner.name": Bson::Null };
        let joins = vec![Join::left("users", "owner", "owner_id", "id")];

        assert_eq!(
            unflatten_relations(row, &joins),
            doc! { "id": "t1", "owner": Bson::Null }
        );
    }

    #[test]
    fn already_nested_relations_are_kept() {
        let row = doc! { "id": "t1", "owner": { "id": "u1" } };
        let joins = vec![Join::inner("users", "owner", "owner_id", "id")];

        assert_eq!(
            unflatten_relations(row, &joins),
            doc! { "id": "t1", "owner": { "id": "u1" } }
        );
    }

    #[test]
    fn prefix_must_end_at_a_dot() {
        let row = doc! { "ownership": 3, "owner.id": "u1" };
        let joins = vec![Join::left("users", "owner", "owner_id", "id")];

        assert_eq!(
            unflatten_relations(row, &joins),
            doc! { "ownership": 3, "owner": { "id": "u1" } }
        );
    }

    #[test]
    fn criteria_nulls_become_null_checks() {
        let criteria = doc! { "title": "a", "archived_at": Bson::Null };

        assert_eq!(
            criteria_predicate(&criteria, Expr::And),
            Some(Expr::And(vec![Filter::eq("title", "a"), Filter::is_null("archived_at")]))
        );
        assert_eq!(criteria_predicate(&Document::new(), Expr::Or), None);
    }

    #[test]
    fn string_ids_display_without_quotes() {
        assert_eq!(display_id(&Bson::String("t1".into())), "t1");
        assert_eq!(display_id(&Bson::Int32(7)), "7");
    }
}
