//! Mutation lifecycle hooks.
//!
//! Every mutation on an [`EntityService`](crate::service::EntityService) takes a hooks value.
//! `before_action` sees the input before anything is written and may reject it,
//! `after_action` sees what was written, and `on_error` observes every error the mutation
//! returns. Bulk operations call the hooks once per chunk with the whole chunk.
//!
//! ```ignore
//! use rowlayer::hooks::{Mutation, MutationHooks};
//! use rowlayer::error::{ServiceError, ServiceResult};
//!
//! struct RequireTitle;
//!
//! #[async_trait]
//! impl MutationHooks<NewTask, Task> for RequireTitle {
//!     async fn before_action(&self, _: Mutation, input: &NewTask) -> ServiceResult<()> {
//!         if input.title.is_empty() {
//!             return Err(ServiceError::validation("title is required", Some("title")));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;

use async_trait::async_trait;

use crate::error::{ServiceError, ServiceResult};

/// The mutation a hook is being called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    FindOrCreate,
    Upsert,
    Delete,
    HardDelete,
    Restore,
    BulkCreate,
    BulkUpdate,
    BulkDelete,
    BulkHardDelete,
    BulkRestore,
}

impl Mutation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mutation::Create => "create",
            Mutation::Update => "update",
            Mutation::FindOrCreate => "find_or_create",
            Mutation::Upsert => "upsert",
            Mutation::Delete => "delete",
            Mutation::HardDelete => "hard_delete",
            Mutation::Restore => "restore",
            Mutation::BulkCreate => "bulk_create",
            Mutation::BulkUpdate => "bulk_update",
            Mutation::BulkDelete => "bulk_delete",
            Mutation::BulkHardDelete => "bulk_hard_delete",
            Mutation::BulkRestore => "bulk_restore",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callbacks around a mutation taking `I` and producing `O`.
///
/// All methods default to no-ops.
#[async_trait]
pub trait MutationHooks<I: ?Sized + Sync, O: ?Sized + Sync>: Send + Sync {
    /// Runs before the mutation writes anything. An error aborts it.
    async fn before_action(&self, _mutation: Mutation, _input: &I) -> ServiceResult<()> {
        Ok(())
    }

    /// Runs after a successful write.
    async fn after_action(&self, _mutation: Mutation, _output: &O) {}

    /// Observes an error before the mutation returns it.
    async fn on_error(&self, _mutation: Mutation, _error: &ServiceError) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<I: ?Sized + Sync, O: ?Sized + Sync> MutationHooks<I, O> for NoHooks {}

#[async_trait]
impl<I, O, H> MutationHooks<I, O> for &H
where
    I: ?Sized + Sync,
    O: ?Sized + Sync,
    H: MutationHooks<I, O> + ?Sized,
{
    async fn before_action(&self, mutation: Mutation, input: &I) -> ServiceResult<()> {
        (**self).before_action(mutation, input).await
    }

    async fn after_action(&self, mutation: Mutation, output: &O) {
        (**self).after_action(mutation, output).await
    }

    async fn on_error(&self, mutation: Mutation, error: &ServiceError) {
        (**self).on_error(mutation, error).await
    }
}
