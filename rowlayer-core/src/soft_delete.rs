//! Soft-delete policy.
//!
//! A policy names the marker field and the value written on delete. Rows are Active while
//! the marker holds the not-deleted value and Deleted while it holds the deleted value.
//! Delete moves a row Active to Deleted, restore moves it back; there is no other
//! transition.

use bson::{Bson, DateTime};
use serde::{Deserialize, Serialize};

use crate::{
    entity::{ColumnKind, EntityDescriptor},
    error::{ServiceError, ServiceResult},
    predicate::{Expr, Filter},
};

/// Value written to the marker field on delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedValue {
    /// A concrete marker value, e.g. `true` or `"archived"`.
    Value(Bson),
    /// "Non-null": the current time is written on delete and active rows hold null.
    Timestamp,
}

/// Soft-delete configuration for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftDeleteConfig {
    /// Marker field.
    pub field: String,
    /// Value meaning "deleted".
    pub deleted_value: DeletedValue,
    /// Value meaning "not deleted". Only required for non-boolean, non-timestamp fields.
    #[serde(default)]
    pub not_deleted_value: Option<Bson>,
}

impl SoftDeleteConfig {
    /// Boolean marker: `deleted_value` on delete, its negation on restore.
    pub fn flag(field: impl Into<String>, deleted_value: bool) -> Self {
        Self {
            field: field.into(),
            deleted_value: DeletedValue::Value(Bson::Boolean(deleted_value)),
            not_deleted_value: None,
        }
    }

    /// Timestamp marker: stamped with the current time on delete, null while active.
    pub fn timestamp(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            deleted_value: DeletedValue::Timestamp,
            not_deleted_value: None,
        }
    }

    /// Arbitrary marker values.
    pub fn value(
        field: impl Into<String>,
        deleted_value: impl Into<Bson>,
        not_deleted_value: Option<Bson>,
    ) -> Self {
        Self {
            field: field.into(),
            deleted_value: DeletedValue::Value(deleted_value.into()),
            not_deleted_value,
        }
    }

    pub fn with_not_deleted_value(mut self, value: impl Into<Bson>) -> Self {
        self.not_deleted_value = Some(value.into());
        self
    }

    /// The value to write when deleting a row.
    pub fn deleted_value_for_write(&self) -> Bson {
        match &self.deleted_value {
            DeletedValue::Value(value) => value.clone(),
            DeletedValue::Timestamp => Bson::DateTime(DateTime::now()),
        }
    }

    /// Resolves the value restore writes back.
    ///
    /// In priority order: the explicit `not_deleted_value`; the negation of a boolean
    /// `deleted_value`; null for timestamp fields (sentinel or a `Timestamp` column).
    ///
    /// # Errors
    ///
    /// Returns a `Database` error when none of these apply.
    pub fn resolve_not_deleted(&self, column: Option<ColumnKind>) -> ServiceResult<Bson> {
        if let Some(value) = &self.not_deleted_value {
            return Ok(value.clone());
        }

        match (&self.deleted_value, column) {
            (DeletedValue::Value(Bson::Boolean(deleted)), _) => Ok(Bson::Boolean(!deleted)),
            (DeletedValue::Timestamp, _) | (_, Some(ColumnKind::Timestamp)) => Ok(Bson::Null),
            _ => Err(ServiceError::database(format!(
                "notDeletedValue is required for non-boolean, non-sentinel fields (field '{}')",
                self.field
            ))),
        }
    }

    /// Predicate matching rows that are not deleted.
    pub fn active_predicate(&self) -> Expr {
        match &self.deleted_value {
            DeletedValue::Value(value) => Filter::ne(self.field.clone(), value.clone()),
            DeletedValue::Timestamp => Filter::is_null(self.field.clone()),
        }
    }

    /// Predicate matching rows that are deleted.
    pub fn deleted_predicate(&self) -> Expr {
        match &self.deleted_value {
            DeletedValue::Value(value) => Filter::eq(self.field.clone(), value.clone()),
            DeletedValue::Timestamp => Filter::is_not_null(self.field.clone()),
        }
    }
}

/// A soft-delete policy bound to the column it marks.
#[derive(Debug, Clone)]
pub struct SoftDeletePolicy {
    config: SoftDeleteConfig,
    column: ColumnKind,
}

impl SoftDeletePolicy {
    /// Binds `config` to the entity's column registry.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error when the marker field is not a declared column.
    pub fn bind(config: SoftDeleteConfig, entity: &EntityDescriptor) -> ServiceResult<Self> {
        let column = entity
            .column(&config.field)
            .map(|column| column.kind)
            .ok_or_else(|| {
                ServiceError::database(format!(
                    "soft delete field '{}' is not declared on entity '{}'",
                    config.field,
                    entity.table()
                ))
            })?;

        Ok(Self { config, column })
    }

    pub fn field(&self) -> &str {
        &self.config.field
    }

    pub fn config(&self) -> &SoftDeleteConfig {
        &self.config
    }

    pub fn deleted_value_for_write(&self) -> Bson {
        self.config.deleted_value_for_write()
    }

    pub fn not_deleted_value(&self) -> ServiceResult<Bson> {
        self.config.resolve_not_deleted(Some(self.column))
    }

    pub fn active_predicate(&self) -> Expr {
        self.config.active_predicate()
    }

    pub fn deleted_predicate(&self) -> Expr {
        self.config.deleted_predicate()
    }
}
