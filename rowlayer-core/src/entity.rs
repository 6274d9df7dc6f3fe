//! Entity description and row conversion.
//!
//! An entity is a table-like data source with a selectable row shape (the implementing
//! type) and an insertable row shape ([`Entity::Insert`]). Its columns are declared once
//! in a typed registry, resolved into an [`EntityDescriptor`] when a service is built.
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
//! #[derive(Debug, Clone, Serialize)]
//! pub struct NewUser {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! impl Entity for User {
//!     type Insert = NewUser;
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

use std::collections::HashMap;

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ServiceError, ServiceResult};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Uuid,
    Json,
}

/// A column descriptor in an entity's registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Integer)
    }

    pub const fn float(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Float)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Boolean)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Timestamp)
    }

    pub const fn uuid(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Uuid)
    }

    pub const fn json(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Json)
    }
}

/// Core trait that every entity served by an [`EntityService`](crate::service::EntityService)
/// must implement.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// The insertable row shape.
    type Insert: Serialize + Send + Sync + 'static;

    /// Name of the backing table.
    fn table_name() -> &'static str;

    /// The column registry.
    fn columns() -> Vec<Column>;

    /// Column holding the creation timestamp. Drives cursor pagination.
    fn created_field() -> &'static str {
        "created_at"
    }

    /// Column holding the last-update timestamp.
    fn updated_field() -> &'static str {
        "updated_at"
    }
}

/// Per-entity facts resolved once at service construction.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    table: &'static str,
    columns: HashMap<&'static str, Column>,
    id_field: String,
    created_field: &'static str,
    updated_field: &'static str,
}

impl EntityDescriptor {
    /// Resolves the descriptor for `E`, using `id_override` as the identity field when given.
    ///
    /// # Errors
    ///
    /// Returns a `Database` error when the identity or timestamp columns are not part of
    /// the entity's column registry.
    pub fn resolve<E: Entity>(id_override: Option<&str>) -> ServiceResult<Self> {
        let columns = E::columns()
            .into_iter()
            .map(|column| (column.name, column))
            .collect::<HashMap<_, _>>();
        let id_field = id_override.unwrap_or("id").to_string();

        for required in [id_field.as_str(), E::created_field(), E::updated_field()] {
            if !columns.contains_key(required) {
                return Err(ServiceError::database(format!(
                    "column '{required}' is not declared on entity '{}'",
                    E::table_name()
                )));
            }
        }

        Ok(Self {
            table: E::table_name(),
            columns,
            id_field,
            created_field: E::created_field(),
            updated_field: E::updated_field(),
        })
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn created_field(&self) -> &'static str {
        self.created_field
    }

    pub fn updated_field(&self) -> &'static str {
        self.updated_field
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
}

/// Serializes a value into a row document.
pub fn to_row<T: Serialize>(value: &T) -> ServiceResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(ServiceError::validation(
            format!("expected a document-shaped value, got {:?}", other.element_type()),
            None,
        )),
    }
}

/// Deserializes a row document into `T`.
pub fn from_row<T: DeserializeOwned>(row: Document) -> ServiceResult<T> {
    Ok(deserialize_from_bson(Bson::Document(row))?)
}

/// Returns the value of `field` in `row`, treating a missing field as null.
pub fn field_value<'a>(row: &'a Document, field: &str) -> &'a Bson {
    const NULL: &Bson = &Bson::Null;

    row.get(field).unwrap_or(NULL)
}
