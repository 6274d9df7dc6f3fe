//! Error types and result types for data-access operations.
//!
//! Every fallible operation in this crate returns [`ServiceResult<T>`]. The error is a
//! closed enum so call sites discriminate with `match` rather than by probing types.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Represents every failure the service layer can surface.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The backend failed, or the service configuration is inconsistent.
    ///
    /// Carries the underlying cause when one is available.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
    /// Caller-supplied data failed a check before the action ran.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        /// The offending field, when known.
        field: Option<String>,
    },
    /// An operation that requires an existing row could not find it.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
}

impl ServiceError {
    /// Creates a `Database` error with no underlying cause.
    pub fn database(message: impl Into<String>) -> Self {
        ServiceError::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a backend or driver error as a `Database` error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ServiceError::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Creates a `Validation` error, optionally naming the rejected field.
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Creates a `NotFound` error for the given entity and identity.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Short tag for logs and batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Database { .. } => "DatabaseError",
            ServiceError::Validation { .. } => "ValidationError",
            ServiceError::NotFound { .. } => "NotFoundError",
        }
    }
}

/// A specialized `Result` type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<BsonError> for ServiceError {
    fn from(err: BsonError) -> Self {
        ServiceError::backend(err)
    }
}

impl From<SerdeJsonError> for ServiceError {
    fn from(err: SerdeJsonError) -> Self {
        ServiceError::backend(err)
    }
}
