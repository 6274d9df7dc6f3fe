//! Per-entity service configuration.
//!
//! A [`ServiceConfig`] is built once, handed to the service at construction time and never
//! changed afterwards. It can be assembled with [`ServiceConfig::builder`] or deserialized
//! from any serde format; missing fields take their defaults.
//!
//! ```ignore
//! use rowlayer::config::ServiceConfig;
//! use rowlayer::soft_delete::SoftDeleteConfig;
//!
//! let config = ServiceConfig::builder()
//!     .max_limit(200)
//!     .batch_size(50)
//!     .soft(SoftDeleteConfig::timestamp("deleted_at"))
//!     .build();
//! ```

use serde::{Deserialize, Serialize};

use crate::soft_delete::SoftDeleteConfig;

pub const DEFAULT_LIMIT: usize = 100;
pub const DEFAULT_MAX_LIMIT: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Immutable service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Page size used when a page is requested without a limit.
    pub default_limit: usize,
    /// Upper bound on any page size.
    pub max_limit: usize,
    /// Chunk size for bulk operations.
    pub batch_size: usize,
    /// Soft-delete policy. `None` makes the entity hard-delete only.
    pub soft: Option<SoftDeleteConfig>,
    /// Identity field override. Defaults to `id`.
    pub id: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            soft: None,
            id: None,
        }
    }
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Effective page size: the requested limit (or the default) capped by `max_limit`,
    /// never below one.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
            .max(1)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn default_limit(mut self, default_limit: usize) -> Self {
        self.config.default_limit = default_limit;
        self
    }

    pub fn max_limit(mut self, max_limit: usize) -> Self {
        self.config.max_limit = max_limit;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn soft(mut self, soft: SoftDeleteConfig) -> Self {
        self.config.soft = Some(soft);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = Some(id.into());
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.config
    }
}
