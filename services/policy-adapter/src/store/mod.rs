//! Metadata storage for adapter configurations and model definitions.
//!
//! # Purpose
//! Defines the store traits consumed by the policy layer and the service
//! facade, with an in-memory and a Postgres implementation.
use crate::model::{AdapterId, CasbinAdapter, ModelDefinition, Page, PageRequest};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row store for adapter configurations, keyed by `(owner, name)`.
///
/// An empty `owner` means "every owner" for the listing operations.
/// Records returned from any method carry an empty rule-storage cache.
#[async_trait]
pub trait AdapterStore: Send + Sync {
    async fn list_adapters(&self, owner: &str) -> StoreResult<Vec<CasbinAdapter>>;
    async fn count_adapters(&self, owner: &str, request: &PageRequest) -> StoreResult<u64>;
    async fn paginate_adapters(
        &self,
        owner: &str,
        request: &PageRequest,
    ) -> StoreResult<Page<CasbinAdapter>>;
    async fn get_adapter(&self, id: &AdapterId) -> StoreResult<Option<CasbinAdapter>>;
    /// Insert; a duplicate id is a `Conflict`.
    async fn add_adapter(&self, adapter: CasbinAdapter) -> StoreResult<bool>;
    /// Overwrite every column of the record at `id`, which may rename it.
    /// A `***` password leaves the stored password unchanged.
    /// Returns `false` when `id` does not exist.
    async fn update_adapter(&self, id: &AdapterId, adapter: CasbinAdapter) -> StoreResult<bool>;
    async fn delete_adapter(&self, id: &AdapterId) -> StoreResult<bool>;
}

/// Lookup of owner-scoped model definitions.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn get_model(&self, owner: &str, name: &str) -> StoreResult<Option<ModelDefinition>>;
    async fn add_model(&self, model: ModelDefinition) -> StoreResult<bool>;
    async fn delete_model(&self, owner: &str, name: &str) -> StoreResult<bool>;
}

/// Combined store used by the service facade.
#[async_trait]
pub trait MetadataStore: AdapterStore + ModelStore {
    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
