//! In-memory implementation of the metadata store.
//!
//! # Purpose
//! Implements `AdapterStore` and `ModelStore` with `HashMap`s guarded by
//! `tokio::sync::RwLock`, for local development, tests, and deployments where
//! durability is not required.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Writes take the map's write lock, so a rename is atomic with respect to
//!   other writers.
//! - Stored records never keep a rule-storage handle; each read hands out a
//!   detached copy, matching what a durable backend returns.
use super::{AdapterStore, MetadataStore, ModelStore, StoreError, StoreResult};
use crate::model::{
    AdapterField, AdapterId, CasbinAdapter, FieldFilter, MASKED_PASSWORD, ModelDefinition, Page,
    PageRequest, SortOrder,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type ModelKey = (String, String);

#[derive(Default)]
pub struct InMemoryStore {
    /// Adapter configurations keyed by `(owner, name)`.
    adapters: Arc<RwLock<HashMap<AdapterId, CasbinAdapter>>>,
    /// Model definitions keyed by `(owner, name)`.
    models: Arc<RwLock<HashMap<ModelKey, ModelDefinition>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn filtered(&self, owner: &str, filter: Option<&FieldFilter>) -> Vec<CasbinAdapter> {
        self.adapters
            .read()
            .await
            .values()
            .filter(|adapter| owner.is_empty() || adapter.owner == owner)
            .filter(|adapter| {
                filter.is_none_or(|f| field_value(adapter, f.field).contains(f.value.as_str()))
            })
            .map(CasbinAdapter::detached)
            .collect()
    }
}

fn field_value(adapter: &CasbinAdapter, field: AdapterField) -> String {
    match field {
        AdapterField::Name => adapter.name.clone(),
        AdapterField::CreatedTime => adapter.created_time.clone(),
        AdapterField::Type => adapter.adapter_type.clone(),
        AdapterField::Model => adapter.model.clone(),
        AdapterField::Host => adapter.host.clone(),
        AdapterField::Port => adapter.port.to_string(),
        AdapterField::User => adapter.user.clone(),
        AdapterField::DatabaseType => adapter.database_type.to_string(),
        AdapterField::Database => adapter.database.clone(),
        AdapterField::Table => adapter.table.clone(),
        AdapterField::IsEnabled => adapter.is_enabled.to_string(),
    }
}

fn compare(a: &CasbinAdapter, b: &CasbinAdapter, field: AdapterField) -> Ordering {
    match field {
        AdapterField::Port => a.port.cmp(&b.port),
        AdapterField::IsEnabled => a.is_enabled.cmp(&b.is_enabled),
        other => field_value(a, other).cmp(&field_value(b, other)),
    }
}

fn sort_adapters(items: &mut [CasbinAdapter], field: AdapterField, order: SortOrder) {
    // Name breaks ties so listings are deterministic across HashMap iteration order.
    items.sort_by(|a, b| {
        let primary = compare(a, b, field).then_with(|| a.name.cmp(&b.name));
        match order {
            SortOrder::Ascend => primary,
            SortOrder::Descend => primary.reverse(),
        }
    });
}

#[async_trait]
impl AdapterStore for InMemoryStore {
    async fn list_adapters(&self, owner: &str) -> StoreResult<Vec<CasbinAdapter>> {
        let mut items = self.filtered(owner, None).await;
        sort_adapters(&mut items, AdapterField::CreatedTime, SortOrder::Descend);
        Ok(items)
    }

    async fn count_adapters(&self, owner: &str, request: &PageRequest) -> StoreResult<u64> {
        Ok(self.filtered(owner, request.filter.as_ref()).await.len() as u64)
    }

    async fn paginate_adapters(
        &self,
        owner: &str,
        request: &PageRequest,
    ) -> StoreResult<Page<CasbinAdapter>> {
        let mut items = self.filtered(owner, request.filter.as_ref()).await;
        let total = items.len() as u64;
        sort_adapters(&mut items, request.sort_field, request.sort_order);
        if let Some((offset, limit)) = request.window() {
            items = items
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }
        Ok(Page { items, total })
    }

    async fn get_adapter(&self, id: &AdapterId) -> StoreResult<Option<CasbinAdapter>> {
        if id.owner.is_empty() || id.name.is_empty() {
            return Ok(None);
        }
        Ok(self
            .adapters
            .read()
            .await
            .get(id)
            .map(CasbinAdapter::detached))
    }

    async fn add_adapter(&self, adapter: CasbinAdapter) -> StoreResult<bool> {
        let mut adapters = self.adapters.write().await;
        let id = adapter.id();
        if adapters.contains_key(&id) {
            return Err(StoreError::Conflict(format!("adapter {id} exists")));
        }
        adapters.insert(id, adapter.detached());
        Ok(true)
    }

    async fn update_adapter(&self, id: &AdapterId, adapter: CasbinAdapter) -> StoreResult<bool> {
        let mut adapters = self.adapters.write().await;
        let Some(existing) = adapters.get(id) else {
            return Ok(false);
        };
        let mut updated = adapter.detached();
        if updated.password == MASKED_PASSWORD {
            updated.password = existing.password.clone();
        }
        let new_id = updated.id();
        if new_id != *id && adapters.contains_key(&new_id) {
            return Err(StoreError::Conflict(format!("adapter {new_id} exists")));
        }
        adapters.remove(id);
        adapters.insert(new_id, updated);
        Ok(true)
    }

    async fn delete_adapter(&self, id: &AdapterId) -> StoreResult<bool> {
        Ok(self.adapters.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl ModelStore for InMemoryStore {
    async fn get_model(&self, owner: &str, name: &str) -> StoreResult<Option<ModelDefinition>> {
        let key = (owner.to_string(), name.to_string());
        Ok(self.models.read().await.get(&key).cloned())
    }

    async fn add_model(&self, model: ModelDefinition) -> StoreResult<bool> {
        let mut models = self.models.write().await;
        let key = (model.owner.clone(), model.name.clone());
        if models.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "model {}/{} exists",
                model.owner, model.name
            )));
        }
        models.insert(key, model);
        Ok(true)
    }

    async fn delete_model(&self, owner: &str, name: &str) -> StoreResult<bool> {
        let key = (owner.to_string(), name.to_string());
        Ok(self.models.write().await.remove(&key).is_some())
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
