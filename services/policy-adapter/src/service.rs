//! Service facade over adapter storage and policy operations.
//!
//! # Purpose
//! Exposes every adapter, model and policy operation by id. Each policy call
//! loads a fresh adapter configuration from the metadata store, so the rule
//! storage handle cached on it lives for that call only.
use crate::config::{ServiceConfig, StorageBackend};
use crate::model::{AdapterId, CasbinAdapter, CasbinRule, ModelDefinition, Page, PageRequest};
use crate::policy::error::{PolicyError, PolicyResult};
use crate::policy::factory::EnforcerFactory;
use crate::policy::sql::SqlxRuleConnector;
use crate::policy::{mutate, sync};
use crate::store::MetadataStore;
use crate::store::memory::InMemoryStore;
use crate::store::postgres::PostgresStore;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct PolicyAdapterService {
    store: Arc<dyn MetadataStore>,
    factory: EnforcerFactory,
}

fn parse_id(id: &str) -> PolicyResult<AdapterId> {
    id.parse().map_err(PolicyError::Validation)
}

impl PolicyAdapterService {
    pub fn new(store: Arc<dyn MetadataStore>, factory: EnforcerFactory) -> Self {
        Self { store, factory }
    }

    /// Wire the configured metadata store with the sqlx rule connector.
    pub async fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn MetadataStore> = match config.storage {
            StorageBackend::Memory => Arc::new(InMemoryStore::new()),
            StorageBackend::Postgres => {
                let pg = config
                    .postgres
                    .as_ref()
                    .context("postgres configuration missing")?;
                Arc::new(PostgresStore::connect(pg).await?)
            }
        };
        let connector = Arc::new(SqlxRuleConnector::new(config.rule_pool));
        info!(
            backend = store.backend_name(),
            durable = store.is_durable(),
            cloud_intranet = config.cloud_intranet,
            "policy adapter service ready"
        );
        Ok(Self::new(
            store,
            EnforcerFactory::new(connector, config.cloud_intranet),
        ))
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn factory(&self) -> &EnforcerFactory {
        &self.factory
    }

    /// Adapters of `owner` (every owner when empty), newest first.
    pub async fn list_adapters(&self, owner: &str) -> PolicyResult<Vec<CasbinAdapter>> {
        Ok(self.store.list_adapters(owner).await?)
    }

    pub async fn count_adapters(&self, owner: &str, field: &str, value: &str) -> PolicyResult<u64> {
        let request = PageRequest::from_params(field, value, "", "", None, None)
            .map_err(PolicyError::Validation)?;
        Ok(self.store.count_adapters(owner, &request).await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn paginate_adapters(
        &self,
        owner: &str,
        field: &str,
        value: &str,
        sort_field: &str,
        sort_order: &str,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> PolicyResult<Page<CasbinAdapter>> {
        let request = PageRequest::from_params(field, value, sort_field, sort_order, offset, limit)
            .map_err(PolicyError::Validation)?;
        Ok(self.store.paginate_adapters(owner, &request).await?)
    }

    /// `None` for an unknown id or one with an empty owner or name.
    pub async fn get_adapter(&self, id: &str) -> PolicyResult<Option<CasbinAdapter>> {
        let id = parse_id(id)?;
        Ok(self.store.get_adapter(&id).await?)
    }

    pub async fn add_adapter(&self, mut adapter: CasbinAdapter) -> PolicyResult<bool> {
        if adapter.owner.is_empty() || adapter.name.is_empty() {
            return Err(PolicyError::Validation(
                "adapter owner and name are required".to_string(),
            ));
        }
        if adapter.created_time.is_empty() {
            adapter.created_time = chrono::Utc::now().to_rfc3339();
        }
        Ok(self.store.add_adapter(adapter).await?)
    }

    /// Overwrite the adapter stored at `id`. A `***` password keeps the stored
    /// one; a changed owner or name renames the record.
    pub async fn update_adapter(&self, id: &str, adapter: CasbinAdapter) -> PolicyResult<bool> {
        let id = parse_id(id)?;
        Ok(self.store.update_adapter(&id, adapter).await?)
    }

    pub async fn delete_adapter(&self, adapter: &CasbinAdapter) -> PolicyResult<bool> {
        Ok(self.store.delete_adapter(&adapter.id()).await?)
    }

    async fn load_adapter(&self, id: &str) -> PolicyResult<CasbinAdapter> {
        self.get_adapter(id)
            .await?
            .ok_or_else(|| PolicyError::AdapterNotFound(id.to_string()))
    }

    pub async fn sync_policies(&self, id: &str) -> PolicyResult<Vec<CasbinRule>> {
        let adapter = self.load_adapter(id).await?;
        sync::sync_policies(self.store.as_ref(), &self.factory, &adapter).await
    }

    pub async fn add_policy(&self, id: &str, rule: Vec<String>) -> PolicyResult<bool> {
        let adapter = self.load_adapter(id).await?;
        mutate::add_policy(self.store.as_ref(), &self.factory, &adapter, rule).await
    }

    pub async fn remove_policy(&self, id: &str, rule: Vec<String>) -> PolicyResult<bool> {
        let adapter = self.load_adapter(id).await?;
        mutate::remove_policy(self.store.as_ref(), &self.factory, &adapter, rule).await
    }

    pub async fn update_policy(
        &self,
        id: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> PolicyResult<bool> {
        let adapter = self.load_adapter(id).await?;
        mutate::update_policy(self.store.as_ref(), &self.factory, &adapter, old, new).await
    }

    pub async fn get_model(&self, id: &str) -> PolicyResult<Option<ModelDefinition>> {
        let id = parse_id(id)?;
        Ok(self.store.get_model(&id.owner, &id.name).await?)
    }

    pub async fn add_model(&self, mut model: ModelDefinition) -> PolicyResult<bool> {
        if model.owner.is_empty() || model.name.is_empty() {
            return Err(PolicyError::Validation(
                "model owner and name are required".to_string(),
            ));
        }
        if model.created_time.is_empty() {
            model.created_time = chrono::Utc::now().to_rfc3339();
        }
        Ok(self.store.add_model(model).await?)
    }

    pub async fn delete_model(&self, id: &str) -> PolicyResult<bool> {
        let id = parse_id(id)?;
        Ok(self.store.delete_model(&id.owner, &id.name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostgresConfig;

    #[tokio::test]
    async fn from_config_defaults_to_memory_store() {
        let service = PolicyAdapterService::from_config(&ServiceConfig::default())
            .await
            .expect("service");
        assert_eq!(service.store().backend_name(), "memory");
        assert!(!service.factory().intranet());
    }

    #[tokio::test]
    async fn from_config_requires_postgres_settings() {
        let config = ServiceConfig {
            storage: StorageBackend::Postgres,
            ..Default::default()
        };
        let err = PolicyAdapterService::from_config(&config)
            .await
            .err()
            .expect("missing postgres");
        assert!(err.to_string().contains("postgres configuration missing"));

        let unreachable = ServiceConfig {
            storage: StorageBackend::Postgres,
            postgres: Some(PostgresConfig {
                url: "postgres://casbin:pw@127.0.0.1:1/meta".to_string(),
                max_connections: 1,
                acquire_timeout_ms: 200,
            }),
            ..Default::default()
        };
        assert!(PolicyAdapterService::from_config(&unreachable).await.is_err());
    }

    #[tokio::test]
    async fn add_adapter_stamps_created_time_and_requires_identity() {
        let service = PolicyAdapterService::from_config(&ServiceConfig::default())
            .await
            .expect("service");
        let err = service
            .add_adapter(CasbinAdapter::default())
            .await
            .expect_err("no identity");
        assert!(matches!(err, PolicyError::Validation(_)));

        let adapter = CasbinAdapter {
            owner: "built-in".into(),
            name: "rules".into(),
            ..Default::default()
        };
        assert!(service.add_adapter(adapter).await.expect("add"));
        let stored = service
            .get_adapter("built-in/rules")
            .await
            .expect("get")
            .expect("stored");
        assert!(chrono::DateTime::parse_from_rfc3339(&stored.created_time).is_ok());
    }

    #[tokio::test]
    async fn malformed_ids_are_validation_errors() {
        let service = PolicyAdapterService::from_config(&ServiceConfig::default())
            .await
            .expect("service");
        let err = service.get_adapter("no-separator").await.expect_err("bad id");
        assert!(matches!(err, PolicyError::Validation(_)));
        let err = service.sync_policies("built-in/missing").await.expect_err("missing");
        assert!(matches!(err, PolicyError::AdapterNotFound(_)));
    }
}
