//! Enforcer construction for adapter configurations.
//!
//! # Purpose
//! Combines an adapter's resolved storage target with model text into a
//! loaded `CasbinEngine`, opening the rule storage at most once per
//! configuration object.
//!
//! # Key invariants
//! - The handle cached on a `CasbinAdapter` is never replaced. When the
//!   object's target changes after the handle was opened, the cached handle is
//!   kept and a warning is logged.
//! - A failed open leaves the cache empty so a later call can retry.
//! - No partial engine is returned: any failure aborts the build.
use crate::model::CasbinAdapter;
use crate::policy::engine::{CasbinEngine, parse_model};
use crate::policy::error::{PolicyError, PolicyResult};
use crate::policy::storage::{CachedStorage, RuleStorage, RuleStorageConnector, StorageTarget};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct EnforcerFactory {
    connector: Arc<dyn RuleStorageConnector>,
    intranet: bool,
}

impl EnforcerFactory {
    /// `intranet` selects whether `dbi.` hosts are kept as-is.
    pub fn new(connector: Arc<dyn RuleStorageConnector>, intranet: bool) -> Self {
        Self {
            connector,
            intranet,
        }
    }

    pub fn intranet(&self) -> bool {
        self.intranet
    }

    /// Build an engine for `adapter` using `model_text`.
    ///
    /// # Errors
    /// - Storage open failures (`Connectivity`, `UnsupportedDatabase`,
    ///   `Validation`, `InvalidTarget`, `Storage`).
    /// - `InvalidModel` for malformed model text.
    /// - `Upstream` when Casbin rejects a stored rule.
    #[instrument(skip_all, fields(adapter = %adapter.id()))]
    pub async fn build_enforcer(
        &self,
        model_text: &str,
        adapter: &CasbinAdapter,
    ) -> PolicyResult<CasbinEngine> {
        let result = self.try_build(model_text, adapter).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("policy_adapter_enforcer_builds_total", "result" => outcome)
            .increment(1);
        if let Err(err) = &result {
            warn!(error = %err, "enforcer build failed");
        }
        result
    }

    async fn try_build(&self, model_text: &str, adapter: &CasbinAdapter) -> PolicyResult<CasbinEngine> {
        let storage = self.storage_for(adapter).await?;
        let model = parse_model(model_text).await?;
        CasbinEngine::load(model, storage).await
    }

    async fn storage_for(&self, adapter: &CasbinAdapter) -> PolicyResult<Arc<dyn RuleStorage>> {
        let target = StorageTarget::resolve(adapter, self.intranet);
        let cached = adapter
            .storage
            .get_or_try_init(|| async {
                let storage = self.connector.open(&target).await?;
                metrics::counter!("policy_adapter_storage_opens_total").increment(1);
                info!(
                    rule_table = %target.label(),
                    backend = storage.backend_name(),
                    "cached rule storage handle"
                );
                Ok::<_, PolicyError>(CachedStorage::new(target.clone(), storage))
            })
            .await?;

        if cached.target() != &target {
            warn!(
                cached = %cached.target().label(),
                requested = %target.label(),
                "adapter target changed after the rule storage was opened; keeping the cached handle"
            );
        }
        Ok(cached.storage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CasbinRule, DatabaseKind};
    use crate::policy::engine::PolicyEngine;
    use crate::policy::engine::tests::RBAC_MODEL;
    use crate::policy::storage::MemoryRuleConnector;

    fn adapter() -> CasbinAdapter {
        CasbinAdapter {
            owner: "built-in".into(),
            name: "rules".into(),
            model: "rbac".into(),
            database_type: DatabaseKind::Postgres,
            host: "dbi.example.com".into(),
            port: 5432,
            database: "casdoor".into(),
            table: "casbin_rule".into(),
            ..Default::default()
        }
    }

    fn factory(connector: &MemoryRuleConnector) -> EnforcerFactory {
        EnforcerFactory::new(Arc::new(connector.clone()), false)
    }

    #[tokio::test]
    async fn unreachable_storage_leaves_cache_empty() {
        let connector = MemoryRuleConnector::unreachable();
        let adapter = adapter();
        let err = factory(&connector)
            .build_enforcer(RBAC_MODEL, &adapter)
            .await
            .err()
            .expect("unreachable");
        assert!(matches!(err, PolicyError::Connectivity(_)));
        assert!(!adapter.has_cached_storage());

        connector.set_reachable(true);
        factory(&connector)
            .build_enforcer(RBAC_MODEL, &adapter)
            .await
            .expect("retry succeeds");
        assert!(adapter.has_cached_storage());
    }

    #[tokio::test]
    async fn handle_is_opened_once_per_object() {
        let connector = MemoryRuleConnector::default();
        let factory = factory(&connector);
        let adapter = adapter();

        factory.build_enforcer(RBAC_MODEL, &adapter).await.expect("first");
        factory.build_enforcer(RBAC_MODEL, &adapter).await.expect("second");
        assert_eq!(connector.opens(), 1);

        factory
            .build_enforcer(RBAC_MODEL, &adapter.detached())
            .await
            .expect("detached");
        assert_eq!(connector.opens(), 2);
    }

    #[tokio::test]
    async fn concurrent_first_builds_open_once() {
        let connector = MemoryRuleConnector::default();
        let factory = factory(&connector);
        let adapter = adapter();

        let (first, second, third) = tokio::join!(
            factory.build_enforcer(RBAC_MODEL, &adapter),
            factory.build_enforcer(RBAC_MODEL, &adapter),
            factory.build_enforcer(RBAC_MODEL, &adapter),
        );
        assert!(first.is_ok() && second.is_ok() && third.is_ok());
        assert_eq!(connector.opens(), 1);
    }

    #[tokio::test]
    async fn changed_target_keeps_cached_handle() {
        let connector = MemoryRuleConnector::default();
        let factory = factory(&connector);
        let mut adapter = adapter();

        let mut engine = factory.build_enforcer(RBAC_MODEL, &adapter).await.expect("build");
        engine
            .add_policy(vec!["alice".into(), "data1".into(), "read".into()])
            .await
            .expect("add");

        adapter.table = "other_rules".into();
        let engine = factory.build_enforcer(RBAC_MODEL, &adapter).await.expect("rebuild");
        assert_eq!(connector.opens(), 1);
        assert_eq!(engine.policy_rows().len(), 1);
    }

    #[tokio::test]
    async fn malformed_model_fails_after_opening_storage() {
        let connector = MemoryRuleConnector::default();
        let adapter = adapter();
        let err = factory(&connector)
            .build_enforcer("[request_definition]\nr = sub\n", &adapter)
            .await
            .err()
            .expect("invalid model");
        assert!(matches!(err, PolicyError::InvalidModel(_)));
        assert!(adapter.has_cached_storage());
    }

    #[tokio::test]
    async fn intranet_flag_selects_rule_table() {
        let connector = MemoryRuleConnector::default();
        let adapter = adapter();
        let public = StorageTarget::resolve(&adapter, false);
        connector
            .table(&public)
            .await
            .insert_rule(&CasbinRule::from_fields(
                "p",
                &["alice".to_string(), "data1".to_string(), "read".to_string()],
            ))
            .await
            .expect("seed");

        let engine = EnforcerFactory::new(Arc::new(connector.clone()), true)
            .build_enforcer(RBAC_MODEL, &adapter)
            .await
            .expect("intranet");
        assert!(engine.policy_rows().is_empty());

        let engine = factory(&connector)
            .build_enforcer(RBAC_MODEL, &adapter.detached())
            .await
            .expect("public");
        assert_eq!(engine.policy_rows().len(), 1);
    }
}
