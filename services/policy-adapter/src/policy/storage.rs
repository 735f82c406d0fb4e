//! Low-level rule storage behind an enforcer.
//!
//! # Purpose
//! A `RuleStorage` is the persistent side of one tenant's rule table: the
//! enforcer loads from it once per build and writes every successful
//! mutation through to it. A `RuleStorageConnector` opens one for a resolved
//! target.
//!
//! # Key invariants
//! - A handle is bound to exactly one `(connection string, table)` target.
//! - Connection strings carry credentials and never appear in `Debug` output.
use crate::model::{CasbinAdapter, CasbinRule, DatabaseKind};
use crate::policy::connection::{resolve_connection_string, table_reference};
use crate::policy::error::{PolicyError, PolicyResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[async_trait]
pub trait RuleStorage: Send + Sync {
    /// Every stored row, in insertion order.
    async fn load_rules(&self) -> PolicyResult<Vec<CasbinRule>>;
    async fn insert_rule(&self, rule: &CasbinRule) -> PolicyResult<()>;
    /// Delete every row equal to `rule`; `false` when none matched.
    async fn delete_rule(&self, rule: &CasbinRule) -> PolicyResult<bool>;
    /// Rewrite rows equal to `old` as `new`; `false` when none matched.
    async fn replace_rule(&self, old: &CasbinRule, new: &CasbinRule) -> PolicyResult<bool>;
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait RuleStorageConnector: Send + Sync {
    async fn open(&self, target: &StorageTarget) -> PolicyResult<Arc<dyn RuleStorage>>;
}

/// Resolved location of one rule table.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub database_type: DatabaseKind,
    pub connection_string: String,
    pub database: String,
    pub table: String,
}

impl StorageTarget {
    pub fn resolve(adapter: &CasbinAdapter, intranet: bool) -> Self {
        Self {
            database_type: adapter.database_type,
            connection_string: resolve_connection_string(adapter, intranet),
            database: adapter.database.clone(),
            table: table_reference(adapter),
        }
    }

    /// Credential-free label for logs and errors.
    pub fn label(&self) -> String {
        format!("{}:{}/{}", self.database_type, self.database, self.table)
    }
}

impl fmt::Debug for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageTarget")
            .field("database_type", &self.database_type)
            .field("connection_string", &"[REDACTED]")
            .field("database", &self.database)
            .field("table", &self.table)
            .finish()
    }
}

/// Opened handle plus the target it was opened for.
#[derive(Clone)]
pub struct CachedStorage {
    target: StorageTarget,
    storage: Arc<dyn RuleStorage>,
}

impl CachedStorage {
    pub fn new(target: StorageTarget, storage: Arc<dyn RuleStorage>) -> Self {
        Self { target, storage }
    }

    pub fn target(&self) -> &StorageTarget {
        &self.target
    }

    pub fn storage(&self) -> Arc<dyn RuleStorage> {
        Arc::clone(&self.storage)
    }
}

impl fmt::Debug for CachedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedStorage")
            .field("target", &self.target)
            .field("backend", &self.storage.backend_name())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct MemoryRuleStorage {
    rules: RwLock<Vec<CasbinRule>>,
}

impl MemoryRuleStorage {
    pub async fn snapshot(&self) -> Vec<CasbinRule> {
        self.rules.read().await.clone()
    }
}

#[async_trait]
impl RuleStorage for MemoryRuleStorage {
    async fn load_rules(&self) -> PolicyResult<Vec<CasbinRule>> {
        Ok(self.snapshot().await)
    }

    async fn insert_rule(&self, rule: &CasbinRule) -> PolicyResult<()> {
        self.rules.write().await.push(rule.clone());
        Ok(())
    }

    async fn delete_rule(&self, rule: &CasbinRule) -> PolicyResult<bool> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|stored| stored != rule);
        Ok(rules.len() != before)
    }

    async fn replace_rule(&self, old: &CasbinRule, new: &CasbinRule) -> PolicyResult<bool> {
        let mut rules = self.rules.write().await;
        let mut changed = false;
        for stored in rules.iter_mut().filter(|stored| *stored == old) {
            *stored = new.clone();
            changed = true;
        }
        Ok(changed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

type TableKey = (String, String);

/// Connector over process-local tables, keyed by connection string and table.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleConnector {
    tables: Arc<RwLock<HashMap<TableKey, Arc<MemoryRuleStorage>>>>,
    opens: Arc<AtomicUsize>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryRuleConnector {
    /// A connector whose every `open` fails with a connectivity error.
    pub fn unreachable() -> Self {
        let connector = Self::default();
        connector.set_reachable(false);
        connector
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Number of successful `open` calls.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The table behind `target`, created empty on first access.
    pub async fn table(&self, target: &StorageTarget) -> Arc<MemoryRuleStorage> {
        let key = (target.connection_string.clone(), target.table.clone());
        let mut tables = self.tables.write().await;
        Arc::clone(tables.entry(key).or_default())
    }
}

#[async_trait]
impl RuleStorageConnector for MemoryRuleConnector {
    async fn open(&self, target: &StorageTarget) -> PolicyResult<Arc<dyn RuleStorage>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PolicyError::Connectivity(format!(
                "{} is unreachable",
                target.label()
            )));
        }
        let table: Arc<dyn RuleStorage> = self.table(target).await;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(table: &str) -> StorageTarget {
        StorageTarget {
            database_type: DatabaseKind::Postgres,
            connection_string: "user=u password=secret host=h port=5432".to_string(),
            database: "d".to_string(),
            table: table.to_string(),
        }
    }

    fn rule(values: &[&str]) -> CasbinRule {
        let fields: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        CasbinRule::from_fields("p", &fields)
    }

    #[test]
    fn target_debug_hides_connection_string() {
        let rendered = format!("{:?}", target("casbin_rule"));
        assert!(!rendered.contains("secret"));
        assert_eq!(target("casbin_rule").label(), "postgres:d/casbin_rule");
    }

    #[test]
    fn resolve_uses_table_reference() {
        let adapter = CasbinAdapter {
            database_type: DatabaseKind::Mssql,
            table: "casbin_rule".into(),
            ..Default::default()
        };
        let resolved = StorageTarget::resolve(&adapter, false);
        assert_eq!(resolved.table, "[casbin_rule]");
        assert!(resolved.connection_string.starts_with("sqlserver://"));
    }

    #[tokio::test]
    async fn memory_storage_keeps_insertion_order() {
        let storage = MemoryRuleStorage::default();
        storage.insert_rule(&rule(&["bob", "data2"])).await.expect("insert");
        storage.insert_rule(&rule(&["alice", "data1"])).await.expect("insert");
        let rows = storage.load_rules().await.expect("load");
        assert_eq!(rows[0].v0, "bob");
        assert_eq!(rows[1].v0, "alice");
    }

    #[tokio::test]
    async fn memory_storage_delete_and_replace_report_matches() {
        let storage = MemoryRuleStorage::default();
        storage.insert_rule(&rule(&["alice", "data1"])).await.expect("insert");

        assert!(!storage.delete_rule(&rule(&["bob"])).await.expect("delete"));
        assert!(
            storage
                .replace_rule(&rule(&["alice", "data1"]), &rule(&["alice", "data9"]))
                .await
                .expect("replace")
        );
        assert!(
            !storage
                .replace_rule(&rule(&["alice", "data1"]), &rule(&["x"]))
                .await
                .expect("replace")
        );
        assert!(storage.delete_rule(&rule(&["alice", "data9"])).await.expect("delete"));
        assert!(storage.load_rules().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn connector_shares_tables_per_target() {
        let connector = MemoryRuleConnector::default();
        let first = connector.open(&target("t1")).await.expect("open");
        first.insert_rule(&rule(&["alice"])).await.expect("insert");

        let again = connector.open(&target("t1")).await.expect("open");
        assert_eq!(again.load_rules().await.expect("load").len(), 1);
        let other = connector.open(&target("t2")).await.expect("open");
        assert!(other.load_rules().await.expect("load").is_empty());
        assert_eq!(connector.opens(), 3);
    }

    #[tokio::test]
    async fn unreachable_connector_fails_without_counting() {
        let connector = MemoryRuleConnector::unreachable();
        let err = connector.open(&target("t1")).await.err().expect("unreachable");
        assert!(matches!(err, PolicyError::Connectivity(_)));
        assert!(!err.to_string().contains("secret"));
        assert_eq!(connector.opens(), 0);

        connector.set_reachable(true);
        connector.open(&target("t1")).await.expect("open");
        assert_eq!(connector.opens(), 1);
    }
}
