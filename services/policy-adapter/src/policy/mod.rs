//! Policy synchronization and enforcement-adapter lifecycle.
//!
//! # Purpose
//! Resolves adapter targets into rule storage, builds Casbin engines over it,
//! and exposes sync and single-rule mutation on top.
//!
//! # Where it fits
//! `service::PolicyAdapterService` loads a fresh adapter configuration from
//! the metadata store and hands it to `sync` or `mutate`, which go through
//! `factory::EnforcerFactory` for every call.
pub mod connection;
pub mod engine;
pub mod error;
pub mod factory;
pub mod mutate;
pub mod sql;
pub mod storage;
pub mod sync;

pub use connection::{resolve_connection_string, table_reference};
pub use engine::{CasbinEngine, PolicyEngine, parse_model};
pub use error::{PolicyError, PolicyResult};
pub use factory::EnforcerFactory;
pub use sql::SqlxRuleConnector;
pub use storage::{
    CachedStorage, MemoryRuleConnector, MemoryRuleStorage, RuleStorage, RuleStorageConnector,
    StorageTarget,
};
