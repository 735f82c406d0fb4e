//! Adapter configuration records.
//!
//! # Purpose
//! Defines the tenant-scoped binding between a rule-storage target and an
//! authorization model, plus the composite `owner/name` identifier used by
//! every adapter operation.
//!
//! # Key invariants
//! - `(owner, name)` is unique; the store enforces it.
//! - The cached rule-storage handle is process-local: it is never serialized,
//!   never persisted, and set at most once per object.
use crate::policy::storage::CachedStorage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::OnceCell;

/// Password value that means "leave the stored password unchanged".
pub const MASKED_PASSWORD: &str = "***";

/// Database engines a rule table may live in.
///
/// Anything other than `postgres` or `mssql`, the empty string included,
/// reads as MySQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum DatabaseKind {
    #[default]
    Mysql,
    Postgres,
    Mssql,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Mysql => "mysql",
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mssql => "mssql",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for DatabaseKind {
    fn from(value: &str) -> Self {
        match value {
            "postgres" => DatabaseKind::Postgres,
            "mssql" => DatabaseKind::Mssql,
            _ => DatabaseKind::Mysql,
        }
    }
}

impl From<String> for DatabaseKind {
    fn from(value: String) -> Self {
        DatabaseKind::from(value.as_str())
    }
}

/// Composite `owner/name` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdapterId {
    pub owner: String,
    pub name: String,
}

impl AdapterId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl FromStr for AdapterId {
    type Err = String;

    /// Split on the first `/`. Names may not contain a second separator.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once('/') {
            Some((owner, name)) if !name.contains('/') => Ok(AdapterId::new(owner, name)),
            _ => Err(format!("malformed id {value:?}, expected \"owner/name\"")),
        }
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One tenant's policy-storage binding.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasbinAdapter {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub created_time: String,

    #[serde(rename = "type", default)]
    pub adapter_type: String,
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database_type: DatabaseKind,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub is_enabled: bool,

    #[serde(skip)]
    pub(crate) storage: OnceCell<CachedStorage>,
}

impl CasbinAdapter {
    /// Adapter with the given identity and every other field at its default.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> AdapterId {
        AdapterId::new(self.owner.clone(), self.name.clone())
    }

    /// Identifier of the linked model, scoped to this adapter's owner.
    pub fn model_id(&self) -> AdapterId {
        AdapterId::new(self.owner.clone(), self.model.clone())
    }

    /// Whether a rule-storage handle has been opened for this object.
    pub fn has_cached_storage(&self) -> bool {
        self.storage.initialized()
    }

    /// Copy of the persistent fields with an empty handle cache.
    pub fn detached(&self) -> Self {
        Self {
            storage: OnceCell::new(),
            ..self.clone()
        }
    }

    /// Copy suitable for echoing to clients: a set password becomes `***`.
    pub fn masked(&self) -> Self {
        let mut copy = self.detached();
        if !copy.password.is_empty() {
            copy.password = MASKED_PASSWORD.to_string();
        }
        copy
    }
}

impl fmt::Debug for CasbinAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CasbinAdapter")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("created_time", &self.created_time)
            .field("adapter_type", &self.adapter_type)
            .field("model", &self.model)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database_type", &self.database_type)
            .field("database", &self.database)
            .field("table", &self.table)
            .field("is_enabled", &self.is_enabled)
            .field("has_cached_storage", &self.has_cached_storage())
            .finish()
    }
}
