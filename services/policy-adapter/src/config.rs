use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::fs;

pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RULE_POOL_MAX_CONNECTIONS: u32 = 4;
pub const DEFAULT_RULE_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

// Metadata database for adapters and models.
#[derive(Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .finish()
    }
}

// Pool settings applied to every tenant rule table connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulePoolConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for RulePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_RULE_POOL_MAX_CONNECTIONS,
            acquire_timeout_ms: DEFAULT_RULE_ACQUIRE_TIMEOUT_MS,
        }
    }
}

// Service configuration sourced from environment variables, optionally
// overridden by a YAML file named in POLICY_ADAPTER_CONFIG.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub cloud_intranet: bool,
    pub rule_pool: RulePoolConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Memory,
            postgres: None,
            cloud_intranet: false,
            rule_pool: RulePoolConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServiceConfigOverride {
    storage: Option<StorageBackend>,
    postgres_url: Option<String>,
    postgres_max_connections: Option<u32>,
    postgres_acquire_timeout_ms: Option<u64>,
    cloud_intranet: Option<bool>,
    rule_pool_max_connections: Option<u32>,
    rule_acquire_timeout_ms: Option<u64>,
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => Ok(Some(
            value
                .trim()
                .parse()
                .with_context(|| format!("parse {key}"))?,
        )),
        Err(_) => Ok(None),
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let storage = match std::env::var("POLICY_ADAPTER_STORAGE") {
            Ok(value) => StorageBackend::parse(&value).context("parse POLICY_ADAPTER_STORAGE")?,
            Err(_) => StorageBackend::Memory,
        };
        let postgres = match std::env::var("POLICY_ADAPTER_POSTGRES_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse("POLICY_ADAPTER_POSTGRES_MAX_CONNECTIONS")?
                    .unwrap_or(DEFAULT_PG_MAX_CONNECTIONS),
                acquire_timeout_ms: env_parse("POLICY_ADAPTER_POSTGRES_ACQUIRE_TIMEOUT_MS")?
                    .unwrap_or(DEFAULT_PG_ACQUIRE_TIMEOUT_MS),
            }),
            Err(_) => None,
        };
        let cloud_intranet = env_parse("POLICY_ADAPTER_CLOUD_INTRANET")?.unwrap_or(false);
        let rule_pool = RulePoolConfig {
            max_connections: env_parse("POLICY_ADAPTER_RULE_POOL_MAX_CONNECTIONS")?
                .unwrap_or(DEFAULT_RULE_POOL_MAX_CONNECTIONS),
            acquire_timeout_ms: env_parse("POLICY_ADAPTER_RULE_ACQUIRE_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_RULE_ACQUIRE_TIMEOUT_MS),
        };
        Ok(Self {
            storage,
            postgres,
            cloud_intranet,
            rule_pool,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("POLICY_ADAPTER_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read POLICY_ADAPTER_CONFIG: {path}"))?;
            let override_cfg: ServiceConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse policy adapter config yaml")?;
            config.apply(override_cfg);
        }
        Ok(config)
    }

    fn apply(&mut self, override_cfg: ServiceConfigOverride) {
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(url) = override_cfg.postgres_url {
            let pg = self.postgres.get_or_insert_with(|| PostgresConfig {
                url: String::new(),
                max_connections: DEFAULT_PG_MAX_CONNECTIONS,
                acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
            });
            pg.url = url;
        }
        if let Some(pg) = self.postgres.as_mut() {
            if let Some(value) = override_cfg.postgres_max_connections {
                pg.max_connections = value;
            }
            if let Some(value) = override_cfg.postgres_acquire_timeout_ms {
                pg.acquire_timeout_ms = value;
            }
        }
        if let Some(value) = override_cfg.cloud_intranet {
            self.cloud_intranet = value;
        }
        if let Some(value) = override_cfg.rule_pool_max_connections {
            self.rule_pool.max_connections = value;
        }
        if let Some(value) = override_cfg.rule_acquire_timeout_ms {
            self.rule_pool.acquire_timeout_ms = value;
        }
    }
}
