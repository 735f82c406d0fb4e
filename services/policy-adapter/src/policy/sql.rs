//! sqlx-backed rule tables for postgres and mysql targets.
//!
//! # Purpose
//! Opens a small connection pool for one tenant's rule table and implements
//! `RuleStorage` over it. The table is created on open when missing.
//!
//! # Key invariants
//! - Table names are interpolated into SQL, so only plain identifiers
//!   (`[A-Za-z0-9_]`) are accepted.
//! - Connection strings arrive in driver DSN form and are parsed back into
//!   typed connect options; they are never logged.
//! - mssql has no driver here and is rejected with `UnsupportedDatabase`.
use crate::config::RulePoolConfig;
use crate::model::{CasbinRule, DatabaseKind};
use crate::policy::error::{PolicyError, PolicyResult};
use crate::policy::storage::{RuleStorage, RuleStorageConnector, StorageTarget};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::query::Query;
use sqlx::{Database, Encode, FromRow, Type};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, FromRow)]
struct DbRule {
    ptype: String,
    v0: String,
    v1: String,
    v2: String,
    v3: String,
    v4: String,
    v5: String,
}

impl From<DbRule> for CasbinRule {
    fn from(row: DbRule) -> Self {
        CasbinRule {
            ptype: row.ptype,
            v0: row.v0,
            v1: row.v1,
            v2: row.v2,
            v3: row.v3,
            v4: row.v4,
            v5: row.v5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::MySql => "?".to_string(),
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Dialect::Postgres => "id BIGSERIAL PRIMARY KEY",
            Dialect::MySql => "id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY",
        }
    }
}

const VALUE_COLUMNS: [&str; 6] = ["v0", "v1", "v2", "v3", "v4", "v5"];

/// Statements for one table, rendered once per open.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RuleStatements {
    create: String,
    load: String,
    insert: String,
    delete: String,
    replace: String,
}

impl RuleStatements {
    fn render(dialect: Dialect, table: &str) -> Self {
        let columns = std::iter::once("ptype")
            .chain(VALUE_COLUMNS)
            .collect::<Vec<_>>();
        let column_defs = columns
            .iter()
            .map(|column| format!("{column} VARCHAR(100) NOT NULL DEFAULT ''"))
            .collect::<Vec<_>>()
            .join(", ");
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {table} ({}, {column_defs})",
            dialect.id_column()
        );
        let load = format!("SELECT {} FROM {table} ORDER BY id", columns.join(", "));
        let placeholders = (1..=columns.len())
            .map(|i| dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        let matches = |offset: usize| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| format!("{column} = {}", dialect.placeholder(offset + i + 1)))
                .collect::<Vec<_>>()
                .join(" AND ")
        };
        let delete = format!("DELETE FROM {table} WHERE {}", matches(0));
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = {}", dialect.placeholder(i + 1)))
            .collect::<Vec<_>>()
            .join(", ");
        let replace = format!(
            "UPDATE {table} SET {assignments} WHERE {}",
            matches(columns.len())
        );
        Self {
            create,
            load,
            insert,
            delete,
            replace,
        }
    }
}

fn bind_rule<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    rule: &'q CasbinRule,
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    &'q str: Encode<'q, DB> + Type<DB>,
{
    query = query.bind(rule.ptype.as_str());
    for value in rule.values() {
        query = query.bind(value);
    }
    query
}

enum RulePool {
    Postgres(PgPool),
    MySql(MySqlPool),
}

pub struct SqlRuleStorage {
    pool: RulePool,
    statements: RuleStatements,
}

impl SqlRuleStorage {
    async fn create_table(&self) -> PolicyResult<()> {
        match &self.pool {
            RulePool::Postgres(pool) => {
                sqlx::query(&self.statements.create).execute(pool).await?;
            }
            RulePool::MySql(pool) => {
                sqlx::query(&self.statements.create).execute(pool).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RuleStorage for SqlRuleStorage {
    async fn load_rules(&self) -> PolicyResult<Vec<CasbinRule>> {
        let rows: Vec<DbRule> = match &self.pool {
            RulePool::Postgres(pool) => sqlx::query_as(&self.statements.load).fetch_all(pool).await?,
            RulePool::MySql(pool) => sqlx::query_as(&self.statements.load).fetch_all(pool).await?,
        };
        Ok(rows.into_iter().map(CasbinRule::from).collect())
    }

    async fn insert_rule(&self, rule: &CasbinRule) -> PolicyResult<()> {
        match &self.pool {
            RulePool::Postgres(pool) => {
                bind_rule(sqlx::query(&self.statements.insert), rule)
                    .execute(pool)
                    .await?;
            }
            RulePool::MySql(pool) => {
                bind_rule(sqlx::query(&self.statements.insert), rule)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete_rule(&self, rule: &CasbinRule) -> PolicyResult<bool> {
        let affected = match &self.pool {
            RulePool::Postgres(pool) => bind_rule(sqlx::query(&self.statements.delete), rule)
                .execute(pool)
                .await?
                .rows_affected(),
            RulePool::MySql(pool) => bind_rule(sqlx::query(&self.statements.delete), rule)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        Ok(affected != 0)
    }

    async fn replace_rule(&self, old: &CasbinRule, new: &CasbinRule) -> PolicyResult<bool> {
        let affected = match &self.pool {
            RulePool::Postgres(pool) => {
                let query = bind_rule(sqlx::query(&self.statements.replace), new);
                bind_rule(query, old).execute(pool).await?.rows_affected()
            }
            RulePool::MySql(pool) => {
                let query = bind_rule(sqlx::query(&self.statements.replace), new);
                bind_rule(query, old).execute(pool).await?.rows_affected()
            }
        };
        Ok(affected != 0)
    }

    fn backend_name(&self) -> &'static str {
        match self.pool {
            RulePool::Postgres(_) => "postgres",
            RulePool::MySql(_) => "mysql",
        }
    }
}

/// Opens `SqlRuleStorage` handles with the configured pool limits.
#[derive(Debug, Clone, Default)]
pub struct SqlxRuleConnector {
    pool: RulePoolConfig,
}

impl SqlxRuleConnector {
    pub fn new(pool: RulePoolConfig) -> Self {
        Self { pool }
    }

    fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.pool.acquire_timeout_ms)
    }
}

#[async_trait]
impl RuleStorageConnector for SqlxRuleConnector {
    #[instrument(skip(self, target), fields(rule_table = %target.label()))]
    async fn open(&self, target: &StorageTarget) -> PolicyResult<Arc<dyn RuleStorage>> {
        let (pool, dialect) = match target.database_type {
            DatabaseKind::Mssql => {
                return Err(PolicyError::UnsupportedDatabase(DatabaseKind::Mssql));
            }
            DatabaseKind::Postgres => {
                validate_table_name(&target.table)?;
                let options = parse_postgres_dsn(&target.connection_string)?;
                let pool = PgPoolOptions::new()
                    .max_connections(self.pool.max_connections)
                    .acquire_timeout(self.acquire_timeout())
                    .connect_with(options)
                    .await
                    .map_err(PolicyError::from_connect)?;
                (RulePool::Postgres(pool), Dialect::Postgres)
            }
            DatabaseKind::Mysql => {
                validate_table_name(&target.table)?;
                let options = parse_mysql_dsn(&target.connection_string, &target.database)?;
                let pool = MySqlPoolOptions::new()
                    .max_connections(self.pool.max_connections)
                    .acquire_timeout(self.acquire_timeout())
                    .connect_with(options)
                    .await
                    .map_err(PolicyError::from_connect)?;
                (RulePool::MySql(pool), Dialect::MySql)
            }
        };

        let storage = SqlRuleStorage {
            pool,
            statements: RuleStatements::render(dialect, &target.table),
        };
        debug!("ensuring rule table exists");
        storage.create_table().await?;
        info!(backend = storage.backend_name(), "opened rule storage");
        Ok(Arc::new(storage))
    }
}

fn validate_table_name(table: &str) -> PolicyResult<()> {
    let safe = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if safe {
        Ok(())
    } else {
        Err(PolicyError::Validation(format!(
            "invalid rule table name: {table:?}"
        )))
    }
}

fn parse_port(value: &str) -> PolicyResult<u16> {
    value
        .parse()
        .map_err(|_| PolicyError::InvalidTarget(format!("invalid port: {value:?}")))
}

/// Parse `key=value` pairs as produced for postgres targets.
fn parse_postgres_dsn(dsn: &str) -> PolicyResult<PgConnectOptions> {
    let mut options = PgConnectOptions::new();
    for pair in dsn.split_whitespace() {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(PolicyError::InvalidTarget(
                "malformed postgres connection string".to_string(),
            ));
        };
        options = match key {
            "user" if !value.is_empty() => options.username(value),
            "password" if !value.is_empty() => options.password(value),
            "host" if !value.is_empty() => options.host(value),
            "port" => options.port(parse_port(value)?),
            "dbname" if !value.is_empty() => options.database(value),
            "sslmode" if value == "disable" => options.ssl_mode(PgSslMode::Disable),
            _ => options,
        };
    }
    Ok(options)
}

/// Parse `user:password@tcp(host:port)/` plus the adapter's database name.
fn parse_mysql_dsn(dsn: &str, database: &str) -> PolicyResult<MySqlConnectOptions> {
    let malformed = || PolicyError::InvalidTarget("malformed mysql connection string".to_string());
    let (credentials, address) = dsn.rsplit_once("@tcp(").ok_or_else(malformed)?;
    let address = address.strip_suffix(")/").ok_or_else(malformed)?;
    let (host, port) = address.rsplit_once(':').ok_or_else(malformed)?;
    let (user, password) = credentials.split_once(':').unwrap_or((credentials, ""));

    let mut options = MySqlConnectOptions::new()
        .host(host)
        .port(parse_port(port)?);
    if !user.is_empty() {
        options = options.username(user);
    }
    if !password.is_empty() {
        options = options.password(password);
    }
    if !database.is_empty() {
        options = options.database(database);
    }
    Ok(options)
}
