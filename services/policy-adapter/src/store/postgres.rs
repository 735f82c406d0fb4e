//! Postgres-backed implementation of the metadata store.
//!
//! # What this module is
//! Durable storage (via `sqlx`) for adapter configurations and model
//! definitions. It does **not** hold policy rules: those live in each
//! adapter's own target table and are reached through the rule-storage layer.
//!
//! # Key invariants
//! - `(owner, name)` is the primary key of both tables.
//! - Dynamic SQL is limited to column names from the `AdapterField`
//!   allowlist; every value is bound.
//!
//! # Security notes
//! - Database URLs and adapter passwords may contain credentials; never log
//!   them.
//!
//! # Operational notes
//! Migrations run at connect time via `sqlx::migrate!("./migrations")` so the
//! schema exists before any request is served.
use super::{AdapterStore, MetadataStore, ModelStore, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::{
    AdapterId, CasbinAdapter, DatabaseKind, MASKED_PASSWORD, ModelDefinition, Page, PageRequest,
    SortOrder,
};
use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::str::FromStr;
use std::time::Duration;

const ADAPTER_COLUMNS: &str = "owner, name, created_time, adapter_type, model, host, port, \
     db_user, password, database_type, database_name, table_name, is_enabled";

/// Durable metadata store backed by Postgres.
pub struct PostgresStore {
    pool: PgPool,
}

/// Row shape for the `casbin_adapters` table.
#[derive(Debug, Clone, FromRow)]
struct DbAdapter {
    owner: String,
    name: String,
    created_time: String,
    adapter_type: String,
    model: String,
    host: String,
    port: i32,
    db_user: String,
    password: String,
    database_type: String,
    database_name: String,
    table_name: String,
    is_enabled: bool,
}

#[derive(Debug, Clone, FromRow)]
struct DbModel {
    owner: String,
    name: String,
    created_time: String,
    display_name: String,
    model_text: String,
}

impl PostgresStore {
    /// Connect to Postgres and apply the embedded migrations.
    ///
    /// # Errors
    /// - Connection, pool setup, or migration failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        // Avoid logging `pg.url` because it may contain credentials.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| StoreError::Unexpected(anyhow!(err)))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool whose schema is already migrated.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn adapter_from_db(row: DbAdapter) -> StoreResult<CasbinAdapter> {
    let database_type = DatabaseKind::from(row.database_type.as_str());
    let port = u16::try_from(row.port)
        .map_err(|_| StoreError::Invalid(format!("port out of range: {}", row.port)))?;
    Ok(CasbinAdapter {
        owner: row.owner,
        name: row.name,
        created_time: row.created_time,
        adapter_type: row.adapter_type,
        model: row.model,
        host: row.host,
        port,
        user: row.db_user,
        password: row.password,
        database_type,
        database: row.database_name,
        table: row.table_name,
        is_enabled: row.is_enabled,
        ..Default::default()
    })
}

fn model_from_db(row: DbModel) -> ModelDefinition {
    ModelDefinition {
        owner: row.owner,
        name: row.name,
        created_time: row.created_time,
        display_name: row.display_name,
        model_text: row.model_text,
    }
}

/// Append the owner scope and optional substring filter to a query that
/// already ends in a `WHERE TRUE` clause.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, owner: &str, request: &PageRequest) {
    if !owner.is_empty() {
        builder.push(" AND owner = ");
        builder.push_bind(owner.to_string());
    }
    if let Some(filter) = &request.filter {
        // Column names come from the `AdapterField` allowlist, never from input.
        builder.push(format!(" AND CAST({} AS TEXT) LIKE ", filter.field.column()));
        builder.push_bind(format!("%{}%", escape_like(&filter.value)));
        builder.push(" ESCAPE '\\'");
    }
}

/// Escape `LIKE` metacharacters so the filter is a literal substring match.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn to_sql_bound(value: u64, name: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Invalid(format!("{name} out of range: {value}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

#[async_trait]
impl AdapterStore for PostgresStore {
    async fn list_adapters(&self, owner: &str) -> StoreResult<Vec<CasbinAdapter>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {ADAPTER_COLUMNS} FROM casbin_adapters WHERE TRUE"));
        push_filters(&mut builder, owner, &PageRequest::default());
        builder.push(" ORDER BY created_time DESC, name DESC");
        let rows = builder
            .build_query_as::<DbAdapter>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(adapter_from_db).collect()
    }

    async fn count_adapters(&self, owner: &str, request: &PageRequest) -> StoreResult<u64> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM casbin_adapters WHERE TRUE");
        push_filters(&mut builder, owner, request);
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn paginate_adapters(
        &self,
        owner: &str,
        request: &PageRequest,
    ) -> StoreResult<Page<CasbinAdapter>> {
        let total = self.count_adapters(owner, request).await?;
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {ADAPTER_COLUMNS} FROM casbin_adapters WHERE TRUE"));
        push_filters(&mut builder, owner, request);
        let direction = match request.sort_order {
            SortOrder::Ascend => "ASC",
            SortOrder::Descend => "DESC",
        };
        builder.push(format!(
            " ORDER BY {} {direction}, name {direction}",
            request.sort_field.column()
        ));
        if let Some((offset, limit)) = request.window() {
            builder.push(" LIMIT ");
            builder.push_bind(to_sql_bound(limit, "limit")?);
            builder.push(" OFFSET ");
            builder.push_bind(to_sql_bound(offset, "offset")?);
        }
        let rows = builder
            .build_query_as::<DbAdapter>()
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .into_iter()
            .map(adapter_from_db)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page { items, total })
    }

    async fn get_adapter(&self, id: &AdapterId) -> StoreResult<Option<CasbinAdapter>> {
        if id.owner.is_empty() || id.name.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, DbAdapter>(&format!(
            "SELECT {ADAPTER_COLUMNS} FROM casbin_adapters WHERE owner = $1 AND name = $2"
        ))
        .bind(&id.owner)
        .bind(&id.name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(adapter_from_db).transpose()
    }

    async fn add_adapter(&self, adapter: CasbinAdapter) -> StoreResult<bool> {
        let insert = sqlx::query(&format!(
            "INSERT INTO casbin_adapters ({ADAPTER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(&adapter.owner)
        .bind(&adapter.name)
        .bind(&adapter.created_time)
        .bind(&adapter.adapter_type)
        .bind(&adapter.model)
        .bind(&adapter.host)
        .bind(i32::from(adapter.port))
        .bind(&adapter.user)
        .bind(&adapter.password)
        .bind(adapter.database_type.as_str())
        .bind(&adapter.database)
        .bind(&adapter.table)
        .bind(adapter.is_enabled)
        .execute(&self.pool)
        .await;
        match insert {
            Ok(result) => Ok(result.rows_affected() != 0),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict(format!("adapter {} exists", adapter.id())))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_adapter(&self, id: &AdapterId, adapter: CasbinAdapter) -> StoreResult<bool> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE casbin_adapters SET ");
        {
            let mut set = builder.separated(", ");
            set.push("owner = ").push_bind_unseparated(adapter.owner.clone());
            set.push("name = ").push_bind_unseparated(adapter.name.clone());
            set.push("created_time = ")
                .push_bind_unseparated(adapter.created_time.clone());
            set.push("adapter_type = ")
                .push_bind_unseparated(adapter.adapter_type.clone());
            set.push("model = ").push_bind_unseparated(adapter.model.clone());
            set.push("host = ").push_bind_unseparated(adapter.host.clone());
            set.push("port = ").push_bind_unseparated(i32::from(adapter.port));
            set.push("db_user = ").push_bind_unseparated(adapter.user.clone());
            // The masked placeholder means the caller never saw the real password.
            if adapter.password != MASKED_PASSWORD {
                set.push("password = ")
                    .push_bind_unseparated(adapter.password.clone());
            }
            set.push("database_type = ")
                .push_bind_unseparated(adapter.database_type.as_str());
            set.push("database_name = ")
                .push_bind_unseparated(adapter.database.clone());
            set.push("table_name = ")
                .push_bind_unseparated(adapter.table.clone());
            set.push("is_enabled = ")
                .push_bind_unseparated(adapter.is_enabled);
        }
        builder.push(" WHERE owner = ");
        builder.push_bind(id.owner.clone());
        builder.push(" AND name = ");
        builder.push_bind(id.name.clone());
        match builder.build().execute(&self.pool).await {
            Ok(result) => Ok(result.rows_affected() != 0),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict(format!("adapter {} exists", adapter.id())))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_adapter(&self, id: &AdapterId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM casbin_adapters WHERE owner = $1 AND name = $2")
            .bind(&id.owner)
            .bind(&id.name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() != 0)
    }
}

#[async_trait]
impl ModelStore for PostgresStore {
    async fn get_model(&self, owner: &str, name: &str) -> StoreResult<Option<ModelDefinition>> {
        let row = sqlx::query_as::<_, DbModel>(
            "SELECT owner, name, created_time, display_name, model_text \
             FROM models WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(model_from_db))
    }

    async fn add_model(&self, model: ModelDefinition) -> StoreResult<bool> {
        let insert = sqlx::query(
            "INSERT INTO models (owner, name, created_time, display_name, model_text) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&model.owner)
        .bind(&model.name)
        .bind(&model.created_time)
        .bind(&model.display_name)
        .bind(&model.model_text)
        .execute(&self.pool)
        .await;
        match insert {
            Ok(result) => Ok(result.rows_affected() != 0),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(format!(
                "model {}/{} exists",
                model.owner, model.name
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_model(&self, owner: &str, name: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM models WHERE owner = $1 AND name = $2")
            .bind(owner)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() != 0)
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdapterField, FieldFilter};

    fn db_row(database_type: &str, port: i32) -> DbAdapter {
        DbAdapter {
            owner: "org".into(),
            name: "adapter".into(),
            created_time: "2024-01-01T00:00:00Z".into(),
            adapter_type: "Database".into(),
            model: "rbac".into(),
            host: "db.example.com".into(),
            port,
            db_user: "casbin".into(),
            password: "secret".into(),
            database_type: database_type.into(),
            database_name: "policies".into(),
            table_name: "casbin_rule".into(),
            is_enabled: true,
        }
    }

    #[test]
    fn rows_map_to_adapters() {
        let adapter = adapter_from_db(db_row("postgres", 5432)).expect("adapter");
        assert_eq!(adapter.database_type, DatabaseKind::Postgres);
        assert_eq!(adapter.port, 5432);
        assert_eq!(adapter.user, "casbin");
        assert_eq!(adapter.table, "casbin_rule");
        assert!(!adapter.has_cached_storage());
    }

    #[test]
    fn rows_with_unknown_database_type_read_as_mysql() {
        for raw in ["", "sqlite3"] {
            let adapter = adapter_from_db(db_row(raw, 3306)).expect("adapter");
            assert_eq!(adapter.database_type, DatabaseKind::Mysql);
        }
    }

    #[test]
    fn rows_with_bad_ports_are_invalid() {
        assert!(matches!(
            adapter_from_db(db_row("mysql", 70_000)),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn filters_bind_values_and_allowlist_columns() {
        let request = PageRequest {
            filter: Some(FieldFilter {
                field: AdapterField::User,
                value: "'; DROP TABLE models; --".into(),
            }),
            ..Default::default()
        };
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM casbin_adapters WHERE TRUE");
        push_filters(&mut builder, "org", &request);
        let sql = builder.sql();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM casbin_adapters WHERE TRUE AND owner = $1 \
             AND CAST(db_user AS TEXT) LIKE $2 ESCAPE '\\'"
        );
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn page_bounds_beyond_i64_are_invalid() {
        assert_eq!(to_sql_bound(10, "limit").expect("bound"), 10);
        assert!(matches!(
            to_sql_bound(u64::MAX, "limit"),
            Err(StoreError::Invalid(_))
        ));
    }
}
