//! Driver connection strings for adapter rule tables.
//!
//! # Purpose
//! Turns an adapter's target descriptor into the connection string and table
//! reference handed to the rule-storage connector. Pure; no I/O.
//!
//! # Key invariants
//! - Outside the cloud intranet every `dbi.` host segment is rewritten to
//!   `db.`; inside it the string is returned untouched.
//! - mssql table references are bracket-quoted, all others are bare.
use crate::model::{CasbinAdapter, DatabaseKind};

const INTRANET_HOST_SEGMENT: &str = "dbi.";
const PUBLIC_HOST_SEGMENT: &str = "db.";

/// Driver connection string for `adapter`'s rule database.
///
/// # Example
/// ```
/// use policy_adapter::model::{CasbinAdapter, DatabaseKind};
/// use policy_adapter::policy::resolve_connection_string;
///
/// let mut adapter = CasbinAdapter::new("built-in", "rules");
/// adapter.database_type = DatabaseKind::Mysql;
/// adapter.user = "casbin".into();
/// adapter.password = "pw".into();
/// adapter.host = "dbi.example.com".into();
/// adapter.port = 3306;
/// assert_eq!(
///     resolve_connection_string(&adapter, false),
///     "casbin:pw@tcp(db.example.com:3306)/"
/// );
/// ```
pub fn resolve_connection_string(adapter: &CasbinAdapter, intranet: bool) -> String {
    let connection = match adapter.database_type {
        DatabaseKind::Mssql => format!(
            "sqlserver://{}:{}@{}:{}?database={}",
            adapter.user, adapter.password, adapter.host, adapter.port, adapter.database
        ),
        DatabaseKind::Postgres => format!(
            "user={} password={} host={} port={} sslmode=disable dbname={}",
            adapter.user, adapter.password, adapter.host, adapter.port, adapter.database
        ),
        DatabaseKind::Mysql => format!(
            "{}:{}@tcp({}:{})/",
            adapter.user, adapter.password, adapter.host, adapter.port
        ),
    };

    if intranet {
        connection
    } else {
        connection.replace(INTRANET_HOST_SEGMENT, PUBLIC_HOST_SEGMENT)
    }
}

/// Table name as the target driver expects it; mssql names are bracketed.
pub fn table_reference(adapter: &CasbinAdapter) -> String {
    match adapter.database_type {
        DatabaseKind::Mssql => format!("[{}]", adapter.table),
        _ => adapter.table.clone(),
    }
}
