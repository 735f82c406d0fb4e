use crate::model::DatabaseKind;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("The model: {0} does not exist")]
    ModelNotFound(String),
    #[error("adapter not found: {0}")]
    AdapterNotFound(String),
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("invalid storage target: {0}")]
    InvalidTarget(String),
    #[error("unsupported database type: {0}")]
    UnsupportedDatabase(DatabaseKind),
    #[error("rule storage unreachable: {0}")]
    Connectivity(String),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
    #[error(transparent)]
    Upstream(#[from] casbin::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

impl PolicyError {
    /// Split driver errors into "could not reach the database" and
    /// everything else.
    pub(crate) fn from_connect(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => {
                PolicyError::Connectivity(err.to_string())
            }
            other => PolicyError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_message_matches_lookup_id() {
        let err = PolicyError::ModelNotFound("built-in/rbac".to_string());
        assert_eq!(err.to_string(), "The model: built-in/rbac does not exist");
    }

    #[test]
    fn connect_errors_are_classified() {
        let timed_out = PolicyError::from_connect(sqlx::Error::PoolTimedOut);
        assert!(matches!(timed_out, PolicyError::Connectivity(_)));
        let not_found = PolicyError::from_connect(sqlx::Error::RowNotFound);
        assert!(matches!(not_found, PolicyError::Storage(_)));
    }
}
