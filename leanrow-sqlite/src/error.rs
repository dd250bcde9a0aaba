//! Error types for SQLite operations.

use leanrow_query::QueryError;
use thiserror::Error;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Error, Debug)]
pub enum SqliteError {
    #[error("Pool error: {0}")]
    Pool(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),
}

impl SqliteError {
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl From<SqliteError> for QueryError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Config(msg) => {
                QueryError::configuration(format!("SQLite configuration: {}", msg))
            }
            SqliteError::TypeConversion(msg) => QueryError::invalid_data(msg),
            other => QueryError::execution_message(other.to_string()).with_source(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqliteError::config("invalid path");
        assert_eq!(err.to_string(), "Configuration error: invalid path");
        assert_eq!(SqliteError::pool("closed").to_string(), "Pool error: closed");
    }

    #[test]
    fn test_error_conversion() {
        let query_err: QueryError = SqliteError::pool("no permits").into();
        assert!(query_err.is_execution_error());
        assert!(std::error::Error::source(&query_err).is_some());

        let query_err: QueryError = SqliteError::config("bad url").into();
        assert!(query_err.is_configuration_error());
    }

    #[test]
    fn test_driver_error_is_execution_error() {
        let err: SqliteError = rusqlite::Error::InvalidQuery.into();
        let query_err: QueryError = err.into();
        assert!(query_err.is_execution_error());
    }
}
