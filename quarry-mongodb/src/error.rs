//! Error types for the MongoDB backend.

use mongodb::error::ErrorKind;
use quarry_query::{QueryError, StoreError};
use thiserror::Error;

/// Server error code for an exceeded `maxTimeMS`.
const MAX_TIME_MS_EXPIRED: i32 = 50;

/// Result type for MongoDB backend operations.
pub type MongoResult<T> = Result<T, MongoError>;

/// Errors raised while configuring or managing a connection.
#[derive(Error, Debug)]
pub enum MongoError {
    /// MongoDB driver error.
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// No process-wide connection has been registered.
    #[error("no default connection: connect before using the global helpers")]
    NoDefaultConnection,

    /// The operation timeout elapsed.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

impl MongoError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Check if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a timeout, either ours or one reported by the server.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Driver(err) => is_deadline_error(err),
            _ => false,
        }
    }
}

impl From<MongoError> for QueryError {
    fn from(err: MongoError) -> Self {
        match err {
            MongoError::Driver(e) => store_error(e).into(),
            MongoError::Timeout(_) => QueryError::TimeoutOccurred,
            other => QueryError::Store(StoreError::from_source(other)),
        }
    }
}

fn is_deadline_error(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => command.code == MAX_TIME_MS_EXPIRED,
        ErrorKind::Io(io) => io.kind() == std::io::ErrorKind::TimedOut,
        _ => false,
    }
}

/// Translate a driver error into the store vocabulary.
///
/// Server-side `maxTimeMS` overruns and socket timeouts become
/// [`StoreError::DeadlineExceeded`]; everything else keeps the driver error
/// as its source.
pub fn store_error(err: mongodb::error::Error) -> StoreError {
    if is_deadline_error(&err) {
        return StoreError::DeadlineExceeded;
    }
    StoreError::from_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn io_error(kind: std::io::ErrorKind) -> mongodb::error::Error {
        std::io::Error::new(kind, "socket").into()
    }

    #[test]
    fn test_error_creation() {
        let err = MongoError::config("invalid URI");
        assert!(err.is_config_error());

        let err = MongoError::connection("connection refused");
        assert!(err.is_connection_error());

        let err = MongoError::Timeout(5000);
        assert!(err.is_timeout());
    }

    #[test]
    fn test_error_display() {
        let err = MongoError::config("test error");
        assert_eq!(err.to_string(), "configuration error: test error");

        let err = MongoError::Timeout(250);
        assert_eq!(err.to_string(), "operation timed out after 250ms");
    }

    #[test]
    fn test_socket_timeout_is_deadline() {
        let err = store_error(io_error(std::io::ErrorKind::TimedOut));
        assert!(err.is_deadline_exceeded());

        let err: QueryError = MongoError::Driver(io_error(std::io::ErrorKind::TimedOut)).into();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_other_driver_errors_pass_through() {
        let err = store_error(io_error(std::io::ErrorKind::ConnectionReset));
        assert!(matches!(err, StoreError::Backend { source: Some(_), .. }));
    }

    #[test]
    fn test_into_query_error() {
        let query_err: QueryError = MongoError::Timeout(1000).into();
        assert!(query_err.is_timeout());

        let query_err: QueryError = MongoError::NoDefaultConnection.into();
        assert!(query_err.as_store_error().is_some());
    }
}
