//! Error taxonomy for query execution.
//!
//! Every failure surfaced by a terminal call is one of the [`QueryError`]
//! variants. Backend failures arrive as [`StoreError`] and are normalized on
//! the way out:
//!
//! - a store-reported deadline overrun becomes [`QueryError::TimeoutOccurred`]
//! - a store-reported empty result becomes [`QueryError::NoDocuments`]
//! - anything else is carried unchanged inside [`QueryError::Store`]
//!
//! ```rust
//! use quarry_query::{QueryError, StoreError};
//!
//! let err: QueryError = StoreError::DeadlineExceeded.into();
//! assert!(err.is_timeout());
//!
//! let err: QueryError = StoreError::NoDocuments.into();
//! assert!(err.is_no_documents());
//! ```

use std::sync::Arc;

use bson::Bson;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared, cloneable error source.
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by a [`Store`](crate::Store) implementation.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The operation did not finish before its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The store found nothing where one document was expected.
    #[error("no documents in result")]
    NoDocuments,

    /// A stored document could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Human readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<ErrorSource>,
    },

    /// A caller value could not be encoded into a document.
    #[error("encode error: {message}")]
    Encode {
        /// Human readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<ErrorSource>,
    },

    /// Any other backend failure.
    #[error("store error: {message}")]
    Backend {
        /// Human readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<ErrorSource>,
    },
}

impl StoreError {
    /// Create a backend error from a message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error wrapping a lower level error.
    pub fn from_source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    /// Create a decode error from a message.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            source: None,
        }
    }

    /// Create an encode error from a message.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
            source: None,
        }
    }

    /// Check if this is a deadline error.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

impl From<bson::ser::Error> for StoreError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Encode {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<bson::de::Error> for StoreError {
    fn from(err: bson::de::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

/// Errors surfaced to callers of the query builders.
#[derive(Error, Debug, Clone)]
pub enum QueryError {
    /// The resolved deadline elapsed before the operation completed.
    #[error("timeout during database transaction")]
    TimeoutOccurred,

    /// A single-document read matched nothing.
    #[error("no documents found")]
    NoDocuments,

    /// The result target cannot hold a decoded document.
    #[error("a document or array target is required, got {target}")]
    PointerRequired {
        /// Description of the rejected target.
        target: String,
    },

    /// A value had an unexpected type for the requested conversion.
    #[error("wrong type: expected {expected}, found {found}")]
    WrongType {
        /// The accepted type(s).
        expected: &'static str,
        /// The type that was actually encountered.
        found: String,
    },

    /// The operation is declared but not supported.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The call was rejected before reaching the store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An unclassified store failure, passed through unchanged.
    #[error(transparent)]
    Store(StoreError),
}

impl QueryError {
    /// Create a wrong type error for a BSON value.
    pub fn wrong_type(expected: &'static str, found: &Bson) -> Self {
        Self::WrongType {
            expected,
            found: format!("{:?}", found.element_type()),
        }
    }

    /// Create a pointer-required error for a rejected target.
    pub fn pointer_required(target: impl Into<String>) -> Self {
        Self::PointerRequired {
            target: target.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a not implemented error.
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        Self::NotImplemented(operation.into())
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutOccurred)
    }

    /// Check if this is a no-documents error.
    pub fn is_no_documents(&self) -> bool {
        matches!(self, Self::NoDocuments)
    }

    /// Check if this is a wrong type error.
    pub fn is_wrong_type(&self) -> bool {
        matches!(self, Self::WrongType { .. })
    }

    /// Check if this is a pointer-required error.
    pub fn is_pointer_required(&self) -> bool {
        matches!(self, Self::PointerRequired { .. })
    }

    /// Check if this is an invalid argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Returns the wrapped store error, if this is one.
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DeadlineExceeded => Self::TimeoutOccurred,
            StoreError::NoDocuments => Self::NoDocuments,
            other => Self::Store(other),
        }
    }
}

impl From<bson::ser::Error> for QueryError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Store(err.into())
    }
}

impl From<bson::de::Error> for QueryError {
    fn from(err: bson::de::Error) -> Self {
        Self::Store(err.into())
    }
}

/// Normalize a store result into the query error taxonomy.
///
/// Successful results pass through untouched.
pub fn normalize<T>(result: StoreResult<T>) -> QueryResult<T> {
    result.map_err(QueryError::from)
}
