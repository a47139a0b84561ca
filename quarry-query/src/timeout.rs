//! Deadline resolution for query execution.
//!
//! A query's deadline is resolved when its terminal method is called, never
//! when the builder is configured. A per-query timeout wins over the
//! connection default; when neither is set the operation is unbounded.
//!
//! Abandoning an operation is done by dropping its future once the deadline
//! fires, so there is nothing to release when a call completes normally.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{QueryError, QueryResult, StoreResult};

/// Connection-level timeout defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// Default for query builders (find, update, distinct, ...).
    pub query: Option<Duration>,
    /// Default for administrative calls (drop, index, listings, ...).
    pub operation: Option<Duration>,
}

impl Timeouts {
    /// Timeouts with nothing set.
    pub const fn none() -> Self {
        Self {
            query: None,
            operation: None,
        }
    }

    /// Set the default query timeout.
    pub fn with_query(mut self, timeout: Duration) -> Self {
        self.query = Some(timeout);
        self
    }

    /// Set the default operation timeout.
    pub fn with_operation(mut self, timeout: Duration) -> Self {
        self.operation = Some(timeout);
        self
    }
}

/// The resolved point in time after which an in-flight call is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Resolve a deadline from a per-query timeout and a fallback default.
    ///
    /// A zero duration yields a deadline that has already elapsed.
    pub fn resolve(per_query: Option<Duration>, fallback: Option<Duration>) -> Self {
        let budget = per_query.or(fallback);
        Self {
            at: budget.and_then(|budget| Instant::now().checked_add(budget)),
        }
    }

    /// A deadline that never fires.
    pub const fn unbounded() -> Self {
        Self { at: None }
    }

    /// The instant this deadline fires, if bounded.
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    /// Whether the deadline is bounded.
    pub fn is_bounded(&self) -> bool {
        self.at.is_some()
    }

    /// Whether the deadline has passed.
    pub fn is_elapsed(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before the deadline fires.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Run a store call bounded by this deadline.
    ///
    /// Store errors are normalized. Any error observed after the deadline
    /// passed is reported as [`QueryError::TimeoutOccurred`], whatever the
    /// store said. A call that succeeds late still succeeds.
    pub async fn run<T, F>(&self, operation: F) -> QueryResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let Some(at) = self.at else {
            return operation.await.map_err(QueryError::from);
        };

        if Instant::now() >= at {
            debug!("deadline already elapsed, skipping store call");
            return Err(QueryError::TimeoutOccurred);
        }

        match tokio::time::timeout_at(at, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) if self.is_elapsed() => {
                debug!(error = %err, "store failed after deadline");
                Err(QueryError::TimeoutOccurred)
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                debug!("deadline elapsed during store call");
                Err(QueryError::TimeoutOccurred)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[tokio::test]
    async fn test_per_query_overrides_default() {
        let deadline = Deadline::resolve(Some(Duration::from_secs(1)), Some(Duration::from_secs(60)));
        let remaining = deadline.remaining().unwrap();
        assert!(remaining > Duration::from_millis(500));
        assert!(remaining <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_default_used_without_override() {
        let deadline = Deadline::resolve(None, Some(Duration::from_secs(60)));
        assert!(deadline.remaining().unwrap() > Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unbounded_without_any_timeout() {
        let deadline = Deadline::resolve(None, None);
        assert!(!deadline.is_bounded());
        assert!(!deadline.is_elapsed());
        assert_eq!(deadline, Deadline::unbounded());
    }

    #[tokio::test]
    async fn test_zero_timeout_never_calls_store() {
        let deadline = Deadline::resolve(Some(Duration::ZERO), None);
        let mut called = false;
        let result = deadline
            .run(async {
                called = true;
                Ok::<_, StoreError>(())
            })
            .await;
        assert!(result.unwrap_err().is_timeout());
        assert!(!called);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let deadline = Deadline::resolve(Some(Duration::from_millis(50)), None);
        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(1)
            })
            .await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_store_errors_are_normalized() {
        let deadline = Deadline::resolve(Some(Duration::from_secs(30)), None);
        let result = deadline
            .run(async { Err::<(), _>(StoreError::NoDocuments) })
            .await;
        assert!(result.unwrap_err().is_no_documents());

        let result = Deadline::unbounded()
            .run(async { Err::<(), _>(StoreError::DeadlineExceeded) })
            .await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[test]
    fn test_timeouts_builder() {
        let timeouts = Timeouts::none()
            .with_query(Duration::from_secs(5))
            .with_operation(Duration::from_secs(30));
        assert_eq!(timeouts.query, Some(Duration::from_secs(5)));
        assert_eq!(timeouts.operation, Some(Duration::from_secs(30)));
    }
}
