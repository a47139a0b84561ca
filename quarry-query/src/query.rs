//! Shared builder state embedded in every operation builder.
//!
//! A [`Query`] holds what all verbs have in common: the filter, sort and hint
//! key specs, a comment, a collation and an optional per-query timeout. It
//! is never executed on its own; the verb builders wrap it and forward the
//! common setters through the `query_setters!` macro.

use std::future::Future;
use std::time::Duration;

use bson::Document;
use tracing::{debug, warn};

use crate::coerce::key_document;
use crate::collection::Collection;
use crate::error::{QueryResult, StoreResult};
use crate::options::Collation;
use crate::store::Store;
use crate::timeout::Deadline;

/// Filter and options common to every verb.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    collection: &'a Collection,
    filter: Document,
    sort: Document,
    hint: Document,
    comment: Option<String>,
    collation: Option<Collation>,
    timeout: Option<Duration>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(collection: &'a Collection, filter: Document) -> Self {
        Self {
            collection,
            filter,
            sort: Document::new(),
            hint: Document::new(),
            comment: None,
            collation: None,
            timeout: None,
        }
    }

    /// Replace the sort keys. A leading `-` sorts descending.
    pub fn set_sort<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sort = key_document(fields);
    }

    /// Replace the index hint keys. A leading `-` marks a descending key.
    pub fn set_hint<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.hint = key_document(keys);
    }

    /// Attach a diagnostic comment.
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = Some(comment.into());
    }

    /// Set the collation.
    pub fn set_collation(&mut self, collation: Collation) {
        self.collation = Some(collation);
    }

    /// Set the per-query timeout. No clock starts until execution.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// The owning collection.
    pub fn collection(&self) -> &'a Collection {
        self.collection
    }

    /// The filter document.
    pub fn filter(&self) -> &Document {
        &self.filter
    }

    /// The sort keys, if any were given.
    pub fn sort(&self) -> Option<&Document> {
        (!self.sort.is_empty()).then_some(&self.sort)
    }

    /// The hint keys, if any were given.
    pub fn hint(&self) -> Option<&Document> {
        (!self.hint.is_empty()).then_some(&self.hint)
    }

    /// The comment, if set.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// The collation, if set.
    pub fn collation(&self) -> Option<&Collation> {
        self.collation.as_ref()
    }

    /// The per-query timeout, if set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sort direction requested for a field, if it is a sort key.
    pub fn sort_direction(&self, field: &str) -> Option<i32> {
        self.sort.get_i32(field).ok()
    }

    pub(crate) fn store(&self) -> &'a dyn Store {
        self.collection.store().as_ref()
    }

    pub(crate) fn collection_name(&self) -> &'a str {
        self.collection.name()
    }

    /// Resolve the deadline for a terminal call happening now.
    pub(crate) fn deadline(&self) -> Deadline {
        Deadline::resolve(self.timeout, self.collection.timeouts().query)
    }

    /// Run one store call under a freshly resolved deadline.
    pub(crate) async fn execute<T, F>(&self, op: &'static str, call: F) -> QueryResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        self.execute_within(op, self.deadline(), call).await
    }

    /// Run one store call under a deadline the caller already resolved.
    pub(crate) async fn execute_within<T, F>(
        &self,
        op: &'static str,
        deadline: Deadline,
        call: F,
    ) -> QueryResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        debug!(
            collection = %self.collection.name(),
            op,
            filter = %self.filter,
            "executing query"
        );
        let result = deadline.run(call).await;
        if let Err(err) = &result {
            if err.is_timeout() {
                warn!(collection = %self.collection.name(), op, "query timed out");
            } else {
                debug!(collection = %self.collection.name(), op, error = %err, "query failed");
            }
        }
        result
    }
}

/// Forward the common [`Query`] setters onto a builder with a `query` field.
macro_rules! query_setters {
    ($builder:ident) => {
        impl<'a> $builder<'a> {
            /// Sort by the given fields. A leading `-` sorts descending.
            pub fn sort<I, S>(mut self, fields: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: AsRef<str>,
            {
                self.query.set_sort(fields);
                self
            }

            /// Hint the index to use. A leading `-` marks a descending key.
            pub fn hint<I, S>(mut self, keys: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: AsRef<str>,
            {
                self.query.set_hint(keys);
                self
            }

            /// Attach a comment visible in server logs and profiles.
            pub fn comment(mut self, comment: impl Into<String>) -> Self {
                self.query.set_comment(comment);
                self
            }

            /// Use locale-aware string comparison.
            pub fn collation(mut self, collation: $crate::options::Collation) -> Self {
                self.query.set_collation(collation);
                self
            }

            /// Bound the call by `timeout`, measured from the terminal call.
            pub fn timeout(mut self, timeout: ::std::time::Duration) -> Self {
                self.query.set_timeout(timeout);
                self
            }

            /// The shared query state.
            pub fn query(&self) -> &$crate::query::Query<'a> {
                &self.query
            }
        }
    };
}
