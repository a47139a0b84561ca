//! Database handles.

use std::fmt;
use std::sync::Arc;

use bson::{Document, doc};
use serde::de::DeserializeOwned;

use crate::collection::{Collection, administer};
use crate::error::{QueryError, QueryResult};
use crate::store::Store;
use crate::timeout::Timeouts;

/// A database reached through a [`Store`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use quarry_query::{Database, MemoryStore};
///
/// let db = Database::new(Arc::new(MemoryStore::new("batman_archive")));
/// let enemies = db.collection("enemies");
/// assert_eq!(enemies.name(), "enemies");
/// ```
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn Store>,
    timeouts: Timeouts,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.store.database_name())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Database {
    /// Wrap a store with no timeout defaults.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            timeouts: Timeouts::none(),
        }
    }

    /// Set the timeout defaults inherited by every collection.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The database name.
    pub fn name(&self) -> &str {
        self.store.database_name()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Timeout defaults.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// A handle to a collection. Nothing is created until first write.
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(Arc::clone(&self.store), name.into(), self.timeouts)
    }

    /// Shorthand for [`Database::collection`].
    pub fn c(&self, name: impl Into<String>) -> Collection {
        self.collection(name)
    }

    /// Names of every collection in the database.
    pub async fn collection_names(&self) -> QueryResult<Vec<String>> {
        administer(
            self.name(),
            self.timeouts,
            "list_collection_names",
            self.store.list_collection_names(Document::new()),
        )
        .await
    }

    /// Handles to every collection in the database.
    pub async fn list_collections(&self) -> QueryResult<Vec<Collection>> {
        let names = self.collection_names().await?;
        Ok(names.into_iter().map(|name| self.collection(name)).collect())
    }

    /// Drop the whole database.
    pub async fn drop(&self) -> QueryResult<()> {
        administer(
            self.name(),
            self.timeouts,
            "drop_database",
            self.store.drop_database(),
        )
        .await
    }

    /// Run a raw database command.
    pub async fn run_command(&self, command: Document) -> QueryResult<Document> {
        administer(
            self.name(),
            self.timeouts,
            "run_command",
            self.store.run_command(command),
        )
        .await
    }

    /// Run a raw command and decode its reply.
    pub async fn run<T>(&self, command: Document) -> QueryResult<T>
    where
        T: DeserializeOwned,
    {
        let reply = self.run_command(command).await?;
        bson::from_document(reply).map_err(QueryError::from)
    }

    /// Check that the store answers.
    pub async fn ping(&self) -> QueryResult<()> {
        self.run_command(doc! { "ping": 1 }).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct Stats {
        collections: i64,
        objects: i64,
    }

    #[tokio::test]
    async fn test_listing_and_dropping() {
        let db = Database::new(Arc::new(MemoryStore::new("batman_archive")));
        db.c("enemies").insert().one(&doc! { "name": "Joker" }).await.unwrap();
        db.c("allies").insert().one(&doc! { "name": "Alfred" }).await.unwrap();

        assert_eq!(db.collection_names().await.unwrap(), vec!["allies", "enemies"]);
        let handles = db.list_collections().await.unwrap();
        assert_eq!(handles[1].name(), "enemies");

        let stats: Stats = db.run(doc! { "dbStats": 1 }).await.unwrap();
        assert_eq!((stats.collections, stats.objects), (2, 2));

        db.drop().await.unwrap();
        assert!(db.collection_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ping_and_unknown_command() {
        let db = Database::new(Arc::new(MemoryStore::new("batman_archive")));
        db.ping().await.unwrap();
        let err = db.run_command(doc! { "explode": 1 }).await.unwrap_err();
        assert!(err.as_store_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_calls_use_operation_timeout() {
        let store = MemoryStore::new("batman_archive").with_latency(Duration::from_secs(5));
        let db = Database::new(Arc::new(store)).with_timeouts(
            Timeouts::none()
                .with_query(Duration::from_secs(60))
                .with_operation(Duration::from_secs(1)),
        );
        let err = db.collection_names().await.unwrap_err();
        assert!(err.is_timeout());
    }
}
