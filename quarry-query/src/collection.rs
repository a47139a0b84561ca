//! Collection handles and the verb factories hanging off them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::{QueryResult, StoreResult};
use crate::index::Index;
use crate::operations::{
    AggregateOperation, DeleteOperation, FindOperation, InsertOperation, ReplaceOperation,
    UpdateCounts, UpdateOperation,
};
use crate::query::Query;
use crate::store::Store;
use crate::timeout::{Deadline, Timeouts};

/// A named collection inside a [`Database`].
///
/// Cloning is cheap; every clone talks to the same store.
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn Store>,
    name: String,
    timeouts: Timeouts,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("database", &self.store.database_name())
            .field("name", &self.name)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Collection {
    pub(crate) fn new(store: Arc<dyn Store>, name: String, timeouts: Timeouts) -> Self {
        Self {
            store,
            name,
            timeouts,
        }
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning database.
    pub fn database_name(&self) -> &str {
        self.store.database_name()
    }

    /// The owning database.
    pub fn database(&self) -> Database {
        Database::new(Arc::clone(&self.store)).with_timeouts(self.timeouts)
    }

    /// The store this collection executes against.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Connection-level timeout defaults.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Start a find.
    pub fn find(&self, filter: impl Into<Document>) -> FindOperation<'_> {
        FindOperation::new(Query::new(self, filter.into()))
    }

    /// Start an insert.
    pub fn insert(&self) -> InsertOperation<'_> {
        InsertOperation::new(Query::new(self, Document::new()))
    }

    /// Start an update of documents matching `filter`.
    pub fn update(
        &self,
        filter: impl Into<Document>,
        update: impl Into<Document>,
    ) -> UpdateOperation<'_> {
        UpdateOperation::new(Query::new(self, filter.into()), update.into())
    }

    /// Start a delete of documents matching `filter`.
    pub fn delete(&self, filter: impl Into<Document>) -> DeleteOperation<'_> {
        DeleteOperation::new(Query::new(self, filter.into()))
    }

    /// Start a whole-document replacement.
    ///
    /// Serialization failures surface when the replacement executes.
    pub fn replace<T>(&self, filter: impl Into<Document>, replacement: &T) -> ReplaceOperation<'_>
    where
        T: Serialize + ?Sized,
    {
        ReplaceOperation::new(
            Query::new(self, filter.into()),
            crate::coerce::to_document(replacement),
        )
    }

    /// Start an aggregation.
    pub fn aggregate<I>(&self, pipeline: I) -> AggregateOperation<'_>
    where
        I: IntoIterator<Item = Document>,
    {
        AggregateOperation::new(Query::new(self, Document::new()), pipeline.into_iter().collect())
    }

    /// An index over the given keys. A leading `-` marks a descending key.
    pub fn index<I, S>(&self, keys: I) -> Index<'_>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Index::new(self, keys)
    }

    /// Count every document in the collection.
    pub async fn count(&self) -> QueryResult<u64> {
        self.find(Document::new()).count().await
    }

    /// Metadata-based count of the collection.
    pub async fn estimated_count(&self) -> QueryResult<u64> {
        let query = Query::new(self, Document::new());
        query
            .execute(
                "estimated_document_count",
                self.store.estimated_document_count(&self.name),
            )
            .await
    }

    /// Find a single document by `_id`.
    pub async fn find_by_id<T>(&self, id: impl Into<Bson>) -> QueryResult<T>
    where
        T: DeserializeOwned,
    {
        self.find(doc! { "_id": id.into() }).one().await
    }

    /// Find documents whose ObjectId was generated inside a time window.
    ///
    /// Both bounds are inclusive. `extra` is merged into the filter.
    pub fn find_by_date(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        extra: impl Into<Document>,
    ) -> FindOperation<'_> {
        let mut filter = extra.into();
        let mut range = Document::new();
        if let Some(before) = before {
            range.insert("$lte", object_id_at(before));
        }
        if let Some(after) = after {
            range.insert("$gte", object_id_at(after));
        }
        if !range.is_empty() {
            filter.insert("_id", range);
        }
        self.find(filter)
    }

    /// Update the document with this `_id`.
    pub async fn update_by_id(
        &self,
        id: impl Into<Bson>,
        update: impl Into<Document>,
    ) -> QueryResult<UpdateCounts> {
        self.update(doc! { "_id": id.into() }, update).one().await
    }

    /// An update builder with upsert already enabled.
    pub fn upsert(
        &self,
        filter: impl Into<Document>,
        update: impl Into<Document>,
    ) -> UpdateOperation<'_> {
        self.update(filter, update).upsert()
    }

    /// Upsert the first document matching `filter`.
    pub async fn upsert_one(
        &self,
        filter: impl Into<Document>,
        update: impl Into<Document>,
    ) -> QueryResult<UpdateCounts> {
        self.upsert(filter, update).one().await
    }

    /// Upsert the document with this `_id`.
    pub async fn upsert_by_id(
        &self,
        id: impl Into<Bson>,
        update: impl Into<Document>,
    ) -> QueryResult<UpdateCounts> {
        self.upsert_one(doc! { "_id": id.into() }, update).await
    }

    /// Upsert every document matching `filter`.
    pub async fn upsert_all(
        &self,
        filter: impl Into<Document>,
        update: impl Into<Document>,
    ) -> QueryResult<UpdateCounts> {
        self.upsert(filter, update).many().await
    }

    /// Replace the document with this `_id`.
    pub async fn replace_by_id<T>(&self, id: impl Into<Bson>, replacement: &T) -> QueryResult<UpdateCounts>
    where
        T: Serialize + ?Sized,
    {
        self.replace(doc! { "_id": id.into() }, replacement)
            .execute()
            .await
    }

    /// Delete the document with this `_id`.
    pub async fn delete_by_id(&self, id: impl Into<Bson>) -> QueryResult<u64> {
        self.delete(doc! { "_id": id.into() }).one().await
    }

    /// Drop the collection.
    pub async fn drop(&self) -> QueryResult<()> {
        administer(
            &self.name,
            self.timeouts,
            "drop_collection",
            self.store.drop_collection(&self.name),
        )
        .await
    }
}

/// The smallest ObjectId that could have been generated at `at`.
fn object_id_at(at: DateTime<Utc>) -> ObjectId {
    let seconds = u32::try_from(at.timestamp().max(0)).unwrap_or(u32::MAX);
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    ObjectId::from_bytes(bytes)
}

/// Run an administrative call under the operation timeout.
pub(crate) async fn administer<T, F>(
    target: &str,
    timeouts: Timeouts,
    op: &'static str,
    call: F,
) -> QueryResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    debug!(target_name = target, op, "running administrative call");
    let result = Deadline::resolve(None, timeouts.operation).run(call).await;
    if let Err(err) = &result {
        if err.is_timeout() {
            warn!(target_name = target, op, "administrative call timed out");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Enemy {
        name: String,
        #[serde(default)]
        captured: bool,
    }

    fn gotham() -> (Arc<MemoryStore>, Collection) {
        let store = Arc::new(MemoryStore::new("batman_archive"));
        let enemies = Database::new(store.clone()).collection("enemies");
        (store, enemies)
    }

    #[test]
    fn test_handle_names() {
        let (_, enemies) = gotham();
        assert_eq!(enemies.name(), "enemies");
        assert_eq!(enemies.database_name(), "batman_archive");
        assert_eq!(enemies.database().name(), "batman_archive");
        assert!(format!("{enemies:?}").contains("enemies"));
    }

    #[test]
    fn test_object_id_at_encodes_seconds() {
        let at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let oid = object_id_at(at);
        assert_eq!(oid.timestamp().timestamp_millis(), at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_id_helpers() {
        let (store, enemies) = gotham();
        let joker = Enemy { name: "Joker".into(), captured: false };
        let id = enemies.insert().one(&joker).await.unwrap();

        let found: Enemy = enemies.find_by_id(id.clone()).await.unwrap();
        assert_eq!(found, joker);

        let counts = enemies
            .update_by_id(id.clone(), doc! { "$set": { "captured": true } })
            .await
            .unwrap();
        assert_eq!((counts.matched, counts.modified), (1, 1));

        let replaced = Enemy { name: "Red Hood".into(), captured: true };
        enemies.replace_by_id(id.clone(), &replaced).await.unwrap();
        let found: Enemy = enemies.find_by_id(id.clone()).await.unwrap();
        assert_eq!(found, replaced);

        assert_eq!(enemies.delete_by_id(id.clone()).await.unwrap(), 1);
        let err = enemies.find_by_id::<Enemy>(id).await.unwrap_err();
        assert!(err.is_no_documents());
        assert_eq!(store.documents("enemies").len(), 0);
    }

    #[tokio::test]
    async fn test_upsert_helpers() {
        let (_, enemies) = gotham();
        let counts = enemies
            .upsert_one(doc! { "name": "Bane" }, doc! { "$set": { "captured": false } })
            .await
            .unwrap();
        assert_eq!((counts.matched, counts.modified), (0, 1));
        assert!(counts.upserted_id.is_some());

        let counts = enemies
            .upsert_all(doc! { "name": "Bane" }, doc! { "$set": { "captured": true } })
            .await
            .unwrap();
        assert_eq!((counts.matched, counts.modified), (1, 1));

        enemies
            .upsert_by_id(7, doc! { "$set": { "name": "Hush" } })
            .await
            .unwrap();
        let hush: Enemy = enemies.find_by_id(7).await.unwrap();
        assert_eq!(hush.name, "Hush");
        assert_eq!(enemies.count().await.unwrap(), 2);
        assert_eq!(enemies.estimated_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_by_date_window() {
        let (_, enemies) = gotham();
        let old = ObjectId::from_bytes([0, 0, 0, 10, 0, 0, 0, 0, 0, 0, 0, 1]);
        let new = ObjectId::new();
        enemies
            .insert()
            .many(vec![
                doc! { "_id": old, "name": "Clayface" },
                doc! { "_id": new, "name": "Harley" },
            ])
            .await
            .unwrap();

        let since = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let recent: Vec<Enemy> = enemies
            .find_by_date(Some(since), None, Document::new())
            .all()
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].name, "Harley");

        let ancient: Vec<Enemy> = enemies
            .find_by_date(None, Some(since), doc! { "name": "Clayface" })
            .all()
            .await
            .unwrap();
        assert_eq!(ancient.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_collection() {
        let (store, enemies) = gotham();
        enemies.insert().one(&doc! { "name": "Zsasz" }).await.unwrap();
        enemies.drop().await.unwrap();
        assert!(store.documents("enemies").is_empty());
        assert_eq!(enemies.count().await.unwrap(), 0);
    }
}
