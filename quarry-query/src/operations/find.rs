//! Find operation for reading documents.

use bson::{Bson, Document};
use serde::de::DeserializeOwned;

use crate::coerce::is_unpackable;
use crate::error::{QueryError, QueryResult};
use crate::iter::Iter;
use crate::operations::FindAndModifyOperation;
use crate::options::{CountOptions, FindOptions};
use crate::query::Query;
use crate::timeout::Deadline;

/// A find operation over one collection.
///
/// # Example
///
/// ```rust,ignore
/// let villains: Vec<Enemy> = enemies
///     .find(doc! { "captured": false })
///     .sort(["-year", "name"])
///     .skip(10)
///     .limit(5)
///     .all()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct FindOperation<'a> {
    pub(crate) query: Query<'a>,
    skip: Option<u64>,
    limit: Option<i64>,
    batch_size: Option<u32>,
    projection: Option<Document>,
    allow_disk_use: Option<bool>,
    allow_partial_results: Option<bool>,
}

query_setters!(FindOperation);

impl<'a> FindOperation<'a> {
    pub(crate) fn new(query: Query<'a>) -> Self {
        Self {
            query,
            skip: None,
            limit: None,
            batch_size: None,
            projection: None,
            allow_disk_use: None,
            allow_partial_results: None,
        }
    }

    /// Skip the first `skip` matches.
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Return at most `limit` documents. Zero or a negative value means no limit.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit.max(0));
        self
    }

    /// Number of documents fetched per cursor round trip.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Restrict the returned fields.
    pub fn projection(mut self, projection: impl Into<Document>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Let the server spill large sorts to disk.
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = Some(allow);
        self
    }

    /// Return partial results when some shards are down.
    pub fn allow_partial_results(mut self, allow: bool) -> Self {
        self.allow_partial_results = Some(allow);
        self
    }

    pub(crate) fn skip_value(&self) -> u64 {
        self.skip.unwrap_or(0)
    }

    pub(crate) fn limit_value(&self) -> i64 {
        self.limit.unwrap_or(0)
    }

    /// Assemble the store options. Unset fields stay unset.
    pub fn build_options(&self) -> FindOptions {
        FindOptions {
            sort: self.query.sort().cloned(),
            hint: self.query.hint().cloned(),
            skip: self.skip,
            limit: self.limit,
            batch_size: self.batch_size,
            projection: self.projection.clone(),
            allow_disk_use: self.allow_disk_use,
            allow_partial_results: self.allow_partial_results,
            comment: self.query.comment().map(str::to_owned),
            collation: self.query.collation().cloned(),
            max_time: self.query.timeout(),
        }
    }

    fn build_count_options(&self) -> CountOptions {
        CountOptions {
            hint: self.query.hint().cloned(),
            skip: self.skip,
            limit: self.limit.filter(|limit| *limit > 0).map(|limit| limit as u64),
            collation: self.query.collation().cloned(),
            max_time: self.query.timeout(),
        }
    }

    /// Decode the first match.
    ///
    /// Fails with [`QueryError::NoDocuments`] when nothing matches.
    pub async fn one<T>(&self) -> QueryResult<T>
    where
        T: DeserializeOwned,
    {
        let document = self.one_document().await?;
        bson::from_document(document).map_err(QueryError::from)
    }

    /// The first match as a raw document.
    pub async fn one_document(&self) -> QueryResult<Document> {
        let found = self
            .query
            .execute(
                "find_one",
                self.query.store().find_one(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    self.build_options(),
                ),
            )
            .await?;
        found.ok_or(QueryError::NoDocuments)
    }

    /// Write the first match into a dynamic target.
    ///
    /// A document target is overwritten; an array target ends up holding the
    /// single match. Any other target is rejected before the store is called.
    /// On failure the target is left untouched.
    pub async fn one_into(&self, target: &mut Bson) -> QueryResult<()> {
        if !is_unpackable(target) {
            return Err(QueryError::pointer_required(format!(
                "{:?}",
                target.element_type()
            )));
        }
        let document = self.one_document().await?;
        match target {
            Bson::Array(items) => {
                items.clear();
                items.push(Bson::Document(document));
            }
            other => *other = Bson::Document(document),
        }
        Ok(())
    }

    /// Decode every match.
    ///
    /// Opening the cursor and draining it share one deadline.
    pub async fn all<T>(&self) -> QueryResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let deadline = self.query.deadline();
        self.open(deadline).await?.all_within(deadline).await
    }

    /// Open a cursor over the matches.
    pub async fn cursor(&self) -> QueryResult<Iter> {
        self.open(self.query.deadline()).await
    }

    async fn open(&self, deadline: Deadline) -> QueryResult<Iter> {
        let cursor = self
            .query
            .execute_within(
                "find",
                deadline,
                self.query.store().find(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    self.build_options(),
                ),
            )
            .await?;
        Ok(Iter::new(
            self.query.collection_name(),
            cursor,
            self.query.timeout(),
            self.query.collection().timeouts().query,
        ))
    }

    /// Count the matches, honoring skip and limit.
    pub async fn count(&self) -> QueryResult<u64> {
        self.query
            .execute(
                "count_documents",
                self.query.store().count_documents(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    self.build_count_options(),
                ),
            )
            .await
    }

    /// Switch to an atomic find-and-modify on the first match.
    ///
    /// The projection carries over. A skip or a limit cannot, so the
    /// resulting operation rejects them with [`QueryError::InvalidArgument`].
    pub fn one_and(self) -> FindAndModifyOperation<'a> {
        let windowed = self.skip_value() > 0 || self.limit_value() > 0;
        FindAndModifyOperation::from_find(self.query, self.projection, windowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::{Collection, Database};
    use bson::doc;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Enemy {
        name: String,
        year: i32,
    }

    async fn seeded() -> (Arc<MemoryStore>, Collection) {
        let store = Arc::new(MemoryStore::new("batman_archive"));
        let enemies = Database::new(store.clone()).collection("enemies");
        enemies
            .insert()
            .many(vec![
                doc! { "name": "Joker", "year": 1940 },
                doc! { "name": "Catwoman", "year": 1940 },
                doc! { "name": "Riddler", "year": 1948 },
                doc! { "name": "Mr. Freeze", "year": 1959 },
            ])
            .await
            .unwrap();
        (store, enemies)
    }

    #[tokio::test]
    async fn test_build_options_only_sets_present_fields() {
        let (_, enemies) = seeded().await;
        let options = enemies.find(doc! {}).build_options();
        assert_eq!(options, FindOptions::default());

        let options = enemies
            .find(doc! {})
            .sort(["-year"])
            .skip(1)
            .limit(-3)
            .comment("cold case")
            .timeout(Duration::from_secs(2))
            .build_options();
        assert_eq!(options.sort, Some(doc! { "year": -1 }));
        assert_eq!(options.skip, Some(1));
        assert_eq!(options.limit, Some(0));
        assert_eq!(options.comment.as_deref(), Some("cold case"));
        assert_eq!(options.max_time, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_one_and_all() {
        let (_, enemies) = seeded().await;
        let first: Enemy = enemies.find(doc! {}).sort(["-year"]).one().await.unwrap();
        assert_eq!(first.name, "Mr. Freeze");

        let window: Vec<Enemy> = enemies
            .find(doc! { "year": { "$lt": 1950 } })
            .sort(["year", "name"])
            .skip(1)
            .limit(2)
            .all()
            .await
            .unwrap();
        let names: Vec<_> = window.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Joker", "Riddler"]);
    }

    #[tokio::test]
    async fn test_one_without_match_is_no_documents() {
        let (_, enemies) = seeded().await;
        let err = enemies
            .find(doc! { "name": "Superman" })
            .one::<Enemy>()
            .await
            .unwrap_err();
        assert!(err.is_no_documents());
    }

    #[tokio::test]
    async fn test_one_into_requires_container() {
        let (store, enemies) = seeded().await;
        let calls = store.calls();
        let mut scalar = Bson::Int32(0);
        let err = enemies.find(doc! {}).one_into(&mut scalar).await.unwrap_err();
        assert!(err.is_pointer_required());
        assert_eq!(store.calls(), calls);

        let mut target = Bson::Document(Document::new());
        enemies
            .find(doc! { "name": "Riddler" })
            .one_into(&mut target)
            .await
            .unwrap();
        assert_eq!(target.as_document().unwrap().get_i32("year").unwrap(), 1948);

        let mut untouched = Bson::Array(vec![Bson::Int32(1)]);
        let err = enemies
            .find(doc! { "name": "Bane" })
            .one_into(&mut untouched)
            .await
            .unwrap_err();
        assert!(err.is_no_documents());
        assert_eq!(untouched, Bson::Array(vec![Bson::Int32(1)]));
    }

    #[tokio::test]
    async fn test_count_and_projection() {
        let (_, enemies) = seeded().await;
        assert_eq!(enemies.find(doc! { "year": 1940 }).count().await.unwrap(), 2);
        assert_eq!(enemies.find(doc! {}).skip(1).limit(2).count().await.unwrap(), 2);

        let projected = enemies
            .find(doc! { "name": "Joker" })
            .projection(doc! { "_id": 0, "name": 1 })
            .one_document()
            .await
            .unwrap();
        assert_eq!(projected, doc! { "name": "Joker" });
    }

    #[tokio::test]
    async fn test_zero_timeout_never_reaches_store() {
        let (store, enemies) = seeded().await;
        let calls = store.calls();
        let find = enemies.find(doc! {}).timeout(Duration::ZERO);
        assert!(find.one::<Enemy>().await.unwrap_err().is_timeout());
        assert!(find.all::<Enemy>().await.unwrap_err().is_timeout());
        assert!(find.count().await.unwrap_err().is_timeout());
        assert_eq!(store.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let (store, enemies) = seeded().await;
        store.set_latency(Some(Duration::from_secs(10)));
        let err = enemies
            .find(doc! {})
            .timeout(Duration::from_millis(100))
            .one::<Enemy>()
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_times_out_across_many_advances() {
        let (store, enemies) = seeded().await;
        store.set_latency(Some(Duration::from_millis(100)));
        let started = tokio::time::Instant::now();

        let err = enemies
            .find(doc! {})
            .timeout(Duration::from_millis(150))
            .all::<Enemy>()
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(store.cursors_opened(), store.cursors_closed());
    }

    #[tokio::test]
    async fn test_cursor_iterates_matches() {
        let (store, enemies) = seeded().await;
        let iter = enemies.find(doc! { "year": 1940 }).sort(["name"]).cursor().await.unwrap();
        let first: Enemy = iter.next().await.unwrap();
        assert_eq!(first.name, "Catwoman");
        iter.close().await.unwrap();
        iter.close().await.unwrap();
        assert_eq!(store.cursors_closed(), 1);
    }
}
