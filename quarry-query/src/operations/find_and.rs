//! Atomic find-and-modify on a single document.

use bson::{Bson, Document};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::coerce::{has_update_operator, is_update_document, to_document};
use crate::error::{QueryError, QueryResult};
use crate::options::{FindAndModifyOptions, ReturnDocument};
use crate::query::Query;

/// Atomically modify the first match and return it.
///
/// Created with [`FindOperation::one_and`](crate::operations::FindOperation::one_and).
/// By default the document is returned as it was before the change.
///
/// ```rust,ignore
/// let joker: Enemy = enemies
///     .find(doc! { "name": "Joker" })
///     .one_and()
///     .return_document(ReturnDocument::After)
///     .update(doc! { "$inc": { "escapes": 1 } })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct FindAndModifyOperation<'a> {
    query: Query<'a>,
    upsert: Option<bool>,
    array_filters: Option<Vec<Document>>,
    bypass_document_validation: Option<bool>,
    return_document: Option<ReturnDocument>,
    projection: Option<Document>,
    windowed: bool,
}

query_setters!(FindAndModifyOperation);

impl<'a> FindAndModifyOperation<'a> {
    pub(crate) fn new(query: Query<'a>) -> Self {
        Self {
            query,
            upsert: None,
            array_filters: None,
            bypass_document_validation: None,
            return_document: None,
            projection: None,
            windowed: false,
        }
    }

    /// Continue a find: its projection carries over, and a skip or limit
    /// makes every terminal fail since find-and-modify only targets the
    /// first match.
    pub(crate) fn from_find(
        query: Query<'a>,
        projection: Option<Document>,
        windowed: bool,
    ) -> Self {
        Self {
            projection,
            windowed,
            ..Self::new(query)
        }
    }

    fn check_window(&self) -> QueryResult<()> {
        if self.windowed {
            return Err(QueryError::invalid_argument(
                "find-and-modify does not accept skip or limit",
            ));
        }
        Ok(())
    }

    /// Insert a document when nothing matches.
    pub fn upsert(mut self) -> Self {
        self.upsert = Some(true);
        self
    }

    /// Filters selecting which array elements an update touches.
    pub fn array_filters<I>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        self.array_filters = Some(filters.into_iter().collect());
        self
    }

    /// Skip server-side schema validation.
    pub fn bypass_document_validation(mut self, bypass: bool) -> Self {
        self.bypass_document_validation = Some(bypass);
        self
    }

    /// Return the document before or after the change.
    pub fn return_document(mut self, when: ReturnDocument) -> Self {
        self.return_document = Some(when);
        self
    }

    /// Restrict the returned fields.
    pub fn projection(mut self, projection: impl Into<Document>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Assemble the store options.
    pub fn build_options(&self) -> FindAndModifyOptions {
        FindAndModifyOptions {
            sort: self.query.sort().cloned(),
            hint: self.query.hint().cloned(),
            projection: self.projection.clone(),
            upsert: self.upsert,
            array_filters: self.array_filters.clone(),
            bypass_document_validation: self.bypass_document_validation,
            return_document: self.return_document,
            collation: self.query.collation().cloned(),
            comment: self.query.comment().map(str::to_owned),
            max_time: self.query.timeout(),
        }
    }

    /// Apply update operators and decode the returned document.
    pub async fn update<T>(&self, update: impl Into<Document>) -> QueryResult<T>
    where
        T: DeserializeOwned,
    {
        self.check_window()?;
        let update = update.into();
        if !is_update_document(&update) {
            return Err(QueryError::invalid_argument(
                "update document must only contain update operators",
            ));
        }
        let found = self
            .query
            .execute(
                "find_one_and_update",
                self.query.store().find_one_and_update(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    update,
                    self.build_options(),
                ),
            )
            .await?;
        decode(found)
    }

    /// Replace the match and decode the returned document.
    pub async fn replace<T, R>(&self, replacement: &R) -> QueryResult<T>
    where
        T: DeserializeOwned,
        R: Serialize + ?Sized,
    {
        self.check_window()?;
        let replacement = to_document(replacement)?;
        if has_update_operator(&replacement) {
            return Err(QueryError::invalid_argument(
                "replacement document must not contain update operators",
            ));
        }
        let found = self
            .query
            .execute(
                "find_one_and_replace",
                self.query.store().find_one_and_replace(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    replacement,
                    self.build_options(),
                ),
            )
            .await?;
        decode(found)
    }

    /// Delete the match and decode it.
    ///
    /// Asking for the document after the change is rejected, since a deleted
    /// document no longer exists.
    pub async fn delete<T>(&self) -> QueryResult<T>
    where
        T: DeserializeOwned,
    {
        self.check_window()?;
        if self.return_document == Some(ReturnDocument::After) {
            return Err(QueryError::invalid_argument(
                "cannot return the document after deleting it",
            ));
        }
        let found = self
            .query
            .execute(
                "find_one_and_delete",
                self.query.store().find_one_and_delete(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    self.build_options(),
                ),
            )
            .await?;
        decode(found)
    }
}

fn decode<T: DeserializeOwned>(found: Option<Document>) -> QueryResult<T> {
    let document = found.ok_or(QueryError::NoDocuments)?;
    bson::from_bson(Bson::Document(document)).map_err(QueryError::from)
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

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Enemy {
        name: String,
        escapes: i32,
    }

    async fn seeded() -> (Arc<MemoryStore>, Collection) {
        let store = Arc::new(MemoryStore::new("batman_archive"));
        let enemies = Database::new(store.clone()).collection("enemies");
        enemies
            .insert()
            .many(vec![
                doc! { "name": "Joker", "escapes": 12 },
                doc! { "name": "Bane", "escapes": 3 },
            ])
            .await
            .unwrap();
        (store, enemies)
    }

    #[tokio::test]
    async fn test_update_returns_before_by_default() {
        let (_, enemies) = seeded().await;
        let before: Enemy = enemies
            .find(doc! { "name": "Joker" })
            .one_and()
            .update(doc! { "$inc": { "escapes": 1 } })
            .await
            .unwrap();
        assert_eq!(before.escapes, 12);

        let after: Enemy = enemies
            .find(doc! { "name": "Joker" })
            .one_and()
            .return_document(ReturnDocument::After)
            .update(doc! { "$inc": { "escapes": 1 } })
            .await
            .unwrap();
        assert_eq!(after.escapes, 14);
    }

    #[tokio::test]
    async fn test_replace_and_upsert() {
        let (_, enemies) = seeded().await;
        let after: Enemy = enemies
            .find(doc! { "name": "Penguin" })
            .one_and()
            .upsert()
            .return_document(ReturnDocument::After)
            .replace(&Enemy { name: "Penguin".into(), escapes: 0 })
            .await
            .unwrap();
        assert_eq!(after.name, "Penguin");
        assert_eq!(enemies.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_after_is_rejected_before_store() {
        let (store, enemies) = seeded().await;
        let calls = store.calls();
        let err = enemies
            .find(doc! { "name": "Bane" })
            .one_and()
            .return_document(ReturnDocument::After)
            .delete::<Enemy>()
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(store.calls(), calls);
        assert_eq!(enemies.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_returns_removed_document() {
        let (_, enemies) = seeded().await;
        let gone: Enemy = enemies
            .find(doc! { "name": "Bane" })
            .one_and()
            .delete()
            .await
            .unwrap();
        assert_eq!(gone.escapes, 3);

        let err = enemies
            .find(doc! { "name": "Bane" })
            .one_and()
            .delete::<Enemy>()
            .await
            .unwrap_err();
        assert!(err.is_no_documents());
    }

    #[tokio::test]
    async fn test_find_projection_carries_over() {
        let (_, enemies) = seeded().await;
        let after = enemies
            .find(doc! { "name": "Joker" })
            .projection(doc! { "_id": 0, "escapes": 1 })
            .one_and()
            .return_document(ReturnDocument::After)
            .update::<Document>(doc! { "$inc": { "escapes": 1 } })
            .await
            .unwrap();
        assert_eq!(after, doc! { "escapes": 13 });
    }

    #[tokio::test]
    async fn test_find_window_rejected_before_store() {
        let (store, enemies) = seeded().await;
        let calls = store.calls();
        let skipped = enemies.find(doc! {}).skip(1).one_and();
        let err = skipped
            .update::<Enemy>(doc! { "$inc": { "escapes": 1 } })
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        let err = enemies
            .find(doc! {})
            .limit(1)
            .one_and()
            .delete::<Enemy>()
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(store.calls(), calls);
        assert_eq!(enemies.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mismatched_payloads_rejected() {
        let (_, enemies) = seeded().await;
        let finder = enemies.find(doc! { "name": "Joker" }).one_and();
        let err = finder
            .update::<Enemy>(doc! { "escapes": 0 })
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        let err = finder
            .replace::<Enemy, _>(&doc! { "$set": { "escapes": 0 } })
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
