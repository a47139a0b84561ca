//! Delete operation for removing documents.

use crate::error::QueryResult;
use crate::options::DeleteOptions;
use crate::query::Query;

/// A delete operation.
///
/// # Example
///
/// ```rust,ignore
/// let deleted = enemies.delete(doc! { "captured": true }).many().await?;
/// ```
#[derive(Debug, Clone)]
pub struct DeleteOperation<'a> {
    query: Query<'a>,
}

query_setters!(DeleteOperation);

impl<'a> DeleteOperation<'a> {
    pub(crate) fn new(query: Query<'a>) -> Self {
        Self { query }
    }

    /// Assemble the store options.
    pub fn build_options(&self) -> DeleteOptions {
        DeleteOptions {
            collation: self.query.collation().cloned(),
            hint: self.query.hint().cloned(),
            comment: self.query.comment().map(str::to_owned),
        }
    }

    /// Delete the first match, returning how many documents were removed.
    pub async fn one(&self) -> QueryResult<u64> {
        self.query
            .execute(
                "delete_one",
                self.query.store().delete_one(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    self.build_options(),
                ),
            )
            .await
    }

    /// Delete every match, returning how many documents were removed.
    pub async fn many(&self) -> QueryResult<u64> {
        self.query
            .execute(
                "delete_many",
                self.query.store().delete_many(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    self.build_options(),
                ),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::memory::MemoryStore;
    use crate::options::Collation;
    use bson::{Document, doc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    async fn seeded() -> crate::Collection {
        let store = Arc::new(MemoryStore::new("letters"));
        let letters = Database::new(store).collection("letters");
        letters
            .insert()
            .many([doc! { "name": "A" }, doc! { "name": "B" }, doc! { "name": "C" }])
            .await
            .unwrap();
        letters
    }

    #[tokio::test]
    async fn test_delete_one_then_count() {
        let letters = seeded().await;
        assert_eq!(letters.delete(doc! { "name": "B" }).one().await.unwrap(), 1);
        assert_eq!(letters.find(doc! {}).count().await.unwrap(), 2);
        let err = letters
            .find(doc! { "name": "B" })
            .one::<Document>()
            .await
            .unwrap_err();
        assert!(err.is_no_documents());
    }

    #[tokio::test]
    async fn test_delete_many() {
        let letters = seeded().await;
        let deleted = letters
            .delete(doc! { "name": { "$in": ["A", "C", "Z"] } })
            .many()
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(letters.delete(doc! { "name": "Z" }).one().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_build_options() {
        let letters = seeded().await;
        let options = letters
            .delete(doc! {})
            .hint(["name"])
            .collation(Collation::new("en"))
            .comment("spring cleaning")
            .build_options();
        assert_eq!(options.hint, Some(doc! { "name": 1 }));
        assert_eq!(options.collation.map(|c| c.locale), Some("en".to_string()));
        assert_eq!(options.comment.as_deref(), Some("spring cleaning"));
    }

    #[tokio::test]
    async fn test_zero_timeout_deletes_nothing() {
        let letters = seeded().await;
        let err = letters
            .delete(doc! {})
            .timeout(Duration::ZERO)
            .many()
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(letters.count().await.unwrap(), 3);
    }
}
