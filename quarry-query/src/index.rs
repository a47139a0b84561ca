//! Index management on a collection.

use bson::Document;

use crate::coerce::key_document;
use crate::collection::{Collection, administer};
use crate::error::{QueryError, QueryResult};

/// A (possibly compound) index over a collection.
///
/// ```rust,ignore
/// let name = enemies.index(["name", "-year"]).ensure().await?;
/// assert_eq!(name, "name_1_year_-1");
/// ```
#[derive(Debug, Clone)]
pub struct Index<'a> {
    collection: &'a Collection,
    keys: Document,
}

impl<'a> Index<'a> {
    pub(crate) fn new<I, S>(collection: &'a Collection, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            collection,
            keys: key_document(keys),
        }
    }

    /// The key document, e.g. `{ "name": 1, "year": -1 }`.
    pub fn keys(&self) -> &Document {
        &self.keys
    }

    /// The name the server gives this index by default.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| format!("{field}_{direction}"))
            .collect::<Vec<_>>()
            .join("_")
    }

    fn require_keys(&self) -> QueryResult<()> {
        if self.keys.is_empty() {
            return Err(QueryError::invalid_argument("an index needs at least one key"));
        }
        Ok(())
    }

    /// Create the index if it does not exist and return its name.
    pub async fn ensure(&self) -> QueryResult<String> {
        self.require_keys()?;
        administer(
            self.collection.name(),
            self.collection.timeouts(),
            "create_index",
            self.collection
                .store()
                .create_index(self.collection.name(), self.keys.clone()),
        )
        .await
    }

    /// Drop the index.
    pub async fn drop(&self) -> QueryResult<()> {
        self.require_keys()?;
        let name = self.name();
        administer(
            self.collection.name(),
            self.collection.timeouts(),
            "drop_index",
            self.collection.store().drop_index(self.collection.name(), &name),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::memory::MemoryStore;
    use bson::doc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ensure_and_drop() {
        let store = Arc::new(MemoryStore::new("batman_archive"));
        let enemies = Database::new(store.clone()).collection("enemies");
        let index = enemies.index(["name", "-year"]);
        assert_eq!(index.keys(), &doc! { "name": 1, "year": -1 });

        let name = index.ensure().await.unwrap();
        assert_eq!(name, "name_1_year_-1");
        assert_eq!(name, index.name());
        assert_eq!(store.index_names("enemies"), vec![name.clone()]);

        index.drop().await.unwrap();
        assert!(store.index_names("enemies").is_empty());
        assert!(index.drop().await.unwrap_err().as_store_error().is_some());
    }

    #[tokio::test]
    async fn test_empty_keys_rejected() {
        let store = Arc::new(MemoryStore::new("batman_archive"));
        let enemies = Database::new(store.clone()).collection("enemies");
        let err = enemies.index(["", "-"]).ensure().await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(store.calls(), 0);
    }
}
