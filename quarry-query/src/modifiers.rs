//! Update document construction.

use bson::{Bson, Document};

/// Builder for update documents such as `{ "$set": {..}, "$inc": {..} }`.
///
/// Repeated calls for the same operator accumulate fields under it.
///
/// ```rust
/// use bson::doc;
/// use quarry_query::UpdateDocument;
///
/// let update = UpdateDocument::new()
///     .set("captured", true)
///     .set("cell", "Arkham 12")
///     .inc("escapes", 1)
///     .build();
///
/// assert_eq!(
///     update,
///     doc! { "$set": { "captured": true, "cell": "Arkham 12" }, "$inc": { "escapes": 1 } }
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDocument {
    doc: Document,
}

impl UpdateDocument {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    fn field(mut self, operator: &str, field: &str, value: Bson) -> Self {
        if let Some(Bson::Document(fields)) = self.doc.get_mut(operator) {
            fields.insert(field, value);
            return self;
        }
        let mut fields = Document::new();
        fields.insert(field, value);
        self.doc.insert(operator, fields);
        self
    }

    /// Set a field.
    pub fn set(self, field: &str, value: impl Into<Bson>) -> Self {
        self.field("$set", field, value.into())
    }

    /// Set a field only when an upsert inserts the document.
    pub fn set_on_insert(self, field: &str, value: impl Into<Bson>) -> Self {
        self.field("$setOnInsert", field, value.into())
    }

    /// Remove a field.
    pub fn unset(self, field: &str) -> Self {
        self.field("$unset", field, Bson::String(String::new()))
    }

    /// Add to a numeric field.
    pub fn inc(self, field: &str, amount: impl Into<Bson>) -> Self {
        self.field("$inc", field, amount.into())
    }

    /// Subtract from a numeric field.
    ///
    /// Non-numeric amounts are passed through and rejected by the store.
    pub fn dec(self, field: &str, amount: impl Into<Bson>) -> Self {
        let negated = match amount.into() {
            Bson::Int32(n) => Bson::Int32(n.saturating_neg()),
            Bson::Int64(n) => Bson::Int64(n.saturating_neg()),
            Bson::Double(n) => Bson::Double(-n),
            other => other,
        };
        self.field("$inc", field, negated)
    }

    /// Append a value to an array field.
    pub fn push(self, field: &str, value: impl Into<Bson>) -> Self {
        self.field("$push", field, value.into())
    }

    /// Append a value unless the array already holds it.
    pub fn add_to_set(self, field: &str, value: impl Into<Bson>) -> Self {
        self.field("$addToSet", field, value.into())
    }

    /// Remove every occurrence of a value from an array field.
    pub fn pull(self, field: &str, value: impl Into<Bson>) -> Self {
        self.field("$pull", field, value.into())
    }

    /// Remove every occurrence of each value from an array field.
    pub fn pull_all<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.field("$pullAll", field, values.into())
    }

    /// Remove the first element of an array field.
    pub fn pop_first(self, field: &str) -> Self {
        self.field("$pop", field, Bson::Int32(-1))
    }

    /// Remove the last element of an array field.
    pub fn pop_last(self, field: &str) -> Self {
        self.field("$pop", field, Bson::Int32(1))
    }

    /// Whether no operator has been added.
    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }

    /// Build the update document.
    pub fn build(self) -> Document {
        self.doc
    }
}

impl From<UpdateDocument> for Document {
    fn from(update: UpdateDocument) -> Self {
        update.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::memory::MemoryStore;
    use bson::doc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_operators_accumulate() {
        let update = UpdateDocument::new()
            .push("tags", "clown")
            .unset("alias")
            .push("gadgets", "acid flower")
            .dec("health", 10)
            .pop_first("queue")
            .pop_last("stack")
            .pull_all("tags", ["mime"])
            .build();
        assert_eq!(
            update,
            doc! {
                "$push": { "tags": "clown", "gadgets": "acid flower" },
                "$unset": { "alias": "" },
                "$inc": { "health": -10 },
                "$pop": { "queue": -1, "stack": 1 },
                "$pullAll": { "tags": ["mime"] },
            }
        );
    }

    #[test]
    fn test_empty() {
        assert!(UpdateDocument::new().is_empty());
        assert!(!UpdateDocument::new().set("a", 1).is_empty());
    }

    #[tokio::test]
    async fn test_applied_through_update() {
        let db = Database::new(Arc::new(MemoryStore::new("batman_archive")));
        let enemies = db.collection("enemies");
        let id = enemies
            .insert()
            .one(&doc! { "name": "Joker", "escapes": 3, "tags": ["clown", "mime"] })
            .await
            .unwrap();

        let update = UpdateDocument::new()
            .set("captured", true)
            .dec("escapes", 1)
            .add_to_set("tags", "clown")
            .pull("tags", "mime");
        enemies.update_by_id(id.clone(), update).await.unwrap();

        let joker = enemies.find(doc! { "_id": id }).one_document().await.unwrap();
        assert!(joker.get_bool("captured").unwrap());
        assert_eq!(joker.get_i32("escapes").unwrap(), 2);
        assert_eq!(joker.get_array("tags").unwrap(), &vec![Bson::from("clown")]);
    }
}
