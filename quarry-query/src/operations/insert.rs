//! Insert operation for adding new documents.

use bson::Bson;
use serde::Serialize;

use crate::coerce::{to_document, to_documents};
use crate::error::{QueryError, QueryResult};
use crate::options::InsertOptions;
use crate::query::Query;

/// An insert operation.
///
/// # Example
///
/// ```rust,ignore
/// let id = enemies.insert().one(&Enemy { name: "Joker".into() }).await?;
/// let ids = enemies.insert().ordered(false).many(rogues).await?;
/// ```
#[derive(Debug, Clone)]
pub struct InsertOperation<'a> {
    query: Query<'a>,
    bypass_document_validation: Option<bool>,
    ordered: Option<bool>,
}

query_setters!(InsertOperation);

impl<'a> InsertOperation<'a> {
    pub(crate) fn new(query: Query<'a>) -> Self {
        Self {
            query,
            bypass_document_validation: None,
            ordered: None,
        }
    }

    /// Skip server-side schema validation.
    pub fn bypass_document_validation(mut self, bypass: bool) -> Self {
        self.bypass_document_validation = Some(bypass);
        self
    }

    /// Stop at the first failed insert (the default) or keep going.
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = Some(ordered);
        self
    }

    /// Assemble the store options.
    pub fn build_options(&self) -> InsertOptions {
        InsertOptions {
            bypass_document_validation: self.bypass_document_validation,
            ordered: self.ordered,
            comment: self.query.comment().map(str::to_owned),
        }
    }

    /// Insert one document and return its `_id`.
    pub async fn one<T>(&self, document: &T) -> QueryResult<Bson>
    where
        T: Serialize + ?Sized,
    {
        let document = to_document(document)?;
        self.query
            .execute(
                "insert_one",
                self.query.store().insert_one(
                    self.query.collection_name(),
                    document,
                    self.build_options(),
                ),
            )
            .await
    }

    /// Insert every document and return their `_id`s in input order.
    ///
    /// An empty input is rejected without calling the store.
    pub async fn many<I, T>(&self, documents: I) -> QueryResult<Vec<Bson>>
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        let documents = to_documents(documents)?;
        if documents.is_empty() {
            return Err(QueryError::invalid_argument(
                "insert requires at least one document",
            ));
        }
        self.query
            .execute(
                "insert_many",
                self.query.store().insert_many(
                    self.query.collection_name(),
                    documents,
                    self.build_options(),
                ),
            )
            .await
    }
}
