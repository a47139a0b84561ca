//! Update operation for modifying existing documents.

use bson::{Bson, Document};

use crate::coerce::is_update_document;
use crate::error::{QueryError, QueryResult};
use crate::options::UpdateOptions;
use crate::query::Query;
use crate::store::UpdateResult;

/// What an update or replace did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateCounts {
    /// Documents matched by the filter.
    pub matched: u64,
    /// Documents changed, including one created by an upsert.
    pub modified: u64,
    /// `_id` of a document created by an upsert.
    pub upserted_id: Option<Bson>,
}

impl From<UpdateResult> for UpdateCounts {
    fn from(result: UpdateResult) -> Self {
        let created = u64::from(result.upserted_id.is_some());
        Self {
            matched: result.matched_count,
            modified: result.modified_count + created,
            upserted_id: result.upserted_id,
        }
    }
}

/// An update operation applying operators such as `$set` or `$inc`.
///
/// # Example
///
/// ```rust,ignore
/// let counts = enemies
///     .update(doc! { "name": "Joker" }, doc! { "$set": { "captured": true } })
///     .upsert()
///     .one()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct UpdateOperation<'a> {
    query: Query<'a>,
    update: Document,
    upsert: Option<bool>,
    array_filters: Option<Vec<Document>>,
    bypass_document_validation: Option<bool>,
}

query_setters!(UpdateOperation);

impl<'a> UpdateOperation<'a> {
    pub(crate) fn new(query: Query<'a>, update: Document) -> Self {
        Self {
            query,
            update,
            upsert: None,
            array_filters: None,
            bypass_document_validation: None,
        }
    }

    /// Insert a document when nothing matches.
    pub fn upsert(mut self) -> Self {
        self.upsert = Some(true);
        self
    }

    /// Filters selecting which array elements the update touches.
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

    /// The update document.
    pub fn update_document(&self) -> &Document {
        &self.update
    }

    /// Assemble the store options.
    pub fn build_options(&self) -> UpdateOptions {
        UpdateOptions {
            upsert: self.upsert,
            array_filters: self.array_filters.clone(),
            bypass_document_validation: self.bypass_document_validation,
            collation: self.query.collation().cloned(),
            hint: self.query.hint().cloned(),
            comment: self.query.comment().map(str::to_owned),
        }
    }

    fn validate(&self) -> QueryResult<()> {
        if is_update_document(&self.update) {
            Ok(())
        } else {
            Err(QueryError::invalid_argument(
                "update document must only contain update operators",
            ))
        }
    }

    /// Update the first match.
    pub async fn one(&self) -> QueryResult<UpdateCounts> {
        self.validate()?;
        let result = self
            .query
            .execute(
                "update_one",
                self.query.store().update_one(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    self.update.clone(),
                    self.build_options(),
                ),
            )
            .await?;
        Ok(result.into())
    }

    /// Update every match.
    pub async fn many(&self) -> QueryResult<UpdateCounts> {
        self.validate()?;
        let result = self
            .query
            .execute(
                "update_many",
                self.query.store().update_many(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    self.update.clone(),
                    self.build_options(),
                ),
            )
            .await?;
        Ok(result.into())
    }
}
