//! Replace operation for swapping a whole document.

use bson::Document;

use crate::coerce::has_update_operator;
use crate::error::{QueryError, QueryResult};
use crate::operations::UpdateCounts;
use crate::options::ReplaceOptions;
use crate::query::Query;

/// Replace the first match with a new document.
///
/// The replacement keeps the `_id` of the document it replaces. Update
/// operators are not accepted here; use [`UpdateOperation`](crate::operations::UpdateOperation).
///
/// ```rust,ignore
/// enemies
///     .replace(doc! { "name": "Two-Face" }, &harvey)
///     .upsert()
///     .execute()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ReplaceOperation<'a> {
    query: Query<'a>,
    replacement: QueryResult<Document>,
    upsert: Option<bool>,
    bypass_document_validation: Option<bool>,
}

query_setters!(ReplaceOperation);

impl<'a> ReplaceOperation<'a> {
    pub(crate) fn new(query: Query<'a>, replacement: QueryResult<Document>) -> Self {
        Self {
            query,
            replacement,
            upsert: None,
            bypass_document_validation: None,
        }
    }

    /// Insert the replacement when nothing matches.
    pub fn upsert(mut self) -> Self {
        self.upsert = Some(true);
        self
    }

    /// Skip server-side schema validation.
    pub fn bypass_document_validation(mut self, bypass: bool) -> Self {
        self.bypass_document_validation = Some(bypass);
        self
    }

    /// Assemble the store options.
    pub fn build_options(&self) -> ReplaceOptions {
        ReplaceOptions {
            upsert: self.upsert,
            bypass_document_validation: self.bypass_document_validation,
            collation: self.query.collation().cloned(),
            hint: self.query.hint().cloned(),
            comment: self.query.comment().map(str::to_owned),
        }
    }

    /// Run the replacement.
    pub async fn execute(&self) -> QueryResult<UpdateCounts> {
        let replacement = self.replacement.clone()?;
        if has_update_operator(&replacement) {
            return Err(QueryError::invalid_argument(
                "replacement document must not contain update operators",
            ));
        }
        let result = self
            .query
            .execute(
                "replace_one",
                self.query.store().replace_one(
                    self.query.collection_name(),
                    self.query.filter().clone(),
                    replacement,
                    self.build_options(),
                ),
            )
            .await?;
        Ok(result.into())
    }
}
