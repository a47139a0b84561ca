//! Aggregation pipelines.

use bson::Document;
use serde::de::DeserializeOwned;

use crate::error::{QueryError, QueryResult};
use crate::iter::Iter;
use crate::options::AggregateOptions;
use crate::query::Query;
use crate::timeout::Deadline;

/// An aggregation over one collection.
///
/// # Example
///
/// ```rust,ignore
/// let per_year: Vec<Document> = enemies
///     .aggregate([doc! { "$group": { "_id": "$year", "n": { "$sum": 1 } } }])
///     .allow_disk_use(true)
///     .all()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct AggregateOperation<'a> {
    query: Query<'a>,
    pipeline: Vec<Document>,
    allow_disk_use: Option<bool>,
    batch_size: Option<u32>,
    bypass_document_validation: Option<bool>,
}

query_setters!(AggregateOperation);

impl<'a> AggregateOperation<'a> {
    pub(crate) fn new(query: Query<'a>, pipeline: Vec<Document>) -> Self {
        Self {
            query,
            pipeline,
            allow_disk_use: None,
            batch_size: None,
            bypass_document_validation: None,
        }
    }

    /// Let stages spill to disk.
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = Some(allow);
        self
    }

    /// Number of documents fetched per cursor round trip.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Skip schema validation in `$out` and `$merge` stages.
    pub fn bypass_document_validation(mut self, bypass: bool) -> Self {
        self.bypass_document_validation = Some(bypass);
        self
    }

    /// The pipeline stages.
    pub fn pipeline(&self) -> &[Document] {
        &self.pipeline
    }

    /// Assemble the store options.
    pub fn build_options(&self) -> AggregateOptions {
        AggregateOptions {
            allow_disk_use: self.allow_disk_use,
            batch_size: self.batch_size,
            bypass_document_validation: self.bypass_document_validation,
            collation: self.query.collation().cloned(),
            comment: self.query.comment().map(str::to_owned),
            hint: self.query.hint().cloned(),
            max_time: self.query.timeout(),
        }
    }

    /// Run the pipeline and iterate its output.
    pub async fn cursor(&self) -> QueryResult<Iter> {
        self.open(self.query.deadline()).await
    }

    async fn open(&self, deadline: Deadline) -> QueryResult<Iter> {
        let cursor = self
            .query
            .execute_within(
                "aggregate",
                deadline,
                self.query.store().aggregate(
                    self.query.collection_name(),
                    self.pipeline.clone(),
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

    /// Decode every output document under one deadline.
    pub async fn all<T>(&self) -> QueryResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let deadline = self.query.deadline();
        self.open(deadline).await?.all_within(deadline).await
    }

    /// Decode the first output document.
    ///
    /// An empty result is [`QueryError::NoDocuments`].
    pub async fn one<T>(&self) -> QueryResult<T>
    where
        T: DeserializeOwned,
    {
        let iter = self.cursor().await?;
        let first = iter.next::<T>().await;
        let closed = iter.close().await;
        if let Some(err) = iter.err() {
            return Err(err);
        }
        closed?;
        first.ok_or(QueryError::NoDocuments)
    }
}
