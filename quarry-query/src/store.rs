//! The document store capability consumed by the query engine.
//!
//! A [`Store`] is bound to one database. Every call names the collection it
//! acts on and receives fully assembled options; deadlines are enforced by
//! the caller, so implementations only need to honor `max_time` hints where
//! the backend supports them.

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::StoreResult;
use crate::options::{
    AggregateOptions, CountOptions, DeleteOptions, DistinctOptions, FindAndModifyOptions,
    FindOptions, InsertOptions, ReplaceOptions, UpdateOptions,
};

/// Outcome of an update or replace call as reported by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents actually changed.
    pub modified_count: u64,
    /// Identifier of a document created by an upsert.
    pub upserted_id: Option<Bson>,
}

/// A forward-only result cursor.
#[async_trait]
pub trait StoreCursor: Send {
    /// Move to the next document. Returns `false` once exhausted.
    async fn advance(&mut self) -> StoreResult<bool>;

    /// The document the cursor currently points at.
    fn current(&self) -> StoreResult<Document>;

    /// Collect every remaining document.
    async fn drain(&mut self) -> StoreResult<Vec<Document>> {
        let mut documents = Vec::new();
        while self.advance().await? {
            documents.push(self.current()?);
        }
        Ok(documents)
    }

    /// Release server-side resources.
    async fn close(&mut self) -> StoreResult<()>;
}

/// A document database bound to a single database name.
#[async_trait]
pub trait Store: Send + Sync {
    /// Name of the database this store is bound to.
    fn database_name(&self) -> &str;

    /// Find the first matching document.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Option<Document>>;

    /// Open a cursor over matching documents.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Box<dyn StoreCursor>>;

    /// Insert one document, returning its identifier.
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        options: InsertOptions,
    ) -> StoreResult<Bson>;

    /// Insert documents, returning their identifiers in input order.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: InsertOptions,
    ) -> StoreResult<Vec<Bson>>;

    /// Update the first matching document.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult>;

    /// Update every matching document.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult>;

    /// Replace the first matching document.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: ReplaceOptions,
    ) -> StoreResult<UpdateResult>;

    /// Delete the first matching document, returning the deleted count.
    async fn delete_one(
        &self,
        collection: &str,
        filter: Document,
        options: DeleteOptions,
    ) -> StoreResult<u64>;

    /// Delete every matching document, returning the deleted count.
    async fn delete_many(
        &self,
        collection: &str,
        filter: Document,
        options: DeleteOptions,
    ) -> StoreResult<u64>;

    /// Atomically update one document and return it.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>>;

    /// Atomically replace one document and return it.
    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>>;

    /// Atomically delete one document and return it.
    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>>;

    /// Run an aggregation pipeline.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> StoreResult<Box<dyn StoreCursor>>;

    /// Count matching documents.
    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> StoreResult<u64>;

    /// Fast, metadata-based document count.
    async fn estimated_document_count(&self, collection: &str) -> StoreResult<u64>;

    /// Distinct values of a field among matching documents.
    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
        options: DistinctOptions,
    ) -> StoreResult<Vec<Bson>>;

    /// Create an index, returning its name.
    async fn create_index(&self, collection: &str, keys: Document) -> StoreResult<String>;

    /// Drop an index by name.
    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()>;

    /// Drop a collection.
    async fn drop_collection(&self, collection: &str) -> StoreResult<()>;

    /// Names of the collections in this database.
    async fn list_collection_names(&self, filter: Document) -> StoreResult<Vec<String>>;

    /// Drop the whole database.
    async fn drop_database(&self) -> StoreResult<()>;

    /// Run a raw database command.
    async fn run_command(&self, command: Document) -> StoreResult<Document>;
}
