//! [`Store`] implementation over the official MongoDB driver.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{
    AggregateOptions as DriverAggregateOptions, Collation as DriverCollation,
    CountOptions as DriverCountOptions, DeleteOptions as DriverDeleteOptions,
    DistinctOptions as DriverDistinctOptions, FindOneAndDeleteOptions, FindOneAndReplaceOptions,
    FindOneAndUpdateOptions, FindOneOptions, FindOptions as DriverFindOptions, Hint,
    InsertManyOptions, InsertOneOptions, ReplaceOptions as DriverReplaceOptions,
    ReturnDocument as DriverReturnDocument, UpdateOptions as DriverUpdateOptions,
};
use mongodb::{Collection, Cursor, Database, IndexModel};
use quarry_query::options::{
    AggregateOptions, Collation, CountOptions, DeleteOptions, DistinctOptions,
    FindAndModifyOptions, FindOptions, InsertOptions, ReplaceOptions, UpdateOptions,
};
use quarry_query::{ReturnDocument, Store, StoreCursor, StoreError, StoreResult, UpdateResult};

use crate::error::store_error;

/// A [`Store`] bound to one MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
    name: String,
}

impl MongoStore {
    /// Wrap a driver database handle.
    pub fn new(database: Database) -> Self {
        let name = database.name().to_string();
        Self { database, name }
    }

    /// The underlying driver database handle.
    pub fn driver_database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }
}

impl std::fmt::Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore").field("database", &self.name).finish()
    }
}

/// Convert a collation into the driver's type.
pub fn driver_collation(collation: Option<Collation>) -> StoreResult<Option<DriverCollation>> {
    let Some(collation) = collation else {
        return Ok(None);
    };
    let document = bson::to_document(&collation)?;
    let converted = bson::from_document::<DriverCollation>(document)
        .map_err(|e| StoreError::encode(format!("invalid collation: {e}")))?;
    Ok(Some(converted))
}

fn driver_return_document(value: ReturnDocument) -> DriverReturnDocument {
    match value {
        ReturnDocument::Before => DriverReturnDocument::Before,
        ReturnDocument::After => DriverReturnDocument::After,
    }
}

fn find_one_options(options: FindOptions) -> StoreResult<FindOneOptions> {
    let mut driver = FindOneOptions::default();
    driver.sort = options.sort;
    driver.hint = options.hint.map(Hint::Keys);
    driver.skip = options.skip;
    driver.projection = options.projection;
    driver.allow_partial_results = options.allow_partial_results;
    driver.comment = options.comment.map(Into::into);
    driver.collation = driver_collation(options.collation)?;
    driver.max_time = options.max_time;
    Ok(driver)
}

fn find_options(options: FindOptions) -> StoreResult<DriverFindOptions> {
    let mut driver = DriverFindOptions::default();
    driver.sort = options.sort;
    driver.hint = options.hint.map(Hint::Keys);
    driver.skip = options.skip;
    driver.limit = options.limit;
    driver.batch_size = options.batch_size;
    driver.projection = options.projection;
    driver.allow_disk_use = options.allow_disk_use;
    driver.allow_partial_results = options.allow_partial_results;
    driver.comment = options.comment.map(Into::into);
    driver.collation = driver_collation(options.collation)?;
    driver.max_time = options.max_time;
    Ok(driver)
}

fn insert_one_options(options: InsertOptions) -> InsertOneOptions {
    let mut driver = InsertOneOptions::default();
    driver.bypass_document_validation = options.bypass_document_validation;
    driver.comment = options.comment.map(Into::into);
    driver
}

fn insert_many_options(options: InsertOptions) -> InsertManyOptions {
    let mut driver = InsertManyOptions::default();
    driver.bypass_document_validation = options.bypass_document_validation;
    driver.ordered = options.ordered;
    driver.comment = options.comment.map(Into::into);
    driver
}

fn update_options(options: UpdateOptions) -> StoreResult<DriverUpdateOptions> {
    let mut driver = DriverUpdateOptions::default();
    driver.upsert = options.upsert;
    driver.array_filters = options.array_filters;
    driver.bypass_document_validation = options.bypass_document_validation;
    driver.collation = driver_collation(options.collation)?;
    driver.hint = options.hint.map(Hint::Keys);
    driver.comment = options.comment.map(Into::into);
    Ok(driver)
}

fn replace_options(options: ReplaceOptions) -> StoreResult<DriverReplaceOptions> {
    let mut driver = DriverReplaceOptions::default();
    driver.upsert = options.upsert;
    driver.bypass_document_validation = options.bypass_document_validation;
    driver.collation = driver_collation(options.collation)?;
    driver.hint = options.hint.map(Hint::Keys);
    driver.comment = options.comment.map(Into::into);
    Ok(driver)
}

fn delete_options(options: DeleteOptions) -> StoreResult<DriverDeleteOptions> {
    let mut driver = DriverDeleteOptions::default();
    driver.collation = driver_collation(options.collation)?;
    driver.hint = options.hint.map(Hint::Keys);
    driver.comment = options.comment.map(Into::into);
    Ok(driver)
}

fn find_one_and_update_options(
    options: FindAndModifyOptions,
) -> StoreResult<FindOneAndUpdateOptions> {
    let mut driver = FindOneAndUpdateOptions::default();
    driver.sort = options.sort;
    driver.hint = options.hint.map(Hint::Keys);
    driver.projection = options.projection;
    driver.upsert = options.upsert;
    driver.array_filters = options.array_filters;
    driver.bypass_document_validation = options.bypass_document_validation;
    driver.return_document = options.return_document.map(driver_return_document);
    driver.collation = driver_collation(options.collation)?;
    driver.comment = options.comment.map(Into::into);
    driver.max_time = options.max_time;
    Ok(driver)
}

fn find_one_and_replace_options(
    options: FindAndModifyOptions,
) -> StoreResult<FindOneAndReplaceOptions> {
    let mut driver = FindOneAndReplaceOptions::default();
    driver.sort = options.sort;
    driver.hint = options.hint.map(Hint::Keys);
    driver.projection = options.projection;
    driver.upsert = options.upsert;
    driver.bypass_document_validation = options.bypass_document_validation;
    driver.return_document = options.return_document.map(driver_return_document);
    driver.collation = driver_collation(options.collation)?;
    driver.comment = options.comment.map(Into::into);
    driver.max_time = options.max_time;
    Ok(driver)
}

fn find_one_and_delete_options(
    options: FindAndModifyOptions,
) -> StoreResult<FindOneAndDeleteOptions> {
    let mut driver = FindOneAndDeleteOptions::default();
    driver.sort = options.sort;
    driver.hint = options.hint.map(Hint::Keys);
    driver.projection = options.projection;
    driver.collation = driver_collation(options.collation)?;
    driver.comment = options.comment.map(Into::into);
    driver.max_time = options.max_time;
    Ok(driver)
}

fn aggregate_options(options: AggregateOptions) -> StoreResult<DriverAggregateOptions> {
    let mut driver = DriverAggregateOptions::default();
    driver.allow_disk_use = options.allow_disk_use;
    driver.batch_size = options.batch_size;
    driver.bypass_document_validation = options.bypass_document_validation;
    driver.collation = driver_collation(options.collation)?;
    driver.comment = options.comment.map(Into::into);
    driver.hint = options.hint.map(Hint::Keys);
    driver.max_time = options.max_time;
    Ok(driver)
}

fn count_options(options: CountOptions) -> StoreResult<DriverCountOptions> {
    let mut driver = DriverCountOptions::default();
    driver.hint = options.hint.map(Hint::Keys);
    driver.skip = options.skip;
    driver.limit = options.limit;
    driver.collation = driver_collation(options.collation)?;
    driver.max_time = options.max_time;
    Ok(driver)
}

fn distinct_options(options: DistinctOptions) -> StoreResult<DriverDistinctOptions> {
    let mut driver = DriverDistinctOptions::default();
    driver.collation = driver_collation(options.collation)?;
    driver.max_time = options.max_time;
    Ok(driver)
}

fn update_result(result: mongodb::results::UpdateResult) -> UpdateResult {
    UpdateResult {
        matched_count: result.matched_count,
        modified_count: result.modified_count,
        upserted_id: result.upserted_id,
    }
}

#[async_trait]
impl Store for MongoStore {
    fn database_name(&self) -> &str {
        &self.name
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Option<Document>> {
        let options = find_one_options(options)?;
        self.collection(collection)
            .find_one(filter, options)
            .await
            .map_err(store_error)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Box<dyn StoreCursor>> {
        let options = find_options(options)?;
        let cursor = self
            .collection(collection)
            .find(filter, options)
            .await
            .map_err(store_error)?;
        Ok(Box::new(MongoCursor::new(cursor)))
    }

    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        options: InsertOptions,
    ) -> StoreResult<Bson> {
        let result = self
            .collection(collection)
            .insert_one(document, insert_one_options(options))
            .await
            .map_err(store_error)?;
        Ok(result.inserted_id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: InsertOptions,
    ) -> StoreResult<Vec<Bson>> {
        let result = self
            .collection(collection)
            .insert_many(documents, insert_many_options(options))
            .await
            .map_err(store_error)?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        let options = update_options(options)?;
        self.collection(collection)
            .update_one(filter, update, options)
            .await
            .map(update_result)
            .map_err(store_error)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        let options = update_options(options)?;
        self.collection(collection)
            .update_many(filter, update, options)
            .await
            .map(update_result)
            .map_err(store_error)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: ReplaceOptions,
    ) -> StoreResult<UpdateResult> {
        let options = replace_options(options)?;
        self.collection(collection)
            .replace_one(filter, replacement, options)
            .await
            .map(update_result)
            .map_err(store_error)
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: Document,
        options: DeleteOptions,
    ) -> StoreResult<u64> {
        let options = delete_options(options)?;
        self.collection(collection)
            .delete_one(filter, options)
            .await
            .map(|result| result.deleted_count)
            .map_err(store_error)
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: Document,
        options: DeleteOptions,
    ) -> StoreResult<u64> {
        let options = delete_options(options)?;
        self.collection(collection)
            .delete_many(filter, options)
            .await
            .map(|result| result.deleted_count)
            .map_err(store_error)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        let options = find_one_and_update_options(options)?;
        self.collection(collection)
            .find_one_and_update(filter, update, options)
            .await
            .map_err(store_error)
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        let options = find_one_and_replace_options(options)?;
        self.collection(collection)
            .find_one_and_replace(filter, replacement, options)
            .await
            .map_err(store_error)
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        let options = find_one_and_delete_options(options)?;
        self.collection(collection)
            .find_one_and_delete(filter, options)
            .await
            .map_err(store_error)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> StoreResult<Box<dyn StoreCursor>> {
        let options = aggregate_options(options)?;
        let cursor = self
            .collection(collection)
            .aggregate(pipeline, options)
            .await
            .map_err(store_error)?;
        Ok(Box::new(MongoCursor::new(cursor)))
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> StoreResult<u64> {
        let options = count_options(options)?;
        self.collection(collection)
            .count_documents(filter, options)
            .await
            .map_err(store_error)
    }

    async fn estimated_document_count(&self, collection: &str) -> StoreResult<u64> {
        self.collection(collection)
            .estimated_document_count(None)
            .await
            .map_err(store_error)
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
        options: DistinctOptions,
    ) -> StoreResult<Vec<Bson>> {
        let options = distinct_options(options)?;
        self.collection(collection)
            .distinct(field, filter, options)
            .await
            .map_err(store_error)
    }

    async fn create_index(&self, collection: &str, keys: Document) -> StoreResult<String> {
        let model = IndexModel::builder().keys(keys).build();
        self.collection(collection)
            .create_index(model, None)
            .await
            .map(|result| result.index_name)
            .map_err(store_error)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()> {
        self.collection(collection)
            .drop_index(name, None)
            .await
            .map_err(store_error)
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.collection(collection).drop(None).await.map_err(store_error)
    }

    async fn list_collection_names(&self, filter: Document) -> StoreResult<Vec<String>> {
        self.database
            .list_collection_names(filter)
            .await
            .map_err(store_error)
    }

    async fn drop_database(&self) -> StoreResult<()> {
        self.database.drop(None).await.map_err(store_error)
    }

    async fn run_command(&self, command: Document) -> StoreResult<Document> {
        self.database
            .run_command(command, None)
            .await
            .map_err(store_error)
    }
}

/// A driver cursor behind the [`StoreCursor`] interface.
///
/// Dropping the driver cursor kills it on the server, so closing just
/// releases it.
pub struct MongoCursor {
    cursor: Option<Cursor<Document>>,
}

impl MongoCursor {
    /// Wrap a driver cursor.
    pub fn new(cursor: Cursor<Document>) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }
}

#[async_trait]
impl StoreCursor for MongoCursor {
    async fn advance(&mut self) -> StoreResult<bool> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.advance().await.map_err(store_error),
            None => Ok(false),
        }
    }

    fn current(&self) -> StoreResult<Document> {
        match self.cursor.as_ref() {
            Some(cursor) => cursor.deserialize_current().map_err(store_error),
            None => Err(StoreError::backend("cursor is closed")),
        }
    }

    async fn drain(&mut self) -> StoreResult<Vec<Document>> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor
                .try_collect::<Vec<Document>>()
                .await
                .map_err(store_error),
            None => Ok(Vec::new()),
        }
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.cursor = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use mongodb::options::CollationStrength;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_collation_conversion() {
        let collation = Collation::new("en").strength(2).numeric_ordering(true);
        let converted = driver_collation(Some(collation)).unwrap().unwrap();
        assert_eq!(converted.locale, "en");
        assert!(matches!(converted.strength, Some(CollationStrength::Secondary)));
        assert_eq!(converted.numeric_ordering, Some(true));
        assert!(driver_collation(None).unwrap().is_none());
    }

    #[test]
    fn test_find_options_mapping() {
        let options = FindOptions {
            sort: Some(doc! { "year": -1 }),
            hint: Some(doc! { "name": 1 }),
            skip: Some(2),
            limit: Some(5),
            batch_size: Some(50),
            comment: Some("rogues".to_string()),
            max_time: Some(Duration::from_millis(300)),
            ..Default::default()
        };
        let driver = find_options(options).unwrap();
        assert_eq!(driver.sort, Some(doc! { "year": -1 }));
        assert!(matches!(driver.hint, Some(Hint::Keys(ref keys)) if keys == &doc! { "name": 1 }));
        assert_eq!(driver.skip, Some(2));
        assert_eq!(driver.limit, Some(5));
        assert_eq!(driver.batch_size, Some(50));
        assert_eq!(driver.max_time, Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_find_and_modify_mapping() {
        let options = FindAndModifyOptions {
            upsert: Some(true),
            return_document: Some(ReturnDocument::After),
            ..Default::default()
        };
        let driver = find_one_and_update_options(options).unwrap();
        assert_eq!(driver.upsert, Some(true));
        assert!(matches!(driver.return_document, Some(DriverReturnDocument::After)));
    }

    #[test]
    fn test_count_options_mapping() {
        let options = CountOptions {
            skip: Some(1),
            limit: Some(3),
            ..Default::default()
        };
        let driver = count_options(options).unwrap();
        assert_eq!(driver.skip, Some(1));
        assert_eq!(driver.limit, Some(3));
    }
}
