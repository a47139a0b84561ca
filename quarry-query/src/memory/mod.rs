//! An in-process [`Store`] for tests and examples.
//!
//! `MemoryStore` keeps every collection in a `Vec<Document>` behind a
//! `parking_lot::RwLock` and evaluates filters, update operators and a
//! subset of aggregation stages itself:
//!
//! - filters: equality on dotted paths, `$eq $ne $gt $gte $lt $lte $in $nin
//!   $exists $not $size $all $elemMatch $and $or $nor`
//! - updates: `$set $setOnInsert $unset $inc $push $addToSet $pull $pullAll
//!   $pop`, with `$each` for the array pushes
//! - pipeline: `$match $sort $skip $limit $count $project $unwind $group`
//!   with `$addToSet $push $sum $first $last $min $max`
//!
//! An artificial latency can be injected to exercise deadlines, and cursor
//! open/close counters make resource release observable.
//!
//! ```rust
//! use std::sync::Arc;
//! use quarry_query::{Database, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::new("gotham"));
//! let db = Database::new(store);
//! let enemies = db.collection("enemies");
//! assert_eq!(enemies.name(), "enemies");
//! ```

mod matcher;
mod pipeline;
mod update;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use parking_lot::RwLock;
use tracing::trace;

use crate::coerce::sort_dedup;
use crate::error::{StoreError, StoreResult};
use crate::options::{
    AggregateOptions, CountOptions, DeleteOptions, DistinctOptions, FindAndModifyOptions,
    FindOptions, InsertOptions, ReplaceOptions, ReturnDocument, UpdateOptions,
};
use crate::store::{Store, StoreCursor, UpdateResult};

use matcher::{lookup, matches};
use pipeline::{compare_by, project, run_pipeline, sort_documents};
use update::{apply_update, seed_from_filter, validate_replacement, validate_update};

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicUsize,
    cursors_opened: AtomicUsize,
    cursors_closed: AtomicUsize,
}

/// An in-memory document store bound to one database name.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
    indexes: RwLock<BTreeMap<String, Vec<String>>>,
    latency: Arc<RwLock<Option<Duration>>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    /// Create an empty store for a database name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(BTreeMap::new()),
            indexes: RwLock::new(BTreeMap::new()),
            latency: Arc::new(RwLock::new(None)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Delay every call and every cursor advance by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.write() = Some(latency);
        self
    }

    /// Change the injected latency, including for cursors already open.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Number of store calls made so far.
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Number of cursors opened so far.
    pub fn cursors_opened(&self) -> usize {
        self.counters.cursors_opened.load(Ordering::SeqCst)
    }

    /// Number of cursors closed so far.
    pub fn cursors_closed(&self) -> usize {
        self.counters.cursors_closed.load(Ordering::SeqCst)
    }

    /// Snapshot of a collection's documents in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Names of the indexes on a collection, excluding `_id_`.
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.indexes
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    async fn enter(&self, operation: &'static str) {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        trace!(operation, database = %self.name, "memory store call");
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn cursor(&self, documents: Vec<Document>) -> Box<dyn StoreCursor> {
        self.counters.cursors_opened.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryCursor {
            pending: documents.into(),
            current: None,
            latency: Arc::clone(&self.latency),
            counters: Arc::clone(&self.counters),
            closed: false,
        })
    }

    fn select(&self, collection: &str, filter: &Document, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let mut selected = Vec::new();
        {
            let collections = self.collections.read();
            for doc in collections.get(collection).into_iter().flatten() {
                if matches(doc, filter)? {
                    selected.push(doc.clone());
                }
            }
        }
        if let Some(sort) = &options.sort {
            sort_documents(&mut selected, sort);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            Some(limit) if limit != 0 => limit.unsigned_abs() as usize,
            _ => usize::MAX,
        };
        let window = selected.into_iter().skip(skip).take(limit);
        match &options.projection {
            Some(spec) => window.map(|doc| project(&doc, spec)).collect(),
            None => Ok(window.collect()),
        }
    }

    fn first_match(items: &[Document], filter: &Document, sort: Option<&Document>) -> StoreResult<Option<usize>> {
        let mut positions = Vec::new();
        for (position, doc) in items.iter().enumerate() {
            if matches(doc, filter)? {
                positions.push(position);
            }
        }
        if let Some(order) = sort {
            positions.sort_by(|a, b| compare_by(order, &items[*a], &items[*b]));
        }
        Ok(positions.first().copied())
    }

    fn insert_sync(&self, collection: &str, document: Document) -> StoreResult<Bson> {
        let mut collections = self.collections.write();
        let items = collections.entry(collection.to_string()).or_default();
        let (id, stored) = with_id(document);
        if items.iter().any(|existing| existing.get("_id") == Some(&id)) {
            return Err(StoreError::backend(format!(
                "E11000 duplicate key error collection: {}.{collection} dup key: {{ _id: {id} }}",
                self.name
            )));
        }
        items.push(stored);
        Ok(id)
    }

    fn update_sync(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: &UpdateOptions,
        multi: bool,
    ) -> StoreResult<UpdateResult> {
        validate_update(update)?;
        let mut collections = self.collections.write();
        let mut result = UpdateResult::default();

        if let Some(items) = collections.get_mut(collection) {
            for doc in items.iter_mut() {
                if !matches(doc, filter)? {
                    continue;
                }
                result.matched_count += 1;
                if apply_update(doc, update, false)? {
                    result.modified_count += 1;
                }
                if !multi {
                    break;
                }
            }
        }

        if result.matched_count == 0 && options.upsert == Some(true) {
            let mut doc = seed_from_filter(filter)?;
            apply_update(&mut doc, update, true)?;
            let (id, stored) = with_id(doc);
            collections.entry(collection.to_string()).or_default().push(stored);
            result.upserted_id = Some(id);
        }
        Ok(result)
    }

    fn replace_sync(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
        options: &ReplaceOptions,
    ) -> StoreResult<UpdateResult> {
        validate_replacement(&replacement)?;
        let mut collections = self.collections.write();
        let mut result = UpdateResult::default();

        if let Some(items) = collections.get_mut(collection) {
            if let Some(position) = Self::first_match(items, filter, None)? {
                result.matched_count = 1;
                let replaced = keep_id(&items[position], replacement.clone());
                if replaced != items[position] {
                    result.modified_count = 1;
                }
                items[position] = replaced;
                return Ok(result);
            }
        }

        if options.upsert == Some(true) {
            let mut doc = replacement;
            if !doc.contains_key("_id") {
                if let Some(id) = filter.get("_id").filter(|id| !matches!(id, Bson::Document(_))) {
                    doc.insert("_id", id.clone());
                }
            }
            let (id, stored) = with_id(doc);
            collections.entry(collection.to_string()).or_default().push(stored);
            result.upserted_id = Some(id);
        }
        Ok(result)
    }

    fn delete_sync(&self, collection: &str, filter: &Document, multi: bool) -> StoreResult<u64> {
        let mut collections = self.collections.write();
        let Some(items) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut deleted = 0;
        let mut kept = Vec::with_capacity(items.len());
        for doc in items.drain(..) {
            if (multi || deleted == 0) && matches(&doc, filter)? {
                deleted += 1;
            } else {
                kept.push(doc);
            }
        }
        *items = kept;
        Ok(deleted)
    }

    fn modify_sync(
        &self,
        collection: &str,
        filter: &Document,
        change: Change,
        options: &FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        if let Change::Update(update) = &change {
            validate_update(update)?;
        }
        if let Change::Replace(replacement) = &change {
            validate_replacement(replacement)?;
        }

        let return_after = options.return_document == Some(ReturnDocument::After);
        let mut collections = self.collections.write();
        let existed = collections.contains_key(collection);
        let items = collections.entry(collection.to_string()).or_default();
        let position = Self::first_match(items, filter, options.sort.as_ref())?;

        let returned = match (position, change) {
            (Some(position), Change::Delete) => Some(items.remove(position)),
            (Some(position), Change::Update(update)) => {
                let before = items[position].clone();
                apply_update(&mut items[position], &update, false)?;
                Some(if return_after { items[position].clone() } else { before })
            }
            (Some(position), Change::Replace(replacement)) => {
                let before = items[position].clone();
                items[position] = keep_id(&before, replacement);
                Some(if return_after { items[position].clone() } else { before })
            }
            (None, Change::Update(update)) if options.upsert == Some(true) => {
                let mut doc = seed_from_filter(filter)?;
                apply_update(&mut doc, &update, true)?;
                let (_, stored) = with_id(doc);
                items.push(stored.clone());
                return_after.then_some(stored)
            }
            (None, Change::Replace(replacement)) if options.upsert == Some(true) => {
                let (_, stored) = with_id(replacement);
                items.push(stored.clone());
                return_after.then_some(stored)
            }
            (None, _) => None,
        };
        if !existed && collections.get(collection).is_some_and(Vec::is_empty) {
            collections.remove(collection);
        }

        match (returned, &options.projection) {
            (Some(doc), Some(spec)) => project(&doc, spec).map(Some),
            (returned, _) => Ok(returned),
        }
    }
}

enum Change {
    Update(Document),
    Replace(Document),
    Delete,
}

/// Ensure a document carries an `_id`, placing a fresh one first if needed.
fn with_id(document: Document) -> (Bson, Document) {
    if let Some(id) = document.get("_id") {
        return (id.clone(), document);
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut stored = doc! { "_id": id.clone() };
    stored.extend(document);
    (id, stored)
}

fn keep_id(original: &Document, replacement: Document) -> Document {
    let mut replaced = Document::new();
    if let Some(id) = original.get("_id") {
        replaced.insert("_id", id.clone());
    }
    for (key, value) in replacement {
        if key != "_id" {
            replaced.insert(key, value);
        }
    }
    replaced
}

#[async_trait]
impl Store for MemoryStore {
    fn database_name(&self) -> &str {
        &self.name
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        mut options: FindOptions,
    ) -> StoreResult<Option<Document>> {
        self.enter("find_one").await;
        options.limit = Some(1);
        Ok(self.select(collection, &filter, &options)?.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Box<dyn StoreCursor>> {
        self.enter("find").await;
        let documents = self.select(collection, &filter, &options)?;
        Ok(self.cursor(documents))
    }

    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        _options: InsertOptions,
    ) -> StoreResult<Bson> {
        self.enter("insert_one").await;
        self.insert_sync(collection, document)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        _options: InsertOptions,
    ) -> StoreResult<Vec<Bson>> {
        self.enter("insert_many").await;
        if documents.is_empty() {
            return Err(StoreError::backend("must provide at least one document to insert"));
        }
        documents
            .into_iter()
            .map(|document| self.insert_sync(collection, document))
            .collect()
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        self.enter("update_one").await;
        self.update_sync(collection, &filter, &update, &options, false)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        self.enter("update_many").await;
        self.update_sync(collection, &filter, &update, &options, true)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: ReplaceOptions,
    ) -> StoreResult<UpdateResult> {
        self.enter("replace_one").await;
        self.replace_sync(collection, &filter, replacement, &options)
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: Document,
        _options: DeleteOptions,
    ) -> StoreResult<u64> {
        self.enter("delete_one").await;
        self.delete_sync(collection, &filter, false)
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: Document,
        _options: DeleteOptions,
    ) -> StoreResult<u64> {
        self.enter("delete_many").await;
        self.delete_sync(collection, &filter, true)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.enter("find_one_and_update").await;
        self.modify_sync(collection, &filter, Change::Update(update), &options)
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.enter("find_one_and_replace").await;
        self.modify_sync(collection, &filter, Change::Replace(replacement), &options)
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.enter("find_one_and_delete").await;
        self.modify_sync(collection, &filter, Change::Delete, &options)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        _options: AggregateOptions,
    ) -> StoreResult<Box<dyn StoreCursor>> {
        self.enter("aggregate").await;
        let documents = run_pipeline(self.documents(collection), &pipeline)?;
        Ok(self.cursor(documents))
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Document,
        options: CountOptions,
    ) -> StoreResult<u64> {
        self.enter("count_documents").await;
        let find = FindOptions {
            skip: options.skip,
            limit: options.limit.map(|limit| limit as i64),
            ..Default::default()
        };
        Ok(self.select(collection, &filter, &find)?.len() as u64)
    }

    async fn estimated_document_count(&self, collection: &str) -> StoreResult<u64> {
        self.enter("estimated_document_count").await;
        Ok(self.collections.read().get(collection).map_or(0, Vec::len) as u64)
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
        _options: DistinctOptions,
    ) -> StoreResult<Vec<Bson>> {
        self.enter("distinct").await;
        let mut values = Vec::new();
        for doc in self.select(collection, &filter, &FindOptions::default())? {
            match lookup(&doc, field) {
                Some(Bson::Array(items)) => values.extend(items.iter().cloned()),
                Some(value) => values.push(value.clone()),
                None => {}
            }
        }
        sort_dedup(&mut values);
        Ok(values)
    }

    async fn create_index(&self, collection: &str, keys: Document) -> StoreResult<String> {
        self.enter("create_index").await;
        if keys.is_empty() {
            return Err(StoreError::backend("index keys must not be empty"));
        }
        let name = keys
            .iter()
            .map(|(field, direction)| format!("{field}_{direction}"))
            .collect::<Vec<_>>()
            .join("_");
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default();
        let mut indexes = self.indexes.write();
        let names = indexes.entry(collection.to_string()).or_default();
        if !names.contains(&name) {
            names.push(name.clone());
        }
        Ok(name)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()> {
        self.enter("drop_index").await;
        let mut indexes = self.indexes.write();
        let names = indexes.entry(collection.to_string()).or_default();
        match names.iter().position(|existing| existing == name) {
            Some(position) => {
                names.remove(position);
                Ok(())
            }
            None => Err(StoreError::backend(format!("index not found with name [{name}]"))),
        }
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.enter("drop_collection").await;
        self.collections.write().remove(collection);
        self.indexes.write().remove(collection);
        Ok(())
    }

    async fn list_collection_names(&self, filter: Document) -> StoreResult<Vec<String>> {
        self.enter("list_collection_names").await;
        let mut names = Vec::new();
        for name in self.collections.read().keys() {
            if matches(&doc! { "name": name.as_str(), "type": "collection" }, &filter)? {
                names.push(name.clone());
            }
        }
        Ok(names)
    }

    async fn drop_database(&self) -> StoreResult<()> {
        self.enter("drop_database").await;
        self.collections.write().clear();
        self.indexes.write().clear();
        Ok(())
    }

    async fn run_command(&self, command: Document) -> StoreResult<Document> {
        self.enter("run_command").await;
        let Some((name, argument)) = command.iter().next() else {
            return Err(StoreError::backend("empty command"));
        };
        match (name.as_str(), argument) {
            ("ping", _) => Ok(doc! { "ok": 1.0 }),
            ("count", Bson::String(collection)) => {
                let n = self.collections.read().get(collection).map_or(0, Vec::len) as i64;
                Ok(doc! { "n": n, "ok": 1.0 })
            }
            ("dbStats", _) => {
                let collections = self.collections.read();
                let objects: usize = collections.values().map(Vec::len).sum();
                Ok(doc! {
                    "db": self.name.as_str(),
                    "collections": collections.len() as i64,
                    "objects": objects as i64,
                    "ok": 1.0,
                })
            }
            (other, _) => Err(StoreError::backend(format!("no such command: '{other}'"))),
        }
    }
}

struct MemoryCursor {
    pending: VecDeque<Document>,
    current: Option<Document>,
    latency: Arc<RwLock<Option<Duration>>>,
    counters: Arc<Counters>,
    closed: bool,
}

#[async_trait]
impl StoreCursor for MemoryCursor {
    async fn advance(&mut self) -> StoreResult<bool> {
        if self.closed {
            return Err(StoreError::backend("cursor is closed"));
        }
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn current(&self) -> StoreResult<Document> {
        self.current
            .clone()
            .ok_or_else(|| StoreError::backend("cursor is not positioned on a document"))
    }

    async fn close(&mut self) -> StoreResult<()> {
        if !self.closed {
            self.closed = true;
            self.pending.clear();
            self.current = None;
            self.counters.cursors_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
