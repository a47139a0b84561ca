//! # quarry-query
//!
//! Fluent query builders over a document store.
//!
//! This crate provides:
//! - One chainable builder per verb (`find`, `insert`, `update`, `delete`,
//!   `replace`, `aggregate`, find-and-modify)
//! - Deadlines resolved at the terminal call from a per-query timeout or a
//!   connection default
//! - A pull-based [`Iter`] whose state can be read from other tasks
//! - Distinct values with sort, skip and limit, and typed variants
//! - A closed error taxonomy ([`QueryError`])
//! - The [`Store`] capability the builders run against, and an in-memory
//!   implementation ([`MemoryStore`])
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use quarry_query::{Database, MemoryStore, Timeouts};
//! use bson::{Document, doc};
//!
//! # tokio_test::block_on(async {
//! let db = Database::new(Arc::new(MemoryStore::new("batman_archive")))
//!     .with_timeouts(Timeouts::none().with_query(Duration::from_secs(5)));
//! let enemies = db.collection("enemies");
//!
//! enemies.insert().one(&doc! { "name": "Joker", "year": 1940 }).await?;
//! let joker: Document = enemies
//!     .find(doc! { "name": "Joker" })
//!     .timeout(Duration::from_secs(1))
//!     .one()
//!     .await?;
//! assert_eq!(joker.get_i32("year")?, 1940);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! ## Errors
//!
//! Store failures are normalized once, inside the terminal call: an elapsed
//! deadline becomes [`QueryError::TimeoutOccurred`], an empty single-document
//! read becomes [`QueryError::NoDocuments`], and anything else is wrapped in
//! [`QueryError::Store`] with its cause intact. Caller mistakes are rejected
//! before the store is called.

#[macro_use]
mod query;

pub mod coerce;
pub mod collection;
pub mod database;
mod distinct;
pub mod error;
pub mod filter;
pub mod index;
pub mod iter;
pub mod logging;
pub mod memory;
pub mod modifiers;
pub mod operations;
pub mod options;
pub mod store;
pub mod timeout;

pub use collection::Collection;
pub use database::Database;
pub use error::{QueryError, QueryResult, StoreError, StoreResult, normalize};
pub use filter::FilterBuilder;
pub use index::Index;
pub use iter::Iter;
pub use memory::MemoryStore;
pub use modifiers::UpdateDocument;
pub use operations::{
    AggregateOperation, DeleteOperation, FindAndModifyOperation, FindOperation, InsertOperation,
    ReplaceOperation, UpdateCounts, UpdateOperation,
};
pub use options::{Collation, ReturnDocument};
pub use query::Query;
pub use store::{Store, StoreCursor, UpdateResult};
pub use timeout::{Deadline, Timeouts};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::collection::Collection;
    pub use crate::database::Database;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::filter::FilterBuilder;
    pub use crate::iter::Iter;
    pub use crate::memory::MemoryStore;
    pub use crate::modifiers::UpdateDocument;
    pub use crate::operations::UpdateCounts;
    pub use crate::options::{Collation, ReturnDocument};
    pub use crate::store::{Store, StoreCursor};
    pub use crate::timeout::Timeouts;
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
