//! # Quarry
//!
//! A fluent, timeout-aware query layer for MongoDB.
//!
//! Quarry provides:
//! - One chainable builder per verb, finished by an async terminal call
//! - Deadlines resolved at the terminal call from a per-query timeout or a
//!   connection default
//! - A pull-based iterator with observable state
//! - Distinct values honoring sort, skip and limit
//! - A small, closed error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use quarry::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Enemy {
//!     name: String,
//!     year: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::builder("mongodb://localhost:27017")
//!         .query_timeout(Duration::from_secs(5))
//!         .connect()
//!         .await?;
//!     let enemies = conn.database("batman_archive").collection("enemies");
//!
//!     let golden_age: Vec<Enemy> = enemies
//!         .find(doc! { "year": { "$lt": 1950 } })
//!         .sort(["-year"])
//!         .limit(10)
//!         .all()
//!         .await?;
//!     println!("{golden_age:?}");
//!     Ok(())
//! }
//! ```
//!
//! Without the default `mongodb` feature only the store-agnostic core is
//! built; [`MemoryStore`] runs the same builders in-process.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Query builders, execution, errors and the store capability.
pub mod query {
    pub use quarry_query::*;
}

/// The MongoDB backend.
#[cfg(feature = "mongodb")]
#[cfg_attr(docsrs, doc(cfg(feature = "mongodb")))]
pub mod mongodb {
    pub use quarry_mongodb::*;
}

pub use quarry_query::logging;
pub use quarry_query::{
    Collation, Collection, Database, FilterBuilder, Iter, MemoryStore, QueryError, QueryResult,
    ReturnDocument, Store, StoreCursor, StoreError, Timeouts, UpdateCounts, UpdateDocument,
};

#[cfg(feature = "mongodb")]
pub use quarry_mongodb::{
    ConsistencyProfile, Connection, ConnectionBuilder, Credentials, MongoConfig, MongoError,
    global,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use quarry_query::prelude::*;

    #[cfg(feature = "mongodb")]
    pub use quarry_mongodb::{ConsistencyProfile, Connection, ConnectionBuilder, global};
}
