//! # quarry-mongodb
//!
//! MongoDB backend for quarry, built on the official driver.
//!
//! This crate provides:
//! - [`MongoStore`], the [`Store`](quarry_query::Store) implementation the
//!   query builders run against
//! - Connection configuration with timeout defaults and consistency profiles
//! - [`Connection`] and [`ConnectionBuilder`]
//! - Command logging for debug mode
//! - A process-wide default connection ([`global`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use quarry_mongodb::{Connection, ConsistencyProfile};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::builder("mongodb://localhost:27017")
//!         .profile(ConsistencyProfile::Primary)
//!         .query_timeout(Duration::from_secs(5))
//!         .connect()
//!         .await?;
//!
//!     let enemies = conn.database("batman_archive").collection("enemies");
//!     let count = enemies.find(doc! { "captured": false }).count().await?;
//!     println!("{count} still at large");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod global;
pub mod monitor;
pub mod store;

pub use config::{
    ConsistencyProfile, Credentials, MongoConfig, MongoConfigBuilder, ReadConcern, ReadPreference,
    WriteConcern,
};
pub use connection::{Connection, ConnectionBuilder};
pub use error::{MongoError, MongoResult};
pub use monitor::CommandLogger;
pub use store::{MongoCursor, MongoStore};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{ConsistencyProfile, Credentials, MongoConfig};
    pub use crate::connection::{Connection, ConnectionBuilder};
    pub use crate::error::{MongoError, MongoResult};
    pub use crate::global;
    pub use quarry_query::prelude::*;
}
