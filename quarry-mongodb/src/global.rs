//! The process-wide default connection.
//!
//! Every successful [`ConnectionBuilder::connect`](crate::ConnectionBuilder::connect)
//! registers its connection here, so the last one to connect wins. Reads and
//! writes go through a single lock.

use parking_lot::RwLock;
use quarry_query::{Collection, Database};

use crate::connection::Connection;
use crate::error::{MongoError, MongoResult};

static DEFAULT: RwLock<Option<Connection>> = parking_lot::const_rwlock(None);

/// Register `connection` as the default, replacing any previous one.
pub fn set_default(connection: Connection) {
    *DEFAULT.write() = Some(connection);
}

/// Remove the default connection, returning it.
pub fn clear() -> Option<Connection> {
    DEFAULT.write().take()
}

/// The current default connection.
pub fn default_connection() -> MongoResult<Connection> {
    DEFAULT
        .read()
        .clone()
        .ok_or(MongoError::NoDefaultConnection)
}

/// A database handle on the default connection.
pub fn database(name: &str) -> MongoResult<Database> {
    default_connection().map(|connection| connection.database(name))
}

/// A collection handle on the default connection.
pub fn collection(database_name: &str, collection_name: &str) -> MongoResult<Collection> {
    database(database_name).map(|db| db.collection(collection_name))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::MongoConfig;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Serializes tests that touch the default connection.
    pub(crate) static GLOBAL_LOCK: Mutex<()> = parking_lot::const_mutex(());

    async fn connection(uri: &str) -> Connection {
        Connection::with_config(MongoConfig::from_uri(uri)).await.unwrap()
    }

    #[tokio::test]
    async fn test_unset_default_is_an_error() {
        let _guard = GLOBAL_LOCK.lock();
        clear();
        assert!(matches!(
            default_connection(),
            Err(MongoError::NoDefaultConnection)
        ));
        assert!(database("gotham").is_err());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let _guard = GLOBAL_LOCK.lock();
        set_default(connection("mongodb://127.0.0.1:1").await);
        set_default(connection("mongodb://127.0.0.1:2").await);
        assert_eq!(default_connection().unwrap().uri(), "mongodb://127.0.0.1:2");

        let enemies = collection("batman_archive", "enemies").unwrap();
        assert_eq!(enemies.name(), "enemies");
        assert_eq!(enemies.database_name(), "batman_archive");

        assert!(clear().is_some());
        assert!(clear().is_none());
    }
}
