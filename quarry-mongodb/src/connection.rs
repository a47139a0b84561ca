//! Connections to a MongoDB deployment.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bson::doc;
use mongodb::Client;
use mongodb::options::{DatabaseOptions, ReadPreference as DriverReadPreference, SelectionCriteria};
use quarry_query::{Database, Timeouts};
use tracing::{debug, info, warn};

use crate::config::{ConsistencyProfile, Credentials, MongoConfig, WriteConcern};
use crate::error::{MongoError, MongoResult};
use crate::global;
use crate::monitor::CommandLogger;
use crate::store::MongoStore;

/// A connection to a MongoDB cluster or instance.
///
/// The driver pools connections internally, so cloning is cheap and every
/// clone shares the pool.
#[derive(Debug, Clone)]
pub struct Connection {
    client: Client,
    config: MongoConfig,
}

impl Connection {
    /// Connect with nothing but a URI.
    ///
    /// Like [`ConnectionBuilder::connect`], this registers the connection as
    /// the process-wide default.
    pub async fn connect(uri: impl Into<String>) -> MongoResult<Self> {
        Self::builder(uri).connect().await
    }

    /// Start configuring a connection.
    pub fn builder(uri: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(uri)
    }

    /// Connect from a full configuration without registering it globally.
    pub async fn with_config(config: MongoConfig) -> MongoResult<Self> {
        let client = build_client(&config).await?;
        info!(uri = %config.uri, debug = config.debug, "mongodb client created");
        Ok(Self { client, config })
    }

    /// The URI this connection was created from.
    pub fn uri(&self) -> &str {
        &self.config.uri
    }

    /// The configuration of this connection.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// Timeout defaults handed to every database handle.
    pub fn timeouts(&self) -> Timeouts {
        self.config.timeouts()
    }

    /// The underlying driver client, for anything this crate does not cover.
    pub fn driver_client(&self) -> &Client {
        &self.client
    }

    /// A database handle using the connection's read and write settings.
    pub fn database(&self, name: &str) -> Database {
        self.wrap(self.client.database(name))
    }

    /// The database named in the configuration.
    pub fn default_database(&self) -> MongoResult<Database> {
        let name = self
            .config
            .database
            .as_deref()
            .ok_or_else(|| MongoError::config("no default database configured"))?;
        Ok(self.database(name))
    }

    /// A database handle with the read and write settings of `profile`.
    pub fn database_with_profile(&self, name: &str, profile: ConsistencyProfile) -> Database {
        let mut options = DatabaseOptions::default();
        options.selection_criteria = Some(profile.read_preference().to_selection_criteria());
        options.read_concern = Some(profile.read_concern().to_driver());
        options.write_concern = Some(profile.write_concern().to_driver());
        self.wrap(self.client.database_with_options(name, options))
    }

    fn wrap(&self, database: mongodb::Database) -> Database {
        Database::new(Arc::new(MongoStore::new(database))).with_timeouts(self.timeouts())
    }

    /// Ping the deployment, preferring the primary.
    pub async fn ping(&self) -> MongoResult<()> {
        let criteria = SelectionCriteria::ReadPreference(DriverReadPreference::PrimaryPreferred {
            options: Default::default(),
        });
        let admin = self.client.database("admin");
        self.bounded("ping", admin.run_command(doc! { "ping": 1 }, criteria))
            .await
            .map(|_| ())
    }

    /// Names of the databases in the deployment.
    pub async fn database_names(&self) -> MongoResult<Vec<String>> {
        self.bounded("list_databases", self.client.list_database_names(None, None))
            .await
    }

    /// Handles for every database in the deployment.
    pub async fn list_databases(&self) -> MongoResult<Vec<Database>> {
        let names = self.database_names().await?;
        Ok(names.iter().map(|name| self.database(name)).collect())
    }

    /// Rebuild the client with command logging turned on.
    ///
    /// Handles obtained before this call keep using the old client. The
    /// rebuilt connection becomes the process-wide default.
    pub async fn enable_debug(&mut self) -> MongoResult<()> {
        self.config.debug = true;
        self.client = build_client(&self.config).await?;
        debug!(uri = %self.config.uri, "command logging enabled");
        global::set_default(self.clone());
        Ok(())
    }

    async fn bounded<T, F>(&self, op: &'static str, call: F) -> MongoResult<T>
    where
        F: Future<Output = mongodb::error::Result<T>>,
    {
        let Some(limit) = self.config.operation_timeout else {
            return call.await.map_err(MongoError::from);
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(MongoError::from),
            Err(_) => {
                warn!(op, timeout_ms = limit.as_millis() as u64, "connection call timed out");
                Err(MongoError::Timeout(limit.as_millis() as u64))
            }
        }
    }
}

async fn build_client(config: &MongoConfig) -> MongoResult<Client> {
    let mut options = config.to_client_options().await?;
    if config.debug {
        options.command_event_handler = Some(Arc::new(CommandLogger::new()));
    }
    Client::with_options(options)
        .map_err(|e| MongoError::connection(format!("failed to create client: {}", e)))
}

/// Builder for [`Connection`].
#[derive(Debug)]
pub struct ConnectionBuilder {
    config: MongoConfig,
    health_check: bool,
}

impl ConnectionBuilder {
    /// Create a builder for a URI with default settings.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            config: MongoConfig::from_uri(uri),
            health_check: false,
        }
    }

    /// Replace every setting with `config`, keeping its URI.
    pub fn config(mut self, config: MongoConfig) -> Self {
        self.config = config;
        self
    }

    /// Use the read and write settings of a consistency profile.
    pub fn profile(mut self, profile: ConsistencyProfile) -> Self {
        self.config.apply_profile(profile);
        self
    }

    /// Set the database returned by [`Connection::default_database`].
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.config.database = Some(name.into());
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = Some(name.into());
        self
    }

    /// Default deadline for query builders.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = Some(timeout);
        self
    }

    /// Default deadline for administrative calls, including `ping`.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = Some(timeout);
        self
    }

    /// Bound both server selection and connection establishment.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self.config.server_selection_timeout = Some(timeout);
        self
    }

    /// Authenticate with the given credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    /// Number of nodes that must acknowledge a write.
    pub fn write_nodes(mut self, nodes: u32) -> Self {
        self.config.write_concern = Some(WriteConcern::W(nodes));
        self
    }

    /// Log every command sent to the server.
    pub fn debug(mut self) -> Self {
        self.config.debug = true;
        self
    }

    /// Ping the deployment before returning from [`connect`](Self::connect).
    pub fn health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    /// Create the connection and register it as the process-wide default.
    pub async fn connect(self) -> MongoResult<Connection> {
        let connection = Connection::with_config(self.config).await?;
        if self.health_check {
            connection.ping().await?;
        }
        global::set_default(connection.clone());
        Ok(connection)
    }

    /// Adopt an already configured driver client.
    ///
    /// Only the timeouts and the default database of the builder apply; the
    /// client keeps its own driver settings. The connection becomes the
    /// process-wide default.
    pub fn from_driver_client(self, client: Client) -> Connection {
        let connection = Connection {
            client,
            config: self.config,
        };
        global::set_default(connection.clone());
        connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::tests::GLOBAL_LOCK;
    use pretty_assertions::assert_eq;

    // Port 1 has nothing listening, so server selection never completes.
    const UNREACHABLE: &str = "mongodb://127.0.0.1:1";

    #[tokio::test]
    async fn test_builder_settings() {
        let _guard = GLOBAL_LOCK.lock();
        let connection = Connection::builder(UNREACHABLE)
            .database("batman_archive")
            .query_timeout(Duration::from_secs(2))
            .operation_timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(1))
            .write_nodes(2)
            .connect()
            .await
            .unwrap();

        assert_eq!(connection.uri(), UNREACHABLE);
        assert_eq!(connection.config().server_selection_timeout, Some(Duration::from_secs(1)));
        assert_eq!(connection.config().write_concern, Some(WriteConcern::W(2)));
        assert_eq!(
            connection.timeouts(),
            Timeouts::none()
                .with_query(Duration::from_secs(2))
                .with_operation(Duration::from_secs(5))
        );

        let db = connection.default_database().unwrap();
        assert_eq!(db.name(), "batman_archive");
        assert_eq!(db.timeouts(), connection.timeouts());
        assert_eq!(global::default_connection().unwrap().uri(), UNREACHABLE);
    }

    #[tokio::test]
    async fn test_database_handles() {
        let connection = Connection::with_config(MongoConfig::from_uri(UNREACHABLE))
            .await
            .unwrap();
        assert_eq!(connection.database("gotham").name(), "gotham");
        assert_eq!(
            connection
                .database_with_profile("gotham", ConsistencyProfile::Secondary)
                .name(),
            "gotham"
        );
        assert!(connection.default_database().unwrap_err().is_config_error());
    }

    #[tokio::test]
    async fn test_ping_honors_operation_timeout() {
        let mut config = MongoConfig::from_uri(UNREACHABLE);
        config.operation_timeout = Some(Duration::from_millis(100));
        let connection = Connection::with_config(config).await.unwrap();

        let err = connection.ping().await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_bad_uri_is_config_error() {
        let err = Connection::with_config(MongoConfig::from_uri("not a uri"))
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
