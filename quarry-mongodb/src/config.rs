//! MongoDB connection configuration.

use std::time::Duration;

use mongodb::options::{
    Acknowledgment, ClientOptions, Credential, ReadConcern as DriverReadConcern,
    ReadPreference as DriverReadPreference, SelectionCriteria, WriteConcern as DriverWriteConcern,
};

use crate::error::{MongoError, MongoResult};

const DEFAULT_URI: &str = "mongodb://localhost:27017";

const URI_VAR: &str = "QUARRY_MONGODB_URI";
const DATABASE_VAR: &str = "QUARRY_MONGODB_DATABASE";
const QUERY_TIMEOUT_VAR: &str = "QUARRY_QUERY_TIMEOUT_MS";
const OPERATION_TIMEOUT_VAR: &str = "QUARRY_OPERATION_TIMEOUT_MS";

/// MongoDB connection configuration.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database used by [`Connection::default_database`](crate::Connection::default_database).
    pub database: Option<String>,
    /// Application name (shown in server logs).
    pub app_name: Option<String>,
    /// Minimum connection pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum connection pool size.
    pub max_pool_size: Option<u32>,
    /// Maximum idle time for pooled connections.
    pub max_idle_time: Option<Duration>,
    /// Time allowed to establish a connection.
    pub connect_timeout: Option<Duration>,
    /// Time allowed to find a suitable server.
    pub server_selection_timeout: Option<Duration>,
    /// Default deadline for query builders.
    pub query_timeout: Option<Duration>,
    /// Default deadline for administrative calls.
    pub operation_timeout: Option<Duration>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Read concern.
    pub read_concern: Option<ReadConcern>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Retry writes.
    pub retry_writes: Option<bool>,
    /// Retry reads.
    pub retry_reads: Option<bool>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
    /// Authentication credentials.
    pub credentials: Option<Credentials>,
    /// Log every command sent to the server.
    pub debug: bool,
}

/// MongoDB read preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPreference {
    /// Read from primary only.
    #[default]
    Primary,
    /// Read from primary preferred, fallback to secondary.
    PrimaryPreferred,
    /// Read from secondary only.
    Secondary,
    /// Read from secondary preferred, fallback to primary.
    SecondaryPreferred,
    /// Read from nearest member.
    Nearest,
}

/// MongoDB read concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConcern {
    /// Most recent data on the queried node, may be rolled back.
    Local,
    /// Like `Local`, without waiting on sharded cluster metadata.
    Available,
    /// Data acknowledged by a majority of the replica set.
    Majority,
    /// Majority data reflecting every prior acknowledged write.
    Linearizable,
    /// Majority data from one point in time.
    Snapshot,
}

/// MongoDB write concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteConcern {
    /// Acknowledge writes from the specified number of nodes.
    W(u32),
    /// Acknowledge writes from majority of nodes.
    Majority,
    /// Custom tag set.
    Custom(String),
}

/// Bundled read and write settings for common deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyProfile {
    /// Local reads from the primary when it is up; one node acknowledges writes.
    Primary,
    /// Majority reads from a secondary when one is up; one node acknowledges writes.
    Secondary,
    /// Majority reads from the nearest node; a majority acknowledges writes.
    #[default]
    Anywhere,
}

impl ConsistencyProfile {
    /// The read concern of this profile.
    pub fn read_concern(self) -> ReadConcern {
        match self {
            Self::Primary => ReadConcern::Local,
            Self::Secondary | Self::Anywhere => ReadConcern::Majority,
        }
    }

    /// The read preference of this profile.
    pub fn read_preference(self) -> ReadPreference {
        match self {
            Self::Primary => ReadPreference::PrimaryPreferred,
            Self::Secondary => ReadPreference::SecondaryPreferred,
            Self::Anywhere => ReadPreference::Nearest,
        }
    }

    /// The write concern of this profile.
    pub fn write_concern(self) -> WriteConcern {
        match self {
            Self::Primary | Self::Secondary => WriteConcern::W(1),
            Self::Anywhere => WriteConcern::Majority,
        }
    }
}

/// Username/password authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Authentication database, `admin` when unset.
    pub source: Option<String>,
}

impl Credentials {
    /// Create credentials for a user.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            source: None,
        }
    }

    /// Authenticate against a specific database.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub(crate) fn to_driver(&self) -> Credential {
        let mut credential = Credential::default();
        credential.username = Some(self.username.clone());
        credential.password = Some(self.password.clone());
        credential.source = self.source.clone();
        credential
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("source", &self.source)
            .finish()
    }
}

impl ReadPreference {
    pub(crate) fn to_selection_criteria(self) -> SelectionCriteria {
        SelectionCriteria::ReadPreference(match self {
            Self::Primary => DriverReadPreference::Primary,
            Self::PrimaryPreferred => DriverReadPreference::PrimaryPreferred {
                options: Default::default(),
            },
            Self::Secondary => DriverReadPreference::Secondary {
                options: Default::default(),
            },
            Self::SecondaryPreferred => DriverReadPreference::SecondaryPreferred {
                options: Default::default(),
            },
            Self::Nearest => DriverReadPreference::Nearest {
                options: Default::default(),
            },
        })
    }
}

impl ReadConcern {
    pub(crate) fn to_driver(self) -> DriverReadConcern {
        match self {
            Self::Local => DriverReadConcern::local(),
            Self::Available => DriverReadConcern::available(),
            Self::Majority => DriverReadConcern::majority(),
            Self::Linearizable => DriverReadConcern::linearizable(),
            Self::Snapshot => DriverReadConcern::snapshot(),
        }
    }
}

impl WriteConcern {
    pub(crate) fn to_driver(&self) -> DriverWriteConcern {
        let acknowledgment = match self {
            Self::W(n) => Acknowledgment::Nodes(*n),
            Self::Majority => Acknowledgment::Majority,
            Self::Custom(tag) => Acknowledgment::Custom(tag.clone()),
        };
        DriverWriteConcern::builder().w(acknowledgment).build()
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        let profile = ConsistencyProfile::default();
        Self {
            uri: DEFAULT_URI.to_string(),
            database: None,
            app_name: Some("quarry".to_string()),
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: Some(Duration::from_secs(300)),
            connect_timeout: None,
            server_selection_timeout: None,
            query_timeout: None,
            operation_timeout: None,
            read_preference: Some(profile.read_preference()),
            read_concern: Some(profile.read_concern()),
            write_concern: Some(profile.write_concern()),
            retry_writes: Some(true),
            retry_reads: Some(true),
            direct_connection: None,
            credentials: None,
            debug: false,
        }
    }
}

impl MongoConfig {
    /// Create a new configuration from a MongoDB URI.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> MongoConfigBuilder {
        MongoConfigBuilder::new()
    }

    /// Read the configuration from `QUARRY_*` environment variables.
    ///
    /// - `QUARRY_MONGODB_URI` (default `mongodb://localhost:27017`)
    /// - `QUARRY_MONGODB_DATABASE`
    /// - `QUARRY_QUERY_TIMEOUT_MS`
    /// - `QUARRY_OPERATION_TIMEOUT_MS`
    /// - `QUARRY_DEBUG`
    pub fn from_env() -> MongoResult<Self> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.debug = quarry_query::logging::is_debug_enabled();
        Ok(config)
    }

    /// Build a configuration from a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> MongoResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = MongoConfigBuilder::new();
        if let Some(uri) = lookup(URI_VAR) {
            builder = builder.uri(uri);
        }
        if let Some(database) = lookup(DATABASE_VAR) {
            builder = builder.database(database);
        }
        if let Some(timeout) = parse_millis(QUERY_TIMEOUT_VAR, lookup(QUERY_TIMEOUT_VAR))? {
            builder = builder.query_timeout(timeout);
        }
        if let Some(timeout) = parse_millis(OPERATION_TIMEOUT_VAR, lookup(OPERATION_TIMEOUT_VAR))? {
            builder = builder.operation_timeout(timeout);
        }
        builder.build()
    }

    /// Apply a consistency profile, replacing the read and write settings.
    pub fn apply_profile(&mut self, profile: ConsistencyProfile) {
        self.read_preference = Some(profile.read_preference());
        self.read_concern = Some(profile.read_concern());
        self.write_concern = Some(profile.write_concern());
    }

    /// The timeout defaults handed to every database of the connection.
    pub fn timeouts(&self) -> quarry_query::Timeouts {
        quarry_query::Timeouts {
            query: self.query_timeout,
            operation: self.operation_timeout,
        }
    }

    /// Convert to MongoDB ClientOptions.
    ///
    /// The command monitor for debug mode is attached by the connection, not
    /// here.
    pub async fn to_client_options(&self) -> MongoResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| MongoError::config(format!("failed to parse URI: {}", e)))?;
        self.apply_to(&mut options);
        Ok(options)
    }

    pub(crate) fn apply_to(&self, options: &mut ClientOptions) {
        if let Some(ref app_name) = self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(min_pool) = self.min_pool_size {
            options.min_pool_size = Some(min_pool);
        }
        if let Some(max_pool) = self.max_pool_size {
            options.max_pool_size = Some(max_pool);
        }
        if let Some(max_idle) = self.max_idle_time {
            options.max_idle_time = Some(max_idle);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            options.connect_timeout = Some(connect_timeout);
        }
        if let Some(selection_timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(selection_timeout);
        }
        if let Some(read_pref) = self.read_preference {
            options.selection_criteria = Some(read_pref.to_selection_criteria());
        }
        if let Some(read_concern) = self.read_concern {
            options.read_concern = Some(read_concern.to_driver());
        }
        if let Some(ref wc) = self.write_concern {
            options.write_concern = Some(wc.to_driver());
        }
        if let Some(retry_writes) = self.retry_writes {
            options.retry_writes = Some(retry_writes);
        }
        if let Some(retry_reads) = self.retry_reads {
            options.retry_reads = Some(retry_reads);
        }
        if let Some(direct) = self.direct_connection {
            options.direct_connection = Some(direct);
        }
        if let Some(ref credentials) = self.credentials {
            options.credential = Some(credentials.to_driver());
        }
    }
}

fn parse_millis(name: &str, value: Option<String>) -> MongoResult<Option<Duration>> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| MongoError::config(format!("{name} must be milliseconds, got {value:?}")))
}

/// Builder for MongoDB configuration.
#[derive(Debug, Default)]
pub struct MongoConfigBuilder {
    uri: Option<String>,
    database: Option<String>,
    app_name: Option<String>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    max_idle_time: Option<Duration>,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
    query_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    profile: Option<ConsistencyProfile>,
    read_preference: Option<ReadPreference>,
    read_concern: Option<ReadConcern>,
    write_concern: Option<WriteConcern>,
    retry_writes: Option<bool>,
    retry_reads: Option<bool>,
    direct_connection: Option<bool>,
    credentials: Option<Credentials>,
    debug: bool,
}

impl MongoConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MongoDB URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the default database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the maximum idle time for connections.
    pub fn max_idle_time(mut self, duration: Duration) -> Self {
        self.max_idle_time = Some(duration);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the server selection timeout.
    pub fn server_selection_timeout(mut self, duration: Duration) -> Self {
        self.server_selection_timeout = Some(duration);
        self
    }

    /// Set the default query timeout.
    pub fn query_timeout(mut self, duration: Duration) -> Self {
        self.query_timeout = Some(duration);
        self
    }

    /// Set the default timeout for administrative calls.
    pub fn operation_timeout(mut self, duration: Duration) -> Self {
        self.operation_timeout = Some(duration);
        self
    }

    /// Use a consistency profile. Explicit read/write settings still win.
    pub fn profile(mut self, profile: ConsistencyProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the read preference.
    pub fn read_preference(mut self, pref: ReadPreference) -> Self {
        self.read_preference = Some(pref);
        self
    }

    /// Set the read concern.
    pub fn read_concern(mut self, concern: ReadConcern) -> Self {
        self.read_concern = Some(concern);
        self
    }

    /// Set the write concern.
    pub fn write_concern(mut self, wc: WriteConcern) -> Self {
        self.write_concern = Some(wc);
        self
    }

    /// Enable or disable retry writes.
    pub fn retry_writes(mut self, enabled: bool) -> Self {
        self.retry_writes = Some(enabled);
        self
    }

    /// Enable or disable retry reads.
    pub fn retry_reads(mut self, enabled: bool) -> Self {
        self.retry_reads = Some(enabled);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Authenticate with the given credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Log every command sent to the server.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> MongoResult<MongoConfig> {
        let uri = self.uri.unwrap_or_else(|| DEFAULT_URI.to_string());
        if !(uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://")) {
            return Err(MongoError::config(format!(
                "URI must start with mongodb:// or mongodb+srv://, got {uri:?}"
            )));
        }
        if self.database.as_deref() == Some("") {
            return Err(MongoError::config("database name must not be empty"));
        }

        let profile = self.profile.unwrap_or_default();
        Ok(MongoConfig {
            uri,
            database: self.database,
            app_name: self.app_name.or(Some("quarry".to_string())),
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size.or(Some(10)),
            max_idle_time: self.max_idle_time.or(Some(Duration::from_secs(300))),
            connect_timeout: self.connect_timeout,
            server_selection_timeout: self.server_selection_timeout,
            query_timeout: self.query_timeout,
            operation_timeout: self.operation_timeout,
            read_preference: self.read_preference.or(Some(profile.read_preference())),
            read_concern: self.read_concern.or(Some(profile.read_concern())),
            write_concern: self.write_concern.or(Some(profile.write_concern())),
            retry_writes: self.retry_writes.or(Some(true)),
            retry_reads: self.retry_reads.or(Some(true)),
            direct_connection: self.direct_connection,
            credentials: self.credentials,
            debug: self.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_config_from_uri() {
        let config = MongoConfig::from_uri("mongodb://gotham:27017");
        assert_eq!(config.uri, "mongodb://gotham:27017");
        assert_eq!(config.database, None);
        assert_eq!(config.write_concern, Some(WriteConcern::Majority));
    }

    #[test]
    fn test_config_builder() {
        let config = MongoConfig::builder()
            .uri("mongodb://localhost:27017")
            .database("batman_archive")
            .app_name("batcomputer")
            .max_pool_size(20)
            .query_timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert_eq!(config.database.as_deref(), Some("batman_archive"));
        assert_eq!(config.app_name, Some("batcomputer".to_string()));
        assert_eq!(config.max_pool_size, Some(20));
        assert_eq!(
            config.timeouts(),
            quarry_query::Timeouts::none().with_query(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_config_builder_rejects_bad_uri() {
        let err = MongoConfig::builder().uri("postgres://localhost").build().unwrap_err();
        assert!(err.is_config_error());

        let err = MongoConfig::builder().database("").build().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_profile_with_override() {
        let config = MongoConfig::builder()
            .profile(ConsistencyProfile::Secondary)
            .write_concern(WriteConcern::W(3))
            .build()
            .unwrap();
        assert_eq!(config.read_preference, Some(ReadPreference::SecondaryPreferred));
        assert_eq!(config.read_concern, Some(ReadConcern::Majority));
        assert_eq!(config.write_concern, Some(WriteConcern::W(3)));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = MongoConfig::default();
        config.apply_profile(ConsistencyProfile::Primary);
        assert_eq!(config.read_preference, Some(ReadPreference::PrimaryPreferred));
        assert_eq!(config.read_concern, Some(ReadConcern::Local));
        assert_eq!(config.write_concern, Some(WriteConcern::W(1)));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("QUARRY_MONGODB_URI", "mongodb://cave:27017"),
            ("QUARRY_MONGODB_DATABASE", "batman_archive"),
            ("QUARRY_QUERY_TIMEOUT_MS", "1500"),
        ]);
        let config = MongoConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.uri, "mongodb://cave:27017");
        assert_eq!(config.database.as_deref(), Some("batman_archive"));
        assert_eq!(config.query_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.operation_timeout, None);
    }

    #[test]
    fn test_from_lookup_rejects_bad_timeout() {
        let err = MongoConfig::from_lookup(|name| {
            (name == "QUARRY_OPERATION_TIMEOUT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("alfred", "tea").source("admin");
        let printed = format!("{credentials:?}");
        assert!(printed.contains("alfred"));
        assert!(!printed.contains("tea"));

        let driver = credentials.to_driver();
        assert_eq!(driver.username.as_deref(), Some("alfred"));
        assert_eq!(driver.source.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_to_client_options() {
        let config = MongoConfig::builder()
            .uri("mongodb://localhost:27017")
            .connect_timeout(Duration::from_secs(3))
            .retry_writes(false)
            .build()
            .unwrap();
        let options = config.to_client_options().await.unwrap();
        assert_eq!(options.app_name.as_deref(), Some("quarry"));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.retry_writes, Some(false));
        assert!(options.read_concern.is_some());
        assert!(options.selection_criteria.is_some());
    }
}
