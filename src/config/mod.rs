//! Connection configuration
//!
//! This module handles:
//! * The immutable [`ConnectionConfig`] every pooled connection is built from
//! * Connection string parsing
//! * The fixed session overrides applied on top of whatever the caller supplied

mod connection_string;
mod session;

pub use connection_string::parse_connection_string;
pub use session::{configure_session, APPLICATION_NAME, SESSION_OVERRIDES};

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Default Postgres port
pub const DEFAULT_PORT: u16 = 5432;

/// Where the server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// TCP host and port
    Tcp {
        /// Host name or IP literal
        host: String,
        /// Port
        port: u16,
    },
    /// Full path of a Unix domain socket (`<dir>/.s.PGSQL.<port>`)
    Unix(PathBuf),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Connection configuration
///
/// Built once (usually by [`configure_session`]) and shared read-only by the pool.
/// `runtime_params` are sent in the startup packet of every connection; the map is
/// ordered so the packet is deterministic.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Server address
    pub address: Address,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password (optional)
    pub password: Option<String>,
    /// Session runtime parameters
    pub runtime_params: BTreeMap<String, String>,
    /// Defer connecting and validation until first use
    pub lazy: bool,
    /// Upper bound on live connections
    pub max_connections: usize,
}

impl ConnectionConfig {
    /// Create a builder
    ///
    /// # Examples
    ///
    /// ```
    /// use pgready::config::{Address, ConnectionConfig};
    ///
    /// let config = ConnectionConfig::builder(
    ///     Address::Tcp { host: "localhost".into(), port: 5432 },
    ///     "mydb",
    ///     "user",
    /// )
    /// .password("secret")
    /// .param("statement_timeout", "5000")
    /// .max_connections(8)
    /// .build();
    ///
    /// assert_eq!(config.runtime_param("statement_timeout"), Some("5000"));
    /// ```
    pub fn builder(
        address: Address,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            address,
            database: database.into(),
            user: user.into(),
            password: None,
            runtime_params: BTreeMap::new(),
            lazy: false,
            max_connections: default_max_connections(),
        }
    }

    /// Look up a runtime parameter
    pub fn runtime_param(&self, key: &str) -> Option<&str> {
        self.runtime_params.get(key).map(String::as_str)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("address", &self.address)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("runtime_params", &self.runtime_params)
            .field("lazy", &self.lazy)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Builder for [`ConnectionConfig`]
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    address: Address,
    database: String,
    user: String,
    password: Option<String>,
    runtime_params: BTreeMap<String, String>,
    lazy: bool,
    max_connections: usize,
}

impl ConnectionConfigBuilder {
    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a session runtime parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_params.insert(key.into(), value.into());
        self
    }

    /// Defer connecting until first use
    ///
    /// Default: false
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Set the maximum number of live connections
    ///
    /// Default: `max(4, available parallelism)`. Zero is bumped to one.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            address: self.address,
            database: self.database,
            user: self.user,
            password: self.password,
            runtime_params: self.runtime_params,
            lazy: self.lazy,
            max_connections: self.max_connections,
        }
    }
}

/// Default pool size: at least 4, otherwise one connection per CPU
pub fn default_max_connections() -> usize {
    let cpus = std::thread::available_parallelism().map_or(4, |n| n.get());
    cpus.max(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp() -> Address {
        Address::Tcp {
            host: "localhost".into(),
            port: DEFAULT_PORT,
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = ConnectionConfig::builder(tcp(), "db", "user").build();

        assert_eq!(config.database, "db");
        assert_eq!(config.user, "user");
        assert!(config.password.is_none());
        assert!(config.runtime_params.is_empty());
        assert!(!config.lazy);
        assert!(config.max_connections >= 4);
    }

    #[test]
    fn test_builder_fluent() {
        let config = ConnectionConfig::builder(tcp(), "mydb", "myuser")
            .password("secret")
            .param("key1", "value1")
            .lazy(true)
            .max_connections(0)
            .build();

        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.runtime_param("key1"), Some("value1"));
        assert!(config.lazy);
        assert_eq!(config.max_connections, 1);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectionConfig::builder(tcp(), "db", "user")
            .password("hunter2")
            .build();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_address_display() {
        assert_eq!(tcp().to_string(), "localhost:5432");
        let unix = Address::Unix(PathBuf::from("/tmp/.s.PGSQL.5432"));
        assert_eq!(unix.to_string(), "/tmp/.s.PGSQL.5432");
    }
}
