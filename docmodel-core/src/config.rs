//! Data source configuration.
//!
//! [`DataSourceOptions`] can be built in code or deserialized from any serde format:
//!
//! ```ignore
//! let options: DataSourceOptions = serde_json::from_str(r#"{
//!     "url": "mongodb://localhost:27017/app",
//!     "auto_index": false
//! }"#)?;
//! assert_eq!(options.default_database().as_deref(), Some("app"));
//! ```

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceOptions {
    /// Full connection string. Takes precedence over host and port.
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Default database for bound classes without their own.
    pub database: Option<String>,
    /// Connect on the first request for a collection instead of requiring `connect()`.
    #[serde(default = "enabled")]
    pub auto_connect: bool,
    /// Create declared indexes when a class is registered.
    #[serde(default = "enabled")]
    pub auto_index: bool,
}

impl Default for DataSourceOptions {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            auto_connect: true,
            auto_index: true,
        }
    }
}

impl DataSourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn auto_index(mut self, enabled: bool) -> Self {
        self.auto_index = enabled;
        self
    }

    /// The connection string handed to the driver.
    pub fn connect_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        let credentials = match (&self.user, &self.password) {
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        let host = self.host.as_deref().unwrap_or(DEFAULT_HOST);
        let port = self.port.unwrap_or(DEFAULT_PORT);

        match &self.database {
            Some(database) => format!("mongodb://{}{}:{}/{}", credentials, host, port, database),
            None => format!("mongodb://{}{}:{}", credentials, host, port),
        }
    }

    /// The default database: the configured one, else the path of the connection string.
    pub fn default_database(&self) -> Option<String> {
        self.database
            .clone()
            .or_else(|| self.url.as_deref().and_then(database_from_url))
    }
}

/// Extracts the database name from a connection string such as
/// `mongodb://host:27017/app?retryWrites=true`.
pub fn database_from_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = rest.split('?').next().unwrap_or(rest);
    let (_, name) = path.rsplit_once('/')?;

    let is_word = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_word.then(|| name.to_string())
}
