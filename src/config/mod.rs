//! # Venue Service Configuration System
//!
//! Configuration is read once at startup from a file (JSON, YAML or TOML) and
//! layered under `VENUE__`-prefixed environment variables, then validated
//! before anything is constructed from it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use venue_service::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let inbox = &manager.config().message.inbox;
//! let topics = manager.config().message.unique_topics();
//! # Ok(())
//! # }
//! ```
//!
//! Environment overrides use `__` as the nesting separator, e.g.
//! `VENUE__MESSAGE__OPTIONS__HOSTNAME=rabbit` or
//! `VENUE__MESSAGE__TOPICS=venues.details.*,venues.discovery.*`.

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{detect_environment, ConfigManager};

/// Root configuration structure mirroring `config/configuration.json`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Message broker settings
    pub message: MessagingConfig,

    /// Venue storage settings
    pub database: DatabaseConfig,
}

impl ServiceConfig {
    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.message.validate()?;
        self.database.validate()?;
        Ok(())
    }
}

/// Broker topology and connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagingConfig {
    /// Connection parameters handed to the connector
    #[serde(default)]
    pub options: ConnectOptions,

    /// Direct exchange replies are published to
    pub gateway: String,

    /// Topic exchange inbound requests are read from
    pub request: String,

    /// Shared, non-exclusive inbox queue
    pub inbox: String,

    /// Routing patterns the inbox is bound under
    #[serde(default)]
    pub topics: Vec<String>,
}

impl MessagingConfig {
    pub fn new(
        gateway: impl Into<String>,
        request: impl Into<String>,
        inbox: impl Into<String>,
        topics: Vec<String>,
    ) -> Self {
        Self {
            options: ConnectOptions::default(),
            gateway: gateway.into(),
            request: request.into(),
            inbox: inbox.into(),
            topics,
        }
    }

    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Topics with duplicates removed, keeping first-seen order
    pub fn unique_topics(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.topics
            .iter()
            .filter(|topic| seen.insert(topic.as_str()))
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("message.gateway", &self.gateway),
            ("message.request", &self.request),
            ("message.inbox", &self.inbox),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "messaging configuration",
                ));
            }
        }

        if let Some(topic) = self.topics.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "message.topics",
                topic.clone(),
                "binding patterns must not be empty",
            ));
        }

        if self.options.uri.is_none() && self.options.hostname.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "message.options.hostname",
                "messaging configuration",
            ));
        }

        Ok(())
    }
}

/// Broker connection parameters
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectOptions {
    /// Full AMQP URI; takes precedence over the individual fields
    pub uri: Option<String>,
    pub protocol: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Heartbeat interval in seconds
    pub heartbeat: Option<u16>,
    /// Connection name shown in the broker's management UI
    pub connection_name: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            uri: None,
            protocol: "amqp".to_string(),
            hostname: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            heartbeat: None,
            connection_name: None,
        }
    }
}

impl ConnectOptions {
    /// Build the AMQP URI for these options
    pub fn amqp_uri(&self) -> String {
        if let Some(uri) = &self.uri {
            return uri.clone();
        }

        let mut uri = format!(
            "{}://{}:{}@{}:{}/{}",
            self.protocol,
            percent_encode(&self.username),
            percent_encode(&self.password),
            self.hostname,
            self.port,
            percent_encode(&self.vhost)
        );
        if let Some(heartbeat) = self.heartbeat {
            uri.push_str(&format!("?heartbeat={heartbeat}"));
        }
        uri
    }

    /// The URI with the password masked, for logging
    pub fn redacted_uri(&self) -> String {
        let mut redacted = self.clone();
        if redacted.uri.is_none() {
            redacted.password = "***".to_string();
            return redacted.amqp_uri();
        }
        "[uri configured]".to_string()
    }
}

fn percent_encode(component: &str) -> String {
    component
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02x}"),
        })
        .collect()
}

/// Which venue store implementation to run against
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local store, lost on restart
    #[default]
    Memory,
    /// PostgreSQL via sqlx
    Postgres,
}

/// Venue storage settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    /// Full connection URL; takes precedence over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Table holding venue rows
    pub table: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "venues".to_string(),
            password: String::new(),
            database: "venues".to_string(),
            table: "venues".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Build the database URL, honouring `DATABASE_URL` when the configured URL asks for it
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.url {
            if url == "${DATABASE_URL}" {
                if let Ok(env_url) = std::env::var("DATABASE_URL") {
                    return env_url;
                }
            } else if !url.is_empty() {
                return url.clone();
            }
        }

        format!(
            "postgresql://{}:{}@{}:{}/{}",
            percent_encode(&self.username),
            percent_encode(&self.password),
            self.host,
            self.port,
            self.database
        )
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.backend != StorageBackend::Postgres {
            return Ok(());
        }

        if self.url.is_none() && self.host.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.host",
                "database configuration",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool size must be greater than 0",
            ));
        }

        let table_is_identifier = !self.table.is_empty()
            && self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !self.table.starts_with(|c: char| c.is_ascii_digit());
        if !table_is_identifier {
            return Err(ConfigurationError::invalid_value(
                "database.table",
                self.table.clone(),
                "table name must be a plain SQL identifier",
            ));
        }

        Ok(())
    }
}
