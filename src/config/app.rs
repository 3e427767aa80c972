//! Application configuration structures.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reset::Schedule;
use crate::storage::StorageBuilder;

use super::validation::{ConfigError, check_bind_address, check_positive, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8005;

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "kettle.db";

/// Default connection pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = crate::storage::db::DEFAULT_MAX_CONNECTIONS;

/// Default SQLite busy timeout (5 seconds).
pub const DEFAULT_BUSY_TIMEOUT: Duration = crate::storage::db::DEFAULT_BUSY_TIMEOUT;

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_busy_timeout() -> Duration {
    DEFAULT_BUSY_TIMEOUT
}

fn default_true() -> bool {
    true
}

fn default_schedule() -> String {
    "midnight".to_string()
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8005).
    pub port: u16,
}

impl ServerConfig {
    /// Socket address to listen on.
    ///
    /// Works for IPv6 binds such as `::`, which cannot be joined with the port
    /// as text.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::Invalid(format!("invalid server bind address: '{}'", self.bind))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path or sqlx URL. `${VAR:-default}` is expanded.
    pub path: String,

    /// Connection pool size (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a connection waits on a locked database (default: "5s").
    #[serde(default = "default_busy_timeout", with = "humantime_serde")]
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl DatabaseConfig {
    /// Storage builder for this database.
    pub fn storage_builder(&self) -> StorageBuilder {
        StorageBuilder::new(&self.path)
            .max_connections(self.max_connections)
            .busy_timeout(self.busy_timeout)
    }
}

// =============================================================================
// Reset Configuration
// =============================================================================

/// Daily reset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetConfig {
    /// Run the reset scheduler (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `midnight` or a duration such as `10m` (default: "midnight").
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_schedule(),
        }
    }
}

impl ResetConfig {
    /// Parsed schedule.
    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        self.schedule
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("reset schedule: {}", e)))
    }
}

// =============================================================================
// Exporter Configuration
// =============================================================================

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Serve `GET /metrics` (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Daily reset configuration.
    #[serde(default)]
    pub reset: ResetConfig,

    /// Prometheus exporter configuration.
    #[serde(default)]
    pub exporter: ExporterConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.database.path = expand_env_vars(&config.database.path);
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_bind_address(&self.server.bind)?;
        check_positive("server port", u64::from(self.server.port))?;

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "database path must not be empty".to_string(),
            ));
        }
        check_positive(
            "database max_connections",
            u64::from(self.database.max_connections),
        )?;

        self.reset.schedule()?;

        Ok(())
    }
}
