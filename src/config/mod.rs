//! Configuration module for Quantitea.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (path, pool size, busy timeout)
//! - Daily reset schedule
//! - Prometheus exporter toggle

mod app;
mod validation;

pub use app::{AppConfig, DatabaseConfig, ExporterConfig, ResetConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_DB_PATH, DEFAULT_PORT};
