//! Storage-specific error types.
//!
//! All store operations return [`StorageError`] on failure. Callers that need
//! to render errors (HTTP adapters, the CLI) match on [`StorageError::kind`]
//! rather than on individual variants, so that "metric already exists" can be
//! told apart from "storage unavailable".

use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The referenced metric does not exist.
    #[error("metric '{0}' does not exist")]
    NotFound(String),

    /// A metric with the same name already exists.
    #[error("metric '{0}' already exists")]
    AlreadyExists(String),

    /// The write would leave the metric with a negative value.
    #[error("metric '{name}' cannot go negative (current {current}, delta {delta})")]
    WouldGoNegative {
        name: String,
        current: f64,
        delta: f64,
    },

    /// Caller supplied an argument the store refuses (blank name, NaN, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid data in database (e.g., unparseable timestamp).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Internal error (e.g., filesystem setup failure).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`StorageError`] for adapters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    WouldGoNegative,
    InvalidArgument,
    /// Persistence unavailable or returned unusable data.
    StorageFailure,
}

impl StorageError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::WouldGoNegative { .. } => ErrorKind::WouldGoNegative,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Database(_) | Self::InvalidData(_) | Self::Internal(_) => {
                ErrorKind::StorageFailure
            }
        }
    }
}
