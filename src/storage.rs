//! Storage Layer
//!
//! SQLite-backed metric storage:
//! - **Writes**: serialized through one write gate, committed before returning
//! - **Reads**: served from the connection pool (WAL mode, never blocked by writes)
//!
//! # Components
//!
//! - [`MetricStore`]: Metric CRUD, arithmetic and the daily reset sweep
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management
//! - [`StorageError`] / [`ErrorKind`]: Typed failures for adapters

mod builder;
pub mod db;
mod error;
mod metric_store;
mod schema;
mod types;

pub use builder::{StorageBuilder, StorageHandles};
pub use error::{ErrorKind, StorageError};
pub use metric_store::MetricStore;
pub use types::{Metric, NewMetric};
