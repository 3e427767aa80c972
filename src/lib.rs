//! Quantitea - Personal Metric Tracking Library
//!
//! This crate provides the core functionality for Quantitea, a small service
//! that keeps named, non-negative counters ("water: 5 cups", "weight: 70.5 kg")
//! and zeroes the ones flagged for daily reset at local midnight. It can be
//! used as a library, or run as a standalone binary with the `quantitea`
//! executable.
//!
//! # Architecture
//!
//! - **Storage**: SQLite-backed [`MetricStore`] with serialized, durable writes
//! - **Reset**: [`DailyResetScheduler`] zeroing flagged metrics on a schedule
//! - **Exporter**: Prometheus gauge over the current values
//! - **Server**: JSON REST API and health probes
//!
//! # Example
//!
//! ```rust,no_run
//! use quantitea::{DailyResetScheduler, NewMetric, Schedule, StorageBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handles = StorageBuilder::new("kettle.db").build().await?;
//!     let store = handles.store.clone();
//!
//!     store.add(NewMetric::new("water", "health", "cups", true)).await?;
//!     store.increment("water", 2.0).await?;
//!
//!     let scheduler = DailyResetScheduler::start(store.clone(), Schedule::Midnight);
//!
//!     // ... serve requests ...
//!
//!     scheduler.shutdown().await;
//!     handles.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod exporter;
pub mod reset;
pub mod server;
pub mod storage;

pub use exporter::{ExporterError, MetricExporter};
pub use reset::{DailyResetScheduler, ResetTarget, Schedule, SchedulerState};
pub use storage::{
    ErrorKind, Metric, MetricStore, NewMetric, StorageBuilder, StorageError, StorageHandles,
};
