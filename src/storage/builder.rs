//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing the store and closing it cleanly.

use std::path::Path;
use std::time::Duration;

use crate::storage::StorageError;
use crate::storage::db::{DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_CONNECTIONS, SqlitePool, sqlite_url};
use crate::storage::metric_store::MetricStore;
use crate::storage::schema::init_schema;

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    location: String,
    max_connections: u32,
    busy_timeout: Duration,
}

impl StorageBuilder {
    /// Create a new storage builder.
    ///
    /// `location` is either a filesystem path (`data/kettle.db`) or a full
    /// sqlx URL (`sqlite::memory:`).
    pub fn new(location: impl AsRef<str>) -> Self {
        Self {
            location: location.as_ref().to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Set the maximum number of pooled connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set how long a connection waits on a locked database.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Build the storage layer and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        // Create parent directory if it doesn't exist
        if !self.location.starts_with("sqlite:")
            && let Some(parent) = Path::new(&self.location).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let url = sqlite_url(&self.location);
        let pool = SqlitePool::connect_with(&url, self.max_connections, self.busy_timeout).await?;
        init_schema(pool.inner()).await?;

        tracing::debug!(url = %url, max_connections = self.max_connections, "Storage opened");

        Ok(StorageHandles {
            store: MetricStore::new(pool.clone()),
            pool,
        })
    }
}

/// Handles to the storage layer.
pub struct StorageHandles {
    /// The metric store; clone it for every caller.
    pub store: MetricStore,
    pool: SqlitePool,
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Waits for in-flight queries and closes every pooled connection. Store
    /// clones still alive afterwards fail with a storage error.
    pub async fn shutdown(self) -> Result<(), StorageError> {
        self.pool.close().await;
        tracing::info!("Storage closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ErrorKind, NewMetric};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_storage_builder_creates_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("data").join("kettle.db");

        let handles = StorageBuilder::new(db_path.to_string_lossy())
            .max_connections(2)
            .build()
            .await
            .unwrap();
        assert!(db_path.exists());

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_roundtrip() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("roundtrip.db");

        // Phase 1: write and close
        {
            let handles = StorageBuilder::new(db_path.to_string_lossy())
                .build()
                .await
                .unwrap();
            for i in 0..5 {
                let name = format!("metric.{i}");
                handles
                    .store
                    .add(NewMetric::new(&name, "roundtrip", "", i % 2 == 0))
                    .await
                    .unwrap();
                handles.store.set(&name, f64::from(i)).await.unwrap();
            }
            handles.shutdown().await.unwrap();
        }

        // Phase 2: reopen and read
        let handles = StorageBuilder::new(db_path.to_string_lossy())
            .build()
            .await
            .unwrap();
        let metrics = handles.store.list().await.unwrap();
        assert_eq!(metrics.len(), 5);
        assert_eq!(metrics[3].value, 3.0);
        assert!(metrics[4].reset_daily);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        handles
            .store
            .add(NewMetric::new("water", "health", "cups", true))
            .await
            .unwrap();
        assert_eq!(handles.store.list().await.unwrap().len(), 1);
        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_after_shutdown_reports_storage_failure() {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let store = handles.store.clone();
        handles.shutdown().await.unwrap();

        let err = store.list().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
    }
}
