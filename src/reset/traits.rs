//! Seam between the scheduler and whatever it resets.

use std::sync::Arc;

use crate::storage::{MetricStore, StorageError};

/// Something the daily reset scheduler can fire against.
///
/// Implemented by [`MetricStore`]; tests substitute counting doubles.
#[async_trait::async_trait]
pub trait ResetTarget: Send + Sync + 'static {
    /// Zero every metric flagged for daily reset, returning how many were reset.
    async fn reset_flagged(&self) -> Result<u64, StorageError>;
}

#[async_trait::async_trait]
impl ResetTarget for MetricStore {
    async fn reset_flagged(&self) -> Result<u64, StorageError> {
        MetricStore::reset_flagged(self).await
    }
}

#[async_trait::async_trait]
impl<T: ResetTarget + ?Sized> ResetTarget for Arc<T> {
    async fn reset_flagged(&self) -> Result<u64, StorageError> {
        (**self).reset_flagged().await
    }
}
