//! Metric storage.
//!
//! [`MetricStore`] is the single owner of the `metrics` table. Reads go straight
//! to the pool; every write takes the store-wide write gate and commits before
//! returning. Arithmetic updates read and write inside the same transaction
//! while the gate is held, so concurrent increments never lose an update.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::Mutex;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::types::{Metric, MetricRow, NewMetric, format_timestamp};

const SELECT_ALL: &str = "SELECT name, category, unit, value, reset_daily, last_changed
     FROM metrics ORDER BY name";

const SELECT_ONE: &str = "SELECT name, category, unit, value, reset_daily, last_changed
     FROM metrics WHERE name = ?";

/// Current time truncated to the precision stored in `last_changed`.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn ensure_finite(what: &str, name: &str, v: f64) -> Result<(), StorageError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(StorageError::InvalidArgument(format!(
            "{what} for metric '{name}' must be a finite number, got {v}"
        )))
    }
}

// =============================================================================
// Metric Store
// =============================================================================

/// Durable, concurrency-safe store of metrics.
///
/// Cloning is cheap; clones share the pool and the write gate.
#[derive(Clone)]
pub struct MetricStore {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

impl std::fmt::Debug for MetricStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricStore").finish_non_exhaustive()
    }
}

impl MetricStore {
    /// Create a store over an initialized pool.
    ///
    /// The schema must already exist (see [`StorageBuilder`](crate::storage::StorageBuilder)).
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Create a metric with value 0.
    ///
    /// # Errors
    /// - `InvalidArgument` if name or category is blank
    /// - `AlreadyExists` if a metric with this exact name exists
    pub async fn add(&self, metric: NewMetric) -> Result<Metric, StorageError> {
        metric.validate()?;

        let _gate = self.write_gate.lock().await;
        let now = now();

        let result = sqlx::query(
            "INSERT INTO metrics (name, category, unit, value, reset_daily, last_changed)
             VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(&metric.name)
        .bind(&metric.category)
        .bind(&metric.unit)
        .bind(metric.reset_daily)
        .bind(format_timestamp(now))
        .execute(self.pool.inner())
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StorageError::AlreadyExists(metric.name));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            metric = %metric.name,
            category = %metric.category,
            reset_daily = metric.reset_daily,
            "Metric added"
        );

        Ok(Metric {
            name: metric.name,
            category: metric.category,
            unit: metric.unit,
            value: 0.0,
            reset_daily: metric.reset_daily,
            last_changed: now,
        })
    }

    /// Delete a metric by name.
    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let _gate = self.write_gate.lock().await;

        let result = sqlx::query("DELETE FROM metrics WHERE name = ?")
            .bind(name)
            .execute(self.pool.inner())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(name.to_string()));
        }

        tracing::info!(metric = %name, "Metric deleted");
        Ok(())
    }

    /// Get a snapshot of one metric.
    pub async fn get(&self, name: &str) -> Result<Metric, StorageError> {
        let row: Option<MetricRow> = sqlx::query_as(SELECT_ONE)
            .bind(name)
            .fetch_optional(self.pool.inner())
            .await?;

        row.ok_or_else(|| StorageError::NotFound(name.to_string()))?
            .try_into()
    }

    /// List all metrics, ordered by name.
    pub async fn list(&self) -> Result<Vec<Metric>, StorageError> {
        let rows: Vec<MetricRow> = sqlx::query_as(SELECT_ALL)
            .fetch_all(self.pool.inner())
            .await?;

        rows.into_iter().map(Metric::try_from).collect()
    }

    /// Overwrite the value of a metric.
    ///
    /// # Errors
    /// - `InvalidArgument` if `value` is negative or not finite
    /// - `NotFound` if the metric does not exist
    pub async fn set(&self, name: &str, value: f64) -> Result<Metric, StorageError> {
        ensure_finite("value", name, value)?;
        if value < 0.0 {
            return Err(StorageError::InvalidArgument(format!(
                "value for metric '{name}' must not be negative, got {value}"
            )));
        }

        self.update_value(name, "set", |_| Ok(value)).await
    }

    /// Add `delta` to a metric.
    ///
    /// A negative delta that would take the value below zero is rejected with
    /// `WouldGoNegative` and leaves the metric untouched.
    pub async fn increment(&self, name: &str, delta: f64) -> Result<Metric, StorageError> {
        ensure_finite("delta", name, delta)?;

        self.update_value(name, "increment", |current| {
            let next = current + delta;
            if next < 0.0 {
                return Err(StorageError::WouldGoNegative {
                    name: name.to_string(),
                    current,
                    delta,
                });
            }
            ensure_finite("result", name, next)?;
            Ok(next)
        })
        .await
    }

    /// Subtract `delta` from a metric.
    ///
    /// # Errors
    /// - `WouldGoNegative` if the result would be below zero; nothing is written
    /// - `NotFound` if the metric does not exist
    pub async fn decrement(&self, name: &str, delta: f64) -> Result<Metric, StorageError> {
        ensure_finite("delta", name, delta)?;

        self.update_value(name, "decrement", |current| {
            let next = current - delta;
            if next < 0.0 {
                return Err(StorageError::WouldGoNegative {
                    name: name.to_string(),
                    current,
                    delta,
                });
            }
            ensure_finite("result", name, next)?;
            Ok(next)
        })
        .await
    }

    /// Zero every metric flagged `reset_daily`.
    ///
    /// Returns the number of metrics reset. Unflagged metrics are not touched.
    pub async fn reset_flagged(&self) -> Result<u64, StorageError> {
        let _gate = self.write_gate.lock().await;

        let names: Vec<String> = sqlx::query_scalar(
            "UPDATE metrics SET value = 0, last_changed = MAX(last_changed, ?)
             WHERE reset_daily = 1
             RETURNING name",
        )
        .bind(format_timestamp(now()))
        .fetch_all(self.pool.inner())
        .await?;

        tracing::debug!(metrics = ?names, "Flagged metrics reset");
        Ok(names.len() as u64)
    }

    /// Check that the database answers queries.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(self.pool.inner()).await?;
        Ok(())
    }

    // --- Private helpers ---

    /// Read-modify-write of one metric's value inside a single transaction.
    ///
    /// `compute` maps the current value to the new one; returning an error
    /// aborts without writing. `last_changed` never moves backwards.
    async fn update_value<F>(
        &self,
        name: &str,
        op: &'static str,
        compute: F,
    ) -> Result<Metric, StorageError>
    where
        F: FnOnce(f64) -> Result<f64, StorageError>,
    {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.inner().begin().await?;

        let row: Option<MetricRow> = sqlx::query_as(SELECT_ONE)
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        let current = Metric::try_from(row.ok_or_else(|| StorageError::NotFound(name.to_string()))?)?;

        let value = compute(current.value)?;
        let last_changed = now().max(current.last_changed);

        sqlx::query("UPDATE metrics SET value = ?, last_changed = ? WHERE name = ?")
            .bind(value)
            .bind(format_timestamp(last_changed))
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(metric = %name, op, from = current.value, to = value, "Metric updated");

        Ok(Metric {
            value,
            last_changed,
            ..current
        })
    }
}
