//! Database schema definitions.

use sqlx::SqlitePool;

use crate::storage::StorageError;

/// SQL statement for creating the metrics table.
///
/// One row per metric, keyed by name. `last_changed` holds fixed-width
/// RFC 3339 UTC text so that `MAX()` over the column orders chronologically.
/// The CHECK constraints back the store's own validation.
pub const METRICS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    name         TEXT PRIMARY KEY NOT NULL CHECK (length(name) > 0),
    category     TEXT NOT NULL,
    unit         TEXT NOT NULL DEFAULT '',
    value        REAL NOT NULL DEFAULT 0 CHECK (value >= 0),
    reset_daily  INTEGER NOT NULL DEFAULT 0,
    last_changed TEXT NOT NULL
);
"#;

/// Partial index for the daily reset sweep.
pub const METRICS_RESET_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_metrics_reset_daily ON metrics (reset_daily) WHERE reset_daily = 1;
"#;

/// Initialize the database schema.
///
/// Creates all necessary tables and indexes if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(METRICS_TABLE_DDL).execute(pool).await?;
    sqlx::query(METRICS_RESET_INDEX_DDL).execute(pool).await?;

    tracing::info!("Database schema initialized");
    Ok(())
}
