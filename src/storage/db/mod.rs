//! Database abstraction layer.
//!
//! Currently supports SQLite only. The wrapper keeps pool construction and
//! durability pragmas in one place so the store never opens connections itself.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/kettle.db?mode=rwc").await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::{DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_CONNECTIONS, SqlitePool, sqlite_url};
