//! Database initialization
//!
//! The service keeps a single table, `metadata_index`, in SQLite. Schema
//! creation is idempotent and runs on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open (or create) the database behind `database_url` and ensure the schema exists
///
/// Accepts `sqlite://path/to/file.db` style URLs as well as `sqlite::memory:`.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    if is_memory_url(database_url) {
        return init_memory_database().await;
    }

    let file_path = sqlite_file_path(database_url);
    let newly_created = file_path.as_ref().map(|p| !p.exists()).unwrap_or(false);

    // Create parent directory if it doesn't exist
    if let Some(parent) = file_path.as_ref().and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", database_url);
    } else {
        info!("Opened existing database: {}", database_url);
    }

    // WAL allows concurrent readers alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_metadata_index_table(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests and throwaway runs
///
/// Every SQLite `:memory:` connection is its own database, so the pool is
/// pinned to one connection that never expires.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect_with(options)
        .await?;

    create_metadata_index_table(&pool).await?;

    Ok(pool)
}

/// Create the metadata_index table
///
/// Rows are append-only. Uniqueness of (type, timestamp, traffic_light_id) is
/// enforced by the writer's existence check, so the lookup index is not UNIQUE.
pub async fn create_metadata_index_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metadata_index (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            traffic_light_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_metadata_index_triple
            ON metadata_index (type, timestamp, traffic_light_id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_metadata_index_traffic_light
            ON metadata_index (traffic_light_id, timestamp)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Filesystem path of a `sqlite://` URL, without query parameters
fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
