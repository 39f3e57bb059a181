//! Database access for shelf-sync
//!
//! One SQLite file (`shelf.db`) under the data folder holds the cached
//! collection as key/value entries.

pub mod cache_store;

pub use cache_store::SqliteCacheStore;

use shelf_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Database file name under the data folder
pub const DATABASE_FILE_NAME: &str = "shelf.db";

/// Initialize database connection pool
///
/// Creates the parent directory and the database file when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the cache table if it doesn't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (cache_entries)");

    Ok(())
}
