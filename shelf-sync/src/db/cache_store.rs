//! SQLite-backed cache store
//!
//! Entries live in `cache_entries(key, value, updated_at)`. `put_many` and
//! `delete_many` run inside one transaction, so records and metadata are
//! never half-written.

use async_trait::async_trait;
use shelf_common::Result;
use sqlx::SqlitePool;

use crate::services::local_cache::CacheStore;

pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO cache_entries (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(*key)
            .bind(value)
            .bind(&updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(entries = entries.len(), "Cache entries written");
        Ok(())
    }

    async fn delete_many(&self, keys: &[&str]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for key in keys {
            sqlx::query("DELETE FROM cache_entries WHERE key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use crate::services::local_cache::{METADATA_KEY, RECORDS_KEY};
    use tempfile::TempDir;

    async fn store() -> (SqliteCacheStore, SqlitePool, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("shelf.db")).await.unwrap();
        (SqliteCacheStore::new(pool.clone()), pool, dir)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (store, _pool, _dir) = store().await;

        assert_eq!(store.get(RECORDS_KEY).await.unwrap(), None);

        store
            .put_many(&[(RECORDS_KEY, "[]".to_string()), (METADATA_KEY, "{}".to_string())])
            .await
            .unwrap();
        store
            .put_many(&[(RECORDS_KEY, "[1]".to_string())])
            .await
            .unwrap();

        assert_eq!(store.get(RECORDS_KEY).await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.get(METADATA_KEY).await.unwrap().as_deref(), Some("{}"));

        store.delete_many(&[RECORDS_KEY, METADATA_KEY]).await.unwrap();
        assert_eq!(store.get(METADATA_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_many_is_atomic() {
        let (store, pool, _dir) = store().await;

        sqlx::query(
            r#"
            CREATE TRIGGER reject_metadata BEFORE INSERT ON cache_entries
            WHEN NEW.key = 'collection.metadata'
            BEGIN
                SELECT RAISE(ABORT, 'metadata rejected');
            END
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = store
            .put_many(&[(RECORDS_KEY, "[]".to_string()), (METADATA_KEY, "{}".to_string())])
            .await;

        assert!(result.is_err());
        assert_eq!(store.get(RECORDS_KEY).await.unwrap(), None);
    }
}
