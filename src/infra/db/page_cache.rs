use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, postgres::PgPool, query};
use time::OffsetDateTime;
use tracing::debug;

use crate::cache::{CacheEntry, CacheKey, DurableRecord, DurableStore, StoreError};

use super::map_sqlx_error;

/// `page_cache` table adapter. One row per normalized key; `written_at` is
/// assigned by the database on every upsert.
#[derive(Clone)]
pub struct PostgresDurableStore {
    pool: PgPool,
}

impl PostgresDurableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DurableStore for PostgresDurableStore {
    async fn get(&self, key: &CacheKey) -> Result<DurableRecord, StoreError> {
        let row = query("SELECT payload, written_at FROM page_cache WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(DurableRecord::absent());
        };

        let timestamp: Option<OffsetDateTime> = row.try_get("written_at").ok();
        match row.try_get::<Value, _>("payload") {
            Ok(payload) => Ok(DurableRecord::found(
                payload,
                timestamp.unwrap_or_else(OffsetDateTime::now_utc),
            )),
            Err(err) => {
                debug!(key = %key, error = %err, "page_cache payload unreadable");
                Ok(DurableRecord::without_payload(timestamp))
            }
        }
    }

    async fn set(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), StoreError> {
        let document = entry.to_document()?;
        query(
            "INSERT INTO page_cache (key, payload, written_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET payload = EXCLUDED.payload, written_at = now()",
        )
        .bind(key.as_str())
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        query("DELETE FROM page_cache WHERE key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn scan_keys(&self, needle: &str) -> Result<Vec<CacheKey>, StoreError> {
        let rows = query("SELECT key FROM page_cache WHERE key LIKE $1 ESCAPE '\\' ORDER BY key")
            .bind(like_contains(needle))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("key")
                    .map(CacheKey::from_normalized)
                    .map_err(map_sqlx_error)
            })
            .collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

/// `%needle%` with LIKE metacharacters escaped; `_` is common in keys.
fn like_contains(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
