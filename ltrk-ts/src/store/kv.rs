//! Key/value settings store with TTL support
//!
//! Reifies the host-global option/transient storage as an explicit port:
//! durable configuration rows have no expiry, transient rows (rate-limit
//! counters, pause markers) carry an `expires_at` timestamp and are lazily
//! purged on read. Timestamps are RFC 3339 UTC, so SQL string comparison
//! matches chronological order.

use chrono::Duration;
use ltrk_common::{time, Result};
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read a value; expired entries are deleted and reported as absent
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value, expires_at FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: Option<String> = row.try_get("expires_at")?;
        if let Some(expires_at) = expires_at {
            if expires_at <= time::timestamp_now() {
                self.delete(key).await?;
                return Ok(None);
            }
        }

        Ok(Some(row.try_get("value")?))
    }

    /// Write a value, optionally expiring after `ttl`
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| time::format_timestamp(time::now() + ttl));

        sqlx::query(
            "INSERT INTO settings (key, value, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET \
                 value = excluded.value, \
                 expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a key (absent key is not an error)
    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Atomically increment a counter, returning the post-increment value
    ///
    /// The expiry is set when the counter is created and not extended by
    /// later increments; concurrent callers are serialized by the single
    /// upsert statement.
    pub async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<i64> {
        let expires_at = ttl.map(|ttl| time::format_timestamp(time::now() + ttl));

        let count: i64 = sqlx::query_scalar(
            "INSERT INTO settings (key, value, expires_at) VALUES (?, '1', ?) \
             ON CONFLICT(key) DO UPDATE SET \
                 value = CAST(CAST(settings.value AS INTEGER) + 1 AS TEXT) \
             RETURNING CAST(value AS INTEGER)",
        )
        .bind(key)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
