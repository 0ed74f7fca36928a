//! Update-activity audit log
//!
//! Records administrative actions (schema migrations, rollbacks) with a
//! hard cap: only the most recent entries are kept, oldest deleted first.

use ltrk_common::db::models::{UpdateActivity, ACTIVITY_LOG_CAP};
use ltrk_common::{time, Result};
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct ActivityLog {
    pool: SqlitePool,
}

impl ActivityLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one audit entry, pruning beyond the retention cap
    pub async fn record(
        &self,
        action: &str,
        status: &str,
        version_from: Option<&str>,
        version_to: Option<&str>,
        details: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO update_activity \
             (timestamp, action, status, version_from, version_to, details, user_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(time::timestamp_now())
        .bind(action)
        .bind(status)
        .bind(version_from)
        .bind(version_to)
        .bind(details)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        // FIFO retention: drop everything older than the newest cap entries
        sqlx::query(
            "DELETE FROM update_activity WHERE id NOT IN \
             (SELECT id FROM update_activity ORDER BY id DESC LIMIT ?)",
        )
        .bind(ACTIVITY_LOG_CAP)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retained entries, newest first
    pub async fn recent(&self) -> Result<Vec<UpdateActivity>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, action, status, version_from, version_to, details, user_id \
             FROM update_activity ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(UpdateActivity {
                id: row.try_get("id")?,
                timestamp: row.try_get("timestamp")?,
                action: row.try_get("action")?,
                status: row.try_get("status")?,
                version_from: row.try_get("version_from")?,
                version_to: row.try_get("version_to")?,
                details: row.try_get("details")?,
                user_id: row.try_get("user_id")?,
            });
        }
        Ok(entries)
    }
}
