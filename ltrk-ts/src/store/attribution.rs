//! Attribution record store
//!
//! One row per click identifier, holding UTM attribution columns, the
//! FIFO-capped JSON events array, and the webhook-owned business fields.
//! Event appends are expressed as a single SQL statement so concurrent
//! requests rely on the storage engine, not an application lock.

use ltrk_common::db::models::{AttributionRecord, EventEntry, NewAttribution, EVENT_FIFO_CAP};
use ltrk_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::warn;

#[derive(Clone)]
pub struct AttributionStore {
    pool: SqlitePool,
}

impl AttributionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the record for a click identifier on first observation
    ///
    /// Attribution columns are written once: re-observing a known click id
    /// fills in UTM fields that are still NULL but never overwrites values
    /// captured earlier. `date_updated` is always touched.
    pub async fn upsert(&self, attribution: &NewAttribution) -> Result<()> {
        let now = time::timestamp_now();

        sqlx::query(
            r#"
            INSERT INTO attribution_records (
                click_id, utm_source, utm_medium, utm_campaign, utm_term,
                utm_content, events, qualified, score, date_created, date_updated
            )
            VALUES (?, ?, ?, ?, ?, ?, '[]', 0, 0, ?, ?)
            ON CONFLICT(click_id) DO UPDATE SET
                utm_source   = COALESCE(attribution_records.utm_source, excluded.utm_source),
                utm_medium   = COALESCE(attribution_records.utm_medium, excluded.utm_medium),
                utm_campaign = COALESCE(attribution_records.utm_campaign, excluded.utm_campaign),
                utm_term     = COALESCE(attribution_records.utm_term, excluded.utm_term),
                utm_content  = COALESCE(attribution_records.utm_content, excluded.utm_content),
                date_updated = excluded.date_updated
            "#,
        )
        .bind(&attribution.click_id)
        .bind(&attribution.utm_source)
        .bind(&attribution.utm_medium)
        .bind(&attribution.utm_campaign)
        .bind(&attribution.utm_term)
        .bind(&attribution.utm_content)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append one event to a record's events array
    ///
    /// Single atomic statement: when the array is at the FIFO cap the oldest
    /// entry is dropped before the append. Returns `false` (logged, not an
    /// error) when the click identifier does not exist - tracking must never
    /// fail the user-facing action that triggered it.
    pub async fn append_event(&self, click_id: &str, entry: &EventEntry) -> Result<bool> {
        let payload = serde_json::to_string(entry)
            .map_err(|e| ltrk_common::Error::Internal(format!("event serialization: {}", e)))?;

        let result = sqlx::query(
            r#"
            UPDATE attribution_records
            SET events = json_insert(
                    CASE
                        WHEN json_array_length(events) >= ?1
                            THEN json_remove(events, '$[0]')
                        ELSE events
                    END,
                    '$[#]', json(?2)
                ),
                date_updated = ?3
            WHERE click_id = ?4
            "#,
        )
        .bind(EVENT_FIFO_CAP)
        .bind(&payload)
        .bind(time::timestamp_now())
        .bind(click_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Event append for unknown click_id '{}' skipped", click_id);
            return Ok(false);
        }

        Ok(true)
    }

    /// Fetch a single record by click identifier
    pub async fn get(&self, click_id: &str) -> Result<Option<AttributionRecord>> {
        let row = sqlx::query(
            "SELECT click_id, utm_source, utm_medium, utm_campaign, utm_term, utm_content, \
                    events, qualified, score, date_created, date_updated \
             FROM attribution_records WHERE click_id = ?",
        )
        .bind(click_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }

    /// Write the webhook-owned business fields
    ///
    /// Returns `false` when the click identifier does not exist.
    pub async fn update_score(&self, click_id: &str, qualified: bool, score: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE attribution_records \
             SET qualified = ?, score = ?, date_updated = ? \
             WHERE click_id = ?",
        )
        .bind(qualified as i64)
        .bind(score)
        .bind(time::timestamp_now())
        .bind(click_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most recently active records, newest first (served by the
    /// `date_updated` index)
    pub async fn recent(&self, limit: i64) -> Result<Vec<AttributionRecord>> {
        let rows = sqlx::query(
            "SELECT click_id, utm_source, utm_medium, utm_campaign, utm_term, utm_content, \
                    events, qualified, score, date_created, date_updated \
             FROM attribution_records \
             ORDER BY date_updated DESC \
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Bulk delete of records that carry a `test_event` marker in any event
    ///
    /// Used by the test-data cleanup endpoint; returns the number of records
    /// removed.
    pub async fn delete_test_records(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM attribution_records \
             WHERE EXISTS ( \
                 SELECT 1 FROM json_each(attribution_records.events) \
                 WHERE json_extract(json_each.value, '$.test_event') IS NOT NULL \
             )",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_record(row: SqliteRow) -> Result<AttributionRecord> {
    let events_text: String = row.try_get("events")?;
    // Tolerate malformed stored arrays rather than failing the read
    let events: Vec<EventEntry> = serde_json::from_str(&events_text).unwrap_or_default();

    let qualified: i64 = row.try_get("qualified")?;

    Ok(AttributionRecord {
        click_id: row.try_get("click_id")?,
        utm_source: row.try_get("utm_source")?,
        utm_medium: row.try_get("utm_medium")?,
        utm_campaign: row.try_get("utm_campaign")?,
        utm_term: row.try_get("utm_term")?,
        utm_content: row.try_get("utm_content")?,
        events,
        qualified: qualified != 0,
        score: row.try_get("score")?,
        date_created: row.try_get("date_created")?,
        date_updated: row.try_get("date_updated")?,
    })
}
