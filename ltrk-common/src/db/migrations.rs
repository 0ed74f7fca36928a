//! Database schema migrations
//!
//! Implements versioned schema migrations to allow seamless database
//! upgrades without manual deletion or data loss.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - They must remain stable for
//!    databases created by older releases
//! 2. **Always add new migrations** - Create a new migration function for
//!    each schema change
//! 3. **Use ALTER TABLE** - Prefer ALTER TABLE over DROP/CREATE to preserve
//!    data
//!
//! # The events-column migration
//!
//! Migration v1 brings pre-events databases up to the current attribution
//! schema: a full table backup is taken first, the `events` JSON column and
//! the `date_updated` index are added (idempotent existence checks), legacy
//! non-JSON event text is normalized, and a completion marker is recorded.
//! A failure during the structural work triggers an automatic restore from
//! the backup copy.
//!
//! Rollback (`migrate_down`) is deliberately asymmetric: it drops the
//! `events` column and its index but leaves `qualified`/`score` untouched,
//! because the scoring webhook may have written them after the upgrade ran
//! and a blind table swap would discard those writes. Operators who prefer
//! the full swap can set `migration_down_restore = restore` in settings.

use crate::time;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Settings key recording the active backup table name
const BACKUP_TABLE_KEY: &str = "attribution_backup_table";

/// Settings key recording when the events migration completed
const EVENTS_MIGRATED_AT_KEY: &str = "attribution_events_migrated_at";

/// Settings key selecting the rollback policy (`preserve` | `restore`)
const DOWN_RESTORE_POLICY_KEY: &str = "migration_down_restore";

/// Secondary index supporting most-recently-active queries
const DATE_UPDATED_INDEX: &str = "idx_attribution_date_updated";

const ATTRIBUTION_TABLE: &str = "attribution_records";

/// Migration failure modes
///
/// Call sites match on the variant instead of catching and logging a
/// generic error; `Upgrade::restored` reports whether the automatic
/// backup restore succeeded after a failed structural change.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to create backup table: {0}")]
    Backup(#[source] sqlx::Error),

    #[error("schema upgrade failed during {context}: {source} (backup restored: {restored})")]
    Upgrade {
        context: &'static str,
        #[source]
        source: sqlx::Error,
        restored: bool,
    },

    #[error("failed to restore from backup table {table}: {source}")]
    Restore {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Rollback policy for `migrate_down`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownPolicy {
    /// Drop the events column/index, keep `qualified`/`score` as they are
    Preserve,
    /// Swap the live table back from the last `up` backup, discarding every
    /// write (including webhook scoring) made since the backup was taken
    Restore,
}

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32, MigrationError> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// Set schema version in database
async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<(), MigrationError> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), MigrationError> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1_events(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: events column + activity index on the attribution table
///
/// **Background:** Early databases stored attribution rows without the
/// per-record events array and without the `date_updated` index. This
/// migration adds both, taking a full table backup first and restoring it
/// automatically if any structural step fails.
pub async fn migrate_v1_events(pool: &SqlitePool) -> Result<(), MigrationError> {
    info!("Running migration v1: events column on attribution_records");

    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='attribution_records'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        // Table doesn't exist yet - will be created with correct schema
        info!("  attribution_records table doesn't exist yet - skipping migration");
        return Ok(());
    }

    let has_column = column_exists(pool, ATTRIBUTION_TABLE, "events").await?;
    let has_index = index_exists(pool, DATE_UPDATED_INDEX).await?;

    if has_column && has_index {
        info!("  events column and index already present - recording marker only");
        mark_events_migrated(pool).await?;
        return Ok(());
    }

    // Structural work required: back up first
    let backup_table = backup_attribution_table(pool).await?;

    if let Err((context, e)) = apply_events_upgrade(pool, has_column, has_index).await {
        warn!("  migration v1 failed during {}: {}", context, e);
        let restored = match restore_from_backup(pool, &backup_table).await {
            Ok(()) => {
                warn!("  restored attribution_records from {}", backup_table);
                true
            }
            Err(restore_err) => {
                warn!("  backup restore also failed: {}", restore_err);
                false
            }
        };
        return Err(MigrationError::Upgrade {
            context,
            source: e,
            restored,
        });
    }

    mark_events_migrated(pool).await?;
    Ok(())
}

/// Structural portion of migration v1 (column add, normalization, index)
async fn apply_events_upgrade(
    pool: &SqlitePool,
    has_column: bool,
    has_index: bool,
) -> Result<(), (&'static str, sqlx::Error)> {
    if !has_column {
        sqlx::query("ALTER TABLE attribution_records ADD COLUMN events TEXT NOT NULL DEFAULT '[]'")
            .execute(pool)
            .await
            .map_err(|e| ("events column add", e))?;
        info!("  Added events column to attribution_records");
    } else {
        // Column exists from a legacy release: rows may hold serialized
        // non-JSON text. Normalize them to empty arrays.
        let normalized = sqlx::query(
            "UPDATE attribution_records SET events = '[]' \
             WHERE events IS NULL OR json_valid(events) = 0",
        )
        .execute(pool)
        .await
        .map_err(|e| ("events normalization", e))?;
        if normalized.rows_affected() > 0 {
            info!(
                "  Normalized {} legacy events values to JSON arrays",
                normalized.rows_affected()
            );
        }
    }

    if !has_index {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_attribution_date_updated \
             ON attribution_records(date_updated)",
        )
        .execute(pool)
        .await
        .map_err(|e| ("date_updated index add", e))?;
        info!("  Added idx_attribution_date_updated index");
    }

    Ok(())
}

/// Roll back migration v1
///
/// Default policy (`preserve`) drops the events column and index while
/// leaving `qualified`/`score` exactly as they are now - NOT as they were
/// before `up` ran. A `down` after `restore` policy swaps the table from
/// the backup instead and is documented as discarding webhook writes made
/// since `up`.
pub async fn migrate_down(pool: &SqlitePool) -> Result<(), MigrationError> {
    info!("Rolling back migration v1: events column on attribution_records");

    let policy = read_down_policy(pool).await?;

    if policy == DownPolicy::Restore {
        match read_setting(pool, BACKUP_TABLE_KEY).await? {
            Some(backup_table) if table_exists(pool, &backup_table).await? => {
                restore_from_backup(pool, &backup_table).await?;
                info!("  Restored attribution_records from {}", backup_table);
            }
            _ => {
                warn!("  restore policy requested but no backup table found - preserving live data");
            }
        }
    }

    sqlx::query("DROP INDEX IF EXISTS idx_attribution_date_updated")
        .execute(pool)
        .await?;

    if column_exists(pool, ATTRIBUTION_TABLE, "events").await? {
        sqlx::query("ALTER TABLE attribution_records DROP COLUMN events")
            .execute(pool)
            .await?;
        info!("  Dropped events column");
    }

    delete_setting(pool, EVENTS_MIGRATED_AT_KEY).await?;

    sqlx::query("DELETE FROM schema_version WHERE version >= 1")
        .execute(pool)
        .await?;

    info!("Rollback of migration v1 completed");
    Ok(())
}

/// Create a timestamped full copy of the attribution table
///
/// The previous backup (if any) is replaced; the new table name is recorded
/// in settings so a later restore or `restore`-policy rollback can find it.
pub async fn backup_attribution_table(pool: &SqlitePool) -> Result<String, MigrationError> {
    // Replace any previous backup
    if let Some(old) = read_setting(pool, BACKUP_TABLE_KEY).await? {
        if table_exists(pool, &old).await? {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", old))
                .execute(pool)
                .await
                .map_err(MigrationError::Backup)?;
        }
    }

    let backup_table = format!(
        "attribution_records_backup_{}",
        time::now().format("%Y%m%d%H%M%S")
    );

    sqlx::query(&format!(
        "CREATE TABLE {} AS SELECT * FROM attribution_records",
        backup_table
    ))
    .execute(pool)
    .await
    .map_err(MigrationError::Backup)?;

    write_setting(pool, BACKUP_TABLE_KEY, &backup_table).await?;

    info!("  Backed up attribution_records to {}", backup_table);
    Ok(backup_table)
}

/// Replace the live attribution table with the backup copy
///
/// Used for catastrophic `up` failures and for the explicit `restore`
/// rollback policy - never on the default rollback path. The backup table
/// is consumed by the rename; uniqueness of `click_id` is re-established
/// via an index (a table created by `CREATE TABLE AS SELECT` carries no
/// primary key).
pub async fn restore_from_backup(
    pool: &SqlitePool,
    backup_table: &str,
) -> Result<(), MigrationError> {
    sqlx::query("DROP TABLE IF EXISTS attribution_records")
        .execute(pool)
        .await
        .map_err(|e| MigrationError::Restore {
            table: backup_table.to_string(),
            source: e,
        })?;

    sqlx::query(&format!(
        "ALTER TABLE {} RENAME TO attribution_records",
        backup_table
    ))
    .execute(pool)
    .await
    .map_err(|e| MigrationError::Restore {
        table: backup_table.to_string(),
        source: e,
    })?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_attribution_click_id \
         ON attribution_records(click_id)",
    )
    .execute(pool)
    .await
    .map_err(|e| MigrationError::Restore {
        table: backup_table.to_string(),
        source: e,
    })?;

    delete_setting(pool, BACKUP_TABLE_KEY).await?;

    Ok(())
}

async fn mark_events_migrated(pool: &SqlitePool) -> Result<(), MigrationError> {
    write_setting(pool, EVENTS_MIGRATED_AT_KEY, &time::timestamp_now()).await
}

async fn read_down_policy(pool: &SqlitePool) -> Result<DownPolicy, MigrationError> {
    match read_setting(pool, DOWN_RESTORE_POLICY_KEY).await?.as_deref() {
        Some("restore") => Ok(DownPolicy::Restore),
        Some("preserve") | None => Ok(DownPolicy::Preserve),
        Some(other) => {
            warn!(
                "Unknown {} value '{}', defaulting to preserve",
                DOWN_RESTORE_POLICY_KEY, other
            );
            Ok(DownPolicy::Preserve)
        }
    }
}

// ----------------------------------------------------------------------
// Existence checks and settings helpers
// ----------------------------------------------------------------------

async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool, MigrationError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn column_exists(
    pool: &SqlitePool,
    table: &str,
    column: &str,
) -> Result<bool, MigrationError> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?",
        table
    ))
    .bind(column)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

async fn index_exists(pool: &SqlitePool, name: &str) -> Result<bool, MigrationError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='index' AND name = ?)",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn read_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>, MigrationError> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

async fn write_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<(), MigrationError> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = NULL",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

async fn delete_setting(pool: &SqlitePool, key: &str) -> Result<(), MigrationError> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, \
             applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT NOT NULL, expires_at TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    /// Attribution table as an early release created it: no events column,
    /// no date_updated index
    async fn create_legacy_attribution_table(pool: &SqlitePool) {
        sqlx::query(
            r#"
            CREATE TABLE attribution_records (
                click_id TEXT PRIMARY KEY,
                utm_source TEXT,
                utm_medium TEXT,
                utm_campaign TEXT,
                utm_term TEXT,
                utm_content TEXT,
                qualified INTEGER NOT NULL DEFAULT 0,
                score INTEGER NOT NULL DEFAULT 0,
                date_created TEXT NOT NULL,
                date_updated TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_legacy_row(pool: &SqlitePool, click_id: &str) {
        sqlx::query(
            "INSERT INTO attribution_records \
             (click_id, utm_source, date_created, date_updated) \
             VALUES (?, 'google', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
        )
        .bind(click_id)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn events_column_present(pool: &SqlitePool) -> bool {
        column_exists(pool, ATTRIBUTION_TABLE, "events").await.unwrap()
    }

    async fn date_updated_index_present(pool: &SqlitePool) -> bool {
        index_exists(pool, DATE_UPDATED_INDEX).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_schema_version_no_rows() {
        let pool = setup_test_db().await;
        assert_eq!(get_schema_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get_schema_version() {
        let pool = setup_test_db().await;
        set_schema_version(&pool, 1).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_migrate_v1_no_table() {
        let pool = setup_test_db().await;
        // Should succeed even if attribution_records doesn't exist
        migrate_v1_events(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_migrate_v1_adds_column_and_index() {
        let pool = setup_test_db().await;
        create_legacy_attribution_table(&pool).await;
        insert_legacy_row(&pool, "click-1").await;

        run_migrations(&pool).await.unwrap();

        assert!(events_column_present(&pool).await);
        assert!(date_updated_index_present(&pool).await);
        assert_eq!(get_schema_version(&pool).await.unwrap(), 1);

        // Existing rows get the empty array default
        let events: String =
            sqlx::query_scalar("SELECT events FROM attribution_records WHERE click_id = 'click-1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(events, "[]");

        // Backup was taken before structural work
        let backup = read_setting(&pool, BACKUP_TABLE_KEY).await.unwrap();
        assert!(backup.is_some());
        assert!(table_exists(&pool, &backup.unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_v1_idempotent() {
        let pool = setup_test_db().await;
        create_legacy_attribution_table(&pool).await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let column_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('attribution_records') WHERE name = 'events'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(column_count, 1);
    }

    #[tokio::test]
    async fn test_migrate_v1_normalizes_legacy_text() {
        let pool = setup_test_db().await;
        create_legacy_attribution_table(&pool).await;

        // Legacy release: column exists but holds serialized non-JSON text
        sqlx::query("ALTER TABLE attribution_records ADD COLUMN events TEXT")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO attribution_records (click_id, events, date_created, date_updated) \
             VALUES ('click-1', 'a:1:{i:0;s:5:\"event\";}', '2026-01-01T00:00:00.000Z', \
             '2026-01-01T00:00:00.000Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();

        let events: String =
            sqlx::query_scalar("SELECT events FROM attribution_records WHERE click_id = 'click-1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(events, "[]");
    }

    #[tokio::test]
    async fn test_down_preserves_webhook_writes() {
        let pool = setup_test_db().await;
        create_legacy_attribution_table(&pool).await;
        insert_legacy_row(&pool, "click-1").await;

        run_migrations(&pool).await.unwrap();

        // Scoring webhook writes after the upgrade ran
        sqlx::query(
            "UPDATE attribution_records SET qualified = 1, score = 80 WHERE click_id = 'click-1'",
        )
        .execute(&pool)
        .await
        .unwrap();

        migrate_down(&pool).await.unwrap();

        // Column and index are gone
        assert!(!events_column_present(&pool).await);
        assert!(!date_updated_index_present(&pool).await);
        assert_eq!(get_schema_version(&pool).await.unwrap(), 0);

        // Webhook writes survive: values are as of just before down, not as
        // of the pre-up backup
        let (qualified, score): (i64, i64) = sqlx::query_as(
            "SELECT qualified, score FROM attribution_records WHERE click_id = 'click-1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(qualified, 1);
        assert_eq!(score, 80);
    }

    #[tokio::test]
    async fn test_down_with_restore_policy_swaps_from_backup() {
        let pool = setup_test_db().await;
        create_legacy_attribution_table(&pool).await;
        insert_legacy_row(&pool, "click-1").await;

        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "UPDATE attribution_records SET qualified = 1, score = 80 WHERE click_id = 'click-1'",
        )
        .execute(&pool)
        .await
        .unwrap();

        write_setting(&pool, DOWN_RESTORE_POLICY_KEY, "restore")
            .await
            .unwrap();

        migrate_down(&pool).await.unwrap();

        // Full swap: webhook writes made after the backup are gone
        let (qualified, score): (i64, i64) = sqlx::query_as(
            "SELECT qualified, score FROM attribution_records WHERE click_id = 'click-1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(qualified, 0);
        assert_eq!(score, 0);
        assert!(!events_column_present(&pool).await);
    }

    #[tokio::test]
    async fn test_down_then_up_cycle() {
        let pool = setup_test_db().await;
        create_legacy_attribution_table(&pool).await;
        insert_legacy_row(&pool, "click-1").await;

        run_migrations(&pool).await.unwrap();
        migrate_down(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert!(events_column_present(&pool).await);
        assert!(date_updated_index_present(&pool).await);
        assert_eq!(get_schema_version(&pool).await.unwrap(), 1);
    }
}
