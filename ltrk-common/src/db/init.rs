//! Database initialization
//!
//! Creates the database on first run and upgrades existing databases in
//! place. Initialization runs in three phases:
//! 1. `CREATE TABLE IF NOT EXISTS` bootstrap (new databases get the full
//!    current schema)
//! 2. Versioned migrations (databases created by older releases are
//!    upgraded without data loss, see `migrations`)
//! 3. Default settings seeding (`INSERT OR IGNORE`, never overwrites
//!    operator changes)

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; tracking writes arrive
    // from parallel request handlers
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    crate::db::migrations::run_migrations(&pool).await?;

    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent, safe to call multiple times)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_attribution_table(pool).await?;
    create_update_activity_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Key/value settings with optional expiry
///
/// Durable configuration (BCC config, feature toggles, shared API secret)
/// has `expires_at` NULL; transient entries (rate-limit window counters,
/// pause markers) carry an expiry timestamp and are lazily purged on read.
async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_attribution_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attribution_records (
            click_id TEXT PRIMARY KEY,
            utm_source TEXT,
            utm_medium TEXT,
            utm_campaign TEXT,
            utm_term TEXT,
            utm_content TEXT,
            events TEXT NOT NULL DEFAULT '[]',
            qualified INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            date_created TEXT NOT NULL,
            date_updated TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Supports "most recently active" queries
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_attribution_date_updated \
         ON attribution_records(date_updated)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_update_activity_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS update_activity (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            action TEXT NOT NULL,
            status TEXT NOT NULL,
            version_from TEXT,
            version_to TEXT,
            details TEXT,
            user_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed default settings (never overwrites existing values)
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    let defaults: &[(&str, &str)] = &[
        ("tracking_enabled", "1"),
        ("tracking_frameworks", "cf7,gravity,ninja,elementor,avada"),
        ("admin_email", ""),
        ("bcc_enabled", "0"),
        ("bcc_email", ""),
        ("bcc_email_types", "form_submission"),
        ("bcc_rate_limit_threshold", "0"),
        ("bcc_rate_limit_action", "log_only"),
        ("migration_down_restore", "preserve"),
    ];

    for (key, value) in defaults {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }

    Ok(())
}
