//! Administrative schema migration endpoints
//!
//! Operator access to the migration state machine. Every run is recorded in
//! the update-activity audit log with the schema versions it moved between.

use axum::extract::State;
use ltrk_common::api::Envelope;
use ltrk_common::db::migrations;
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// POST /api/admin/migrate/up
pub async fn migrate_up(State(state): State<AppState>) -> Envelope {
    let from = match migrations::get_schema_version(&state.db).await {
        Ok(version) => version,
        Err(e) => {
            warn!("Failed to read schema version: {}", e);
            return Envelope::error("schema version unavailable");
        }
    };

    match migrations::run_migrations(&state.db).await {
        Ok(()) => {
            let to = migrations::get_schema_version(&state.db).await.unwrap_or(from);
            record_activity(&state, "migrate_up", "success", from, to, None).await;
            Envelope::ok(json!({ "version": to }))
        }
        Err(e) => {
            let message = e.to_string();
            record_activity(&state, "migrate_up", "failed", from, from, Some(&message)).await;
            Envelope::error(message)
        }
    }
}

/// POST /api/admin/migrate/down
pub async fn migrate_down(State(state): State<AppState>) -> Envelope {
    let from = match migrations::get_schema_version(&state.db).await {
        Ok(version) => version,
        Err(e) => {
            warn!("Failed to read schema version: {}", e);
            return Envelope::error("schema version unavailable");
        }
    };

    match migrations::migrate_down(&state.db).await {
        Ok(()) => {
            let to = migrations::get_schema_version(&state.db).await.unwrap_or(0);
            record_activity(&state, "migrate_down", "success", from, to, None).await;
            Envelope::ok(json!({ "version": to }))
        }
        Err(e) => {
            let message = e.to_string();
            record_activity(&state, "migrate_down", "failed", from, from, Some(&message)).await;
            Envelope::error(message)
        }
    }
}

async fn record_activity(
    state: &AppState,
    action: &str,
    status: &str,
    from: i32,
    to: i32,
    details: Option<&str>,
) {
    // Audit logging is best-effort; a full log must not mask the migration
    // outcome
    if let Err(e) = state
        .activity
        .record(
            action,
            status,
            Some(&from.to_string()),
            Some(&to.to_string()),
            details,
            None,
        )
        .await
    {
        warn!("Failed to record update activity: {}", e);
    }
}
