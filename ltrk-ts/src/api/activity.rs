//! Update-activity audit log endpoint

use axum::extract::State;
use ltrk_common::api::Envelope;
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// GET /api/activity
///
/// Retained audit entries, newest first.
pub async fn list_activity(State(state): State<AppState>) -> Envelope {
    match state.activity.recent().await {
        Ok(entries) => Envelope::ok(json!({ "activity": entries })),
        Err(e) => {
            warn!("Activity listing failed: {}", e);
            Envelope::error("activity listing temporarily unavailable")
        }
    }
}
