//! Lead record endpoints: scoring webhook, recent-activity listing,
//! test-data cleanup

use axum::extract::{Path, Query, State};
use axum::Json;
use ltrk_common::api::Envelope;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// POST /api/leads/{click_id}/score request body
#[derive(Debug, Deserialize)]
pub struct ScoreUpdateRequest {
    pub qualified: bool,
    pub score: i64,
}

/// POST /api/leads/{click_id}/score
///
/// Write point for the external scoring webhook: sets the business fields
/// on an existing attribution record. These fields are owned by the caller;
/// nothing else in the service mutates them.
pub async fn update_lead_score(
    State(state): State<AppState>,
    Path(click_id): Path<String>,
    Json(request): Json<ScoreUpdateRequest>,
) -> Envelope {
    match state
        .attribution
        .update_score(&click_id, request.qualified, request.score)
        .await
    {
        Ok(true) => Envelope::ok(json!({ "updated": true })),
        Ok(false) => Envelope::error(format!("no attribution record for click_id: {}", click_id)),
        Err(e) => {
            warn!("Score update failed: {}", e);
            Envelope::error("score update temporarily unavailable")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// GET /api/leads/recent
///
/// Most recently active attribution records, newest first.
pub async fn recent_leads(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Envelope {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    match state.attribution.recent(limit).await {
        Ok(leads) => Envelope::ok(json!({ "leads": leads })),
        Err(e) => {
            warn!("Recent leads query failed: {}", e);
            Envelope::error("lead listing temporarily unavailable")
        }
    }
}

/// POST /api/testdata/cleanup
///
/// Bulk delete of attribution records flagged with a `test_event` marker.
pub async fn cleanup_test_data(State(state): State<AppState>) -> Envelope {
    match state.attribution.delete_test_records().await {
        Ok(removed) => Envelope::ok(json!({ "removed": removed })),
        Err(e) => {
            warn!("Test-data cleanup failed: {}", e);
            Envelope::error("cleanup temporarily unavailable")
        }
    }
}
