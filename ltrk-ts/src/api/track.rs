//! Click-event tracking endpoint

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use ltrk_common::api::Envelope;
use ltrk_common::db::models::EventEntry;
use ltrk_common::events::DataLayerEvent;
use ltrk_common::time;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::AppState;

/// POST /api/track request body
///
/// Extra keys beyond the two required fields are carried into the stored
/// event entry opaquely (e.g. `test_event` markers from automated checks).
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub click_id: String,
    pub event_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// POST /api/track
///
/// Appends one event to the attribution record for `click_id` and pushes a
/// matching data-layer event. A click identifier the store has never seen is
/// reported as `tracked: false` inside a success envelope - tracking is
/// fire-and-forget and must not fail the action that triggered it.
pub async fn track_event(
    State(state): State<AppState>,
    Json(request): Json<TrackRequest>,
) -> Envelope {
    if request.click_id.trim().is_empty() || request.event_type.trim().is_empty() {
        return Envelope::error("click_id and event_type are required");
    }

    let mut extra = request.extra;
    // Auth token fields ride in the same body; they are not event payload
    extra.remove("timestamp");
    extra.remove("hash");

    let entry = EventEntry {
        event: request.event_type.clone(),
        timestamp: time::timestamp_now(),
        extra,
    };

    match state.attribution.append_event(&request.click_id, &entry).await {
        Ok(tracked) => {
            if tracked {
                state.bus.emit_lossy(DataLayerEvent::ClickEvent {
                    event_id: Uuid::new_v4(),
                    click_id: request.click_id,
                    event_type: request.event_type,
                    timestamp: Utc::now(),
                });
            }
            Envelope::ok(json!({ "tracked": tracked }))
        }
        Err(e) => {
            warn!("Event append failed: {}", e);
            Envelope::error("tracking temporarily unavailable")
        }
    }
}
