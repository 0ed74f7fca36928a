//! Data-layer SSE endpoint

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /api/events
///
/// Streams data-layer events to the tag-management consumer.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ltrk_common::sse::create_event_sse_stream(state.bus.clone(), "ltrk-ts")
}
