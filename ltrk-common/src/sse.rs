//! Server-Sent Events (SSE) utilities
//!
//! The data-layer queue consumed by the tag-management script is exposed as
//! an SSE stream: each bus event becomes one SSE message whose event name is
//! the data-layer discriminator and whose data is the serialized JSON object.

use crate::events::EventBus;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Create an SSE stream fed from the data-layer event bus
///
/// Sends an initial connection marker, then every bus event as it arrives,
/// with heartbeats during idle periods. A lagged subscriber skips the missed
/// events and keeps streaming; event delivery is best-effort by design.
pub fn create_event_sse_stream(
    bus: Arc<EventBus>,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} data-layer events", service_name);

    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            let next = tokio::select! {
                recv = rx.recv() => match recv {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => Some(
                            Event::default()
                                .event(event.event_type().to_string())
                                .data(json),
                        ),
                        Err(e) => {
                            warn!("SSE: Failed to serialize data-layer event: {}", e);
                            None
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE: {} subscriber lagged, skipped {} events", service_name, skipped);
                        None
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    Some(Event::default().comment("heartbeat"))
                }
            };

            if let Some(event) = next {
                yield Ok(event);
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
