//! Data-layer event types for the LTRK event system
//!
//! Provides the shared event definitions and EventBus used by the tracking
//! service. Events are broadcast via EventBus and serialized for SSE
//! transmission to the tag-management consumer, which reads them off the
//! stream as plain JSON objects tagged by `event`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events pushed into the browser-side data layer
///
/// Every variant serializes to the JSON object shape the tag-management
/// script consumes: an `event` discriminator plus flat payload fields.
/// Emitting an event must never block or fail the request that produced it;
/// senders use [`EventBus::emit_lossy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DataLayerEvent {
    /// A form submission was captured from one of the registered
    /// form frameworks
    #[serde(rename = "form_submission")]
    FormSubmission {
        /// Correlation id for this push
        event_id: Uuid,
        /// Framework slug the submission came from (e.g. "cf7")
        framework: String,
        /// Framework-native form identifier, if the payload carried one
        form_id: Option<String>,
        /// Human-readable form name, if the payload carried one
        form_name: Option<String>,
        /// Extracted contact email
        email: Option<String>,
        /// Extracted contact phone
        phone: Option<String>,
        /// Click identifier the submission was correlated to, if any
        click_id: Option<String>,
        /// When the submission was captured
        timestamp: DateTime<Utc>,
    },

    /// A tracked on-site interaction was appended to an attribution record
    #[serde(rename = "click_event")]
    ClickEvent {
        /// Correlation id for this push
        event_id: Uuid,
        /// Click identifier the interaction belongs to
        click_id: String,
        /// Free-form interaction type (e.g. "phone_click", "form_view")
        event_type: String,
        /// When the interaction was captured
        timestamp: DateTime<Utc>,
    },
}

impl DataLayerEvent {
    /// Event discriminator as transmitted in the `event` field
    pub fn event_type(&self) -> &str {
        match self {
            DataLayerEvent::FormSubmission { .. } => "form_submission",
            DataLayerEvent::ClickEvent { .. } => "click_event",
        }
    }
}

/// Broadcast bus distributing data-layer events to all subscribers
pub struct EventBus {
    tx: broadcast::Sender<DataLayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DataLayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DataLayerEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<DataLayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring delivery failure
    ///
    /// Tracking pushes are fire-and-forget: a missing consumer must never
    /// block or fail the user-facing action that produced the event.
    pub fn emit_lossy(&self, event: DataLayerEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("No data-layer subscribers; event dropped");
        }
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
