//! Database models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum retained events per attribution record; oldest dropped first
pub const EVENT_FIFO_CAP: i64 = 100;

/// Maximum retained update-activity audit entries
pub const ACTIVITY_LOG_CAP: i64 = 5;

/// One tracked interaction inside an attribution record's events array
///
/// `event` and `timestamp` are the only interpreted keys; anything else
/// (e.g. `test_event` markers) is carried opaquely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEntry {
    pub event: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventEntry {
    pub fn new(event: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            timestamp: timestamp.into(),
            extra: Map::new(),
        }
    }
}

/// One row of the attribution store, keyed by the opaque click identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub click_id: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    /// Tracked events, newest last, FIFO-capped at [`EVENT_FIFO_CAP`]
    pub events: Vec<EventEntry>,
    /// Business qualification flag, owned by the external scoring webhook
    pub qualified: bool,
    /// Business lead score, owned by the external scoring webhook
    pub score: i64,
    pub date_created: String,
    pub date_updated: String,
}

/// Attribution parameters captured when a click identifier is first observed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAttribution {
    pub click_id: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

/// One update-activity audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateActivity {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub status: String,
    pub version_from: Option<String>,
    pub version_to: Option<String>,
    pub details: Option<String>,
    pub user_id: Option<String>,
}
