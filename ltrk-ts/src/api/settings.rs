//! Blind-copy configuration endpoints

use axum::extract::State;
use axum::Json;
use ltrk_common::api::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::mail::{is_valid_email, BccConfig, EmailCategory, RateLimitAction};
use crate::AppState;

/// Wire shape of the BCC configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct BccSettingsBody {
    pub enabled: bool,
    pub bcc_email: String,
    pub selected_email_types: Vec<String>,
    pub rate_limit_threshold: i64,
    pub rate_limit_action: String,
}

/// GET /api/settings/bcc
pub async fn get_bcc_settings(State(state): State<AppState>) -> Envelope {
    let config = BccConfig::load(&state.kv).await;

    Envelope::ok(json!({
        "bcc": BccSettingsBody {
            enabled: config.enabled,
            bcc_email: config.bcc_email,
            selected_email_types: config
                .selected_email_types
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            rate_limit_threshold: config.rate_limit_threshold,
            rate_limit_action: config.rate_limit_action.as_str().to_string(),
        }
    }))
}

/// PUT /api/settings/bcc
///
/// Validates and persists the BCC configuration. Validation failures come
/// back as structured failure envelopes naming the offending field.
pub async fn put_bcc_settings(
    State(state): State<AppState>,
    Json(body): Json<BccSettingsBody>,
) -> Envelope {
    if body.enabled && !is_valid_email(&body.bcc_email) {
        return Envelope::error_with_details(
            "bcc_email is not a valid address",
            json!({ "field": "bcc_email" }),
        );
    }

    let mut selected = Vec::with_capacity(body.selected_email_types.len());
    for name in &body.selected_email_types {
        match EmailCategory::parse(name) {
            Some(category) => selected.push(category),
            None => {
                return Envelope::error_with_details(
                    format!("unknown email category: {}", name),
                    json!({ "field": "selected_email_types" }),
                );
            }
        }
    }

    let Some(action) = RateLimitAction::parse(&body.rate_limit_action) else {
        return Envelope::error_with_details(
            format!("unknown rate limit action: {}", body.rate_limit_action),
            json!({ "field": "rate_limit_action" }),
        );
    };

    let config = BccConfig {
        enabled: body.enabled,
        bcc_email: body.bcc_email.trim().to_string(),
        selected_email_types: selected,
        rate_limit_threshold: body.rate_limit_threshold,
        rate_limit_action: action,
    };

    match config.store(&state.kv).await {
        Ok(()) => Envelope::ok(json!({ "saved": true })),
        Err(e) => {
            warn!("Failed to store BCC settings: {}", e);
            Envelope::error("settings storage temporarily unavailable")
        }
    }
}
