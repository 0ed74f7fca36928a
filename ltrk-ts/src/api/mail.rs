//! Outgoing-mail filter endpoint

use axum::extract::State;
use axum::Json;
use ltrk_common::api::Envelope;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::mail::{apply_bcc, classify, BccConfig, MailParams};
use crate::AppState;

/// POST /api/mail/filter request body (mail parameters at top level)
#[derive(Debug, Deserialize)]
pub struct MailFilterRequest {
    #[serde(flatten)]
    pub mail: MailParams,
}

/// POST /api/mail/filter
///
/// The pre-send mutation point for outgoing site mail: classifies the mail
/// and applies the blind-copy policy. The returned parameters equal the
/// input in every field except `headers`, which gains at most one `Bcc:`
/// line; every internal failure degrades to an unchanged pass-through.
pub async fn filter_mail(
    State(state): State<AppState>,
    Json(request): Json<MailFilterRequest>,
) -> Envelope {
    let config = BccConfig::load(&state.kv).await;

    let admin_email = match state.kv.get("admin_email").await {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read admin_email: {}", e);
            String::new()
        }
    };

    let category = classify(&request.mail, &admin_email);

    let (mail, bcc_added) =
        apply_bcc(&request.mail, &config, &state.limiter, &state.kv, category).await;

    Envelope::ok(json!({
        "mail": mail,
        "category": category.as_str(),
        "bcc_added": bcc_added,
    }))
}
