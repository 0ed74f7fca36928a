//! Form submission intake endpoint

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use ltrk_common::api::Envelope;
use ltrk_common::db::models::{EventEntry, NewAttribution};
use ltrk_common::events::DataLayerEvent;
use ltrk_common::time;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::forms::{FormFramework, FrameworkRegistry};
use crate::AppState;

/// POST /api/forms/{framework} request body
///
/// `payload` is the framework-native submission record, passed through
/// verbatim by the site glue; correlation and attribution fields ride at
/// the top level.
#[derive(Debug, Deserialize)]
pub struct FormIntakeRequest {
    #[serde(default)]
    pub click_id: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_term: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// POST /api/forms/{framework}
///
/// Extracts contact fields from the submission payload, records the
/// interaction against the attribution record (when a click identifier is
/// present) and pushes a `form_submission` data-layer event. Store failures
/// are logged and reported as `tracked: false`; the submission response
/// itself never fails for them.
pub async fn intake_form(
    State(state): State<AppState>,
    Path(framework): Path<String>,
    Json(request): Json<FormIntakeRequest>,
) -> Envelope {
    let Some(framework) = FormFramework::from_slug(&framework) else {
        return Envelope::error(format!("unknown form framework: {}", framework));
    };

    if !tracking_enabled(&state).await {
        return Envelope::ok(json!({ "tracked": false, "reason": "tracking_disabled" }));
    }

    let registry = framework_registry(&state).await;
    if !registry.is_registered(framework) {
        return Envelope::error(format!(
            "form framework not registered: {}",
            framework.slug()
        ));
    }

    let fields = framework.extract_contact_fields(&request.payload);

    let click_id = request
        .click_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let mut tracked = false;
    if let Some(ref click_id) = click_id {
        let attribution = NewAttribution {
            click_id: click_id.clone(),
            utm_source: request.utm_source.clone(),
            utm_medium: request.utm_medium.clone(),
            utm_campaign: request.utm_campaign.clone(),
            utm_term: request.utm_term.clone(),
            utm_content: request.utm_content.clone(),
        };

        match record_submission(&state, &attribution, framework, &fields.form_id).await {
            Ok(appended) => tracked = appended,
            Err(e) => warn!("Form submission tracking failed: {}", e),
        }
    }

    state.bus.emit_lossy(DataLayerEvent::FormSubmission {
        event_id: Uuid::new_v4(),
        framework: framework.slug().to_string(),
        form_id: fields.form_id.clone(),
        form_name: fields.form_name.clone(),
        email: fields.email.clone(),
        phone: fields.phone.clone(),
        click_id: click_id.clone(),
        timestamp: Utc::now(),
    });

    Envelope::ok(json!({
        "tracked": tracked,
        "email_found": fields.email.is_some(),
        "phone_found": fields.phone.is_some(),
        "form_id": fields.form_id,
    }))
}

async fn record_submission(
    state: &AppState,
    attribution: &NewAttribution,
    framework: FormFramework,
    form_id: &Option<String>,
) -> ltrk_common::Result<bool> {
    state.attribution.upsert(attribution).await?;

    let mut entry = EventEntry::new("form_submission", time::timestamp_now());
    entry
        .extra
        .insert("framework".to_string(), json!(framework.slug()));
    if let Some(form_id) = form_id {
        entry.extra.insert("form_id".to_string(), json!(form_id));
    }

    state
        .attribution
        .append_event(&attribution.click_id, &entry)
        .await
}

async fn tracking_enabled(state: &AppState) -> bool {
    match state.kv.get("tracking_enabled").await {
        Ok(Some(value)) => value != "0",
        Ok(None) => true,
        Err(e) => {
            warn!("Failed to read tracking_enabled, assuming enabled: {}", e);
            true
        }
    }
}

async fn framework_registry(state: &AppState) -> FrameworkRegistry {
    match state.kv.get("tracking_frameworks").await {
        Ok(Some(csv)) => FrameworkRegistry::from_csv(&csv),
        Ok(None) => FrameworkRegistry::from_csv(""),
        Err(e) => {
            warn!("Failed to read tracking_frameworks, enabling all: {}", e);
            FrameworkRegistry::from_csv("")
        }
    }
}
