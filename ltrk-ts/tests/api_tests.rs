//! Integration tests for ltrk-ts API endpoints
//!
//! Tests cover:
//! - Health endpoint (no auth required)
//! - Click-event tracking (non-fatal unknown click ids)
//! - Form submission intake and framework registry
//! - Scoring webhook and recent-leads listing
//! - BCC settings validation and the mail filter with rate limiting
//! - Update-activity audit log via the admin migration endpoints
//! - Authentication middleware (timestamp + hash token)

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use ltrk_common::events::EventBus;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method

use ltrk_ts::{build_router, AppState};

/// Test helper: fresh in-memory database with the full schema
async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("should open in-memory database");

    ltrk_common::db::create_schema(&pool).await.unwrap();
    ltrk_common::db::migrations::run_migrations(&pool)
        .await
        .unwrap();
    ltrk_common::db::init_default_settings(&pool).await.unwrap();

    pool
}

/// Test helper: create app with test state (auth disabled)
fn setup_app(db: SqlitePool) -> axum::Router {
    let state = AppState::new(db, 0, Arc::new(EventBus::new(100)));
    build_router(state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("should read body");
    serde_json::from_slice(&bytes).expect("should parse JSON")
}

fn cf7_intake(click_id: &str) -> Value {
    json!({
        "click_id": click_id,
        "utm_source": "google",
        "utm_campaign": "spring",
        "payload": {
            "form_id": 7,
            "title": "Contact us",
            "posted_data": {
                "your-email": "visitor@example.com",
                "tel-101": "07700 900123"
            }
        }
    })
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = setup_app(setup_test_db().await);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ltrk-ts");
    assert!(body["version"].is_string());
}

// =============================================================================
// Click-event tracking
// =============================================================================

#[tokio::test]
async fn test_track_unknown_click_is_nonfatal() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/track",
            json!({ "click_id": "never-seen", "event_type": "phone_click" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["tracked"], false);
}

#[tokio::test]
async fn test_track_requires_click_id_and_event_type() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/track",
            json!({ "click_id": "", "event_type": "phone_click" }),
        ))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_track_appends_to_existing_record() {
    let app = setup_app(setup_test_db().await);

    // Create the record via a form intake
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/forms/cf7", cf7_intake("click-1")))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["tracked"], true);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/track",
            json!({ "click_id": "click-1", "event_type": "phone_click" }),
        ))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["data"]["tracked"], true);

    // Both events visible on the record, in arrival order
    let response = app
        .oneshot(get_request("/api/leads/recent?limit=5"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    let lead = &body["data"]["leads"][0];
    assert_eq!(lead["click_id"], "click-1");
    assert_eq!(lead["utm_source"], "google");
    assert_eq!(lead["events"][0]["event"], "form_submission");
    assert_eq!(lead["events"][1]["event"], "phone_click");
}

// =============================================================================
// Form intake
// =============================================================================

#[tokio::test]
async fn test_form_intake_reports_extracted_fields() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .oneshot(json_request("POST", "/api/forms/cf7", cf7_intake("click-9")))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["email_found"], true);
    assert_eq!(body["data"]["phone_found"], true);
    assert_eq!(body["data"]["form_id"], "7");
}

#[tokio::test]
async fn test_form_intake_unknown_framework() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/forms/jetpack",
            json!({ "payload": {} }),
        ))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_form_intake_unregistered_framework() {
    let db = setup_test_db().await;
    sqlx::query("UPDATE settings SET value = 'cf7' WHERE key = 'tracking_frameworks'")
        .execute(&db)
        .await
        .unwrap();
    let app = setup_app(db);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/forms/gravity",
            json!({ "payload": {} }),
        ))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_form_intake_without_click_id_still_succeeds() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/forms/avada",
            json!({ "payload": { "data": { "email": "ada@example.com" } } }),
        ))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["tracked"], false);
    assert_eq!(body["data"]["email_found"], true);
}

// =============================================================================
// Scoring webhook + recent leads
// =============================================================================

#[tokio::test]
async fn test_score_webhook_updates_business_fields() {
    let app = setup_app(setup_test_db().await);

    app.clone()
        .oneshot(json_request("POST", "/api/forms/cf7", cf7_intake("click-2")))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/leads/click-2/score",
            json!({ "qualified": true, "score": 72 }),
        ))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["updated"], true);

    let response = app
        .oneshot(get_request("/api/leads/recent"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    let lead = &body["data"]["leads"][0];
    assert_eq!(lead["qualified"], true);
    assert_eq!(lead["score"], 72);
}

#[tokio::test]
async fn test_score_webhook_unknown_click() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/leads/missing/score",
            json!({ "qualified": true, "score": 10 }),
        ))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], false);
}

// =============================================================================
// BCC settings + mail filter
// =============================================================================

async fn put_bcc_settings(app: &axum::Router, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("PUT", "/api/settings/bcc", body))
        .await
        .unwrap();
    extract_json(response.into_body()).await
}

#[tokio::test]
async fn test_bcc_settings_reject_invalid_email() {
    let app = setup_app(setup_test_db().await);

    let body = put_bcc_settings(
        &app,
        json!({
            "enabled": true,
            "bcc_email": "not-an-address",
            "selected_email_types": ["form_submission"],
            "rate_limit_threshold": 0,
            "rate_limit_action": "log_only"
        }),
    )
    .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["details"]["field"], "bcc_email");
}

#[tokio::test]
async fn test_bcc_settings_reject_unknown_category() {
    let app = setup_app(setup_test_db().await);

    let body = put_bcc_settings(
        &app,
        json!({
            "enabled": true,
            "bcc_email": "testing@example.com",
            "selected_email_types": ["spam"],
            "rate_limit_threshold": 0,
            "rate_limit_action": "log_only"
        }),
    )
    .await;

    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_bcc_settings_round_trip() {
    let app = setup_app(setup_test_db().await);

    let body = put_bcc_settings(
        &app,
        json!({
            "enabled": true,
            "bcc_email": "testing@example.com",
            "selected_email_types": ["form_submission", "admin"],
            "rate_limit_threshold": 10,
            "rate_limit_action": "pause_until_next_period"
        }),
    )
    .await;
    assert_eq!(body["success"], true);

    let response = app
        .oneshot(get_request("/api/settings/bcc"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    let bcc = &body["data"]["bcc"];
    assert_eq!(bcc["enabled"], true);
    assert_eq!(bcc["bcc_email"], "testing@example.com");
    assert_eq!(bcc["rate_limit_threshold"], 10);
    assert_eq!(bcc["rate_limit_action"], "pause_until_next_period");
}

#[tokio::test]
async fn test_mail_filter_threshold_scenario() {
    let app = setup_app(setup_test_db().await);

    let body = put_bcc_settings(
        &app,
        json!({
            "enabled": true,
            "bcc_email": "testing@example.com",
            "selected_email_types": ["form_submission"],
            "rate_limit_threshold": 2,
            "rate_limit_action": "log_only"
        }),
    )
    .await;
    assert_eq!(body["success"], true);

    // Three form-submission mails in one hour window: first two blind-copied,
    // third passes through untouched
    for expect_bcc in [true, true, false] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/mail/filter",
                json!({
                    "to": ["admin@example.com"],
                    "subject": "Contact Form Submission",
                    "message": "A visitor sent a message",
                    "headers": []
                }),
            ))
            .await
            .unwrap();

        let body = extract_json(response.into_body()).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["category"], "form_submission");
        assert_eq!(body["data"]["bcc_added"], json!(expect_bcc));

        let headers = body["data"]["mail"]["headers"].as_array().unwrap();
        let has_bcc = headers
            .iter()
            .any(|h| h.as_str().unwrap_or("").starts_with("Bcc: testing@example.com"));
        assert_eq!(has_bcc, expect_bcc);
    }
}

#[tokio::test]
async fn test_mail_filter_passes_through_when_disabled() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/mail/filter",
            json!({
                "to": ["someone@example.com"],
                "subject": "Random Email Subject",
                "message": "hello",
                "headers": ["Content-Type: text/plain"]
            }),
        ))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["category"], "other");
    assert_eq!(body["data"]["bcc_added"], false);
    assert_eq!(
        body["data"]["mail"]["headers"],
        json!(["Content-Type: text/plain"])
    );
}

// =============================================================================
// Test-data cleanup
// =============================================================================

#[tokio::test]
async fn test_testdata_cleanup_removes_flagged_records() {
    let app = setup_app(setup_test_db().await);

    app.clone()
        .oneshot(json_request("POST", "/api/forms/cf7", cf7_intake("click-real")))
        .await
        .unwrap();
    app.clone()
        .oneshot(json_request("POST", "/api/forms/cf7", cf7_intake("click-test")))
        .await
        .unwrap();
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/track",
            json!({ "click_id": "click-test", "event_type": "form_view", "test_event": true }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/testdata/cleanup", json!({})))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["data"]["removed"], 1);

    let response = app
        .oneshot(get_request("/api/leads/recent"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    let leads = body["data"]["leads"].as_array().unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["click_id"], "click-real");
}

// =============================================================================
// Admin migration + activity log
// =============================================================================

#[tokio::test]
async fn test_admin_migrate_records_activity() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/admin/migrate/up", json!({})))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);

    let response = app.oneshot(get_request("/api/activity")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    let activity = body["data"]["activity"].as_array().unwrap();
    assert_eq!(activity[0]["action"], "migrate_up");
    assert_eq!(activity[0]["status"], "success");
}

#[tokio::test]
async fn test_admin_migrate_down_then_up() {
    let app = setup_app(setup_test_db().await);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/admin/migrate/down", json!({})))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["version"], 0);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/admin/migrate/up", json!({})))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["version"], 1);
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_auth_rejects_request_without_token() {
    let db = setup_test_db().await;
    let state = AppState::new(db, 12345, Arc::new(EventBus::new(100)));
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/track",
            json!({ "click_id": "c", "event_type": "e" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Health stays public
    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_accepts_valid_token() {
    let secret = 12345;
    let db = setup_test_db().await;
    let state = AppState::new(db, secret, Arc::new(EventBus::new(100)));
    let app = build_router(state);

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;

    let mut body = json!({
        "click_id": "never-seen",
        "event_type": "phone_click",
        "timestamp": timestamp,
        "hash": ""
    });
    let hash = ltrk_common::api::auth::calculate_hash(&body, secret);
    body["hash"] = json!(hash);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/track", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_auth_rejects_bad_hash() {
    let db = setup_test_db().await;
    let state = AppState::new(db, 12345, Arc::new(EventBus::new(100)));
    let app = build_router(state);

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/track",
            json!({
                "click_id": "c",
                "event_type": "e",
                "timestamp": timestamp,
                "hash": "deadbeef"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
