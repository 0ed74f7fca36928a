//! ltrk-ts library - Tracking Service module
//!
//! Captures form submissions and on-site interactions into the attribution
//! store, pushes data-layer events for the tag-management consumer, and
//! filters outgoing mail parameters (conditional BCC with rate limiting).

use axum::Router;
use ltrk_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod api;
pub mod forms;
pub mod mail;
pub mod ratelimit;
pub mod store;

use ratelimit::RateLimiter;
use store::{ActivityLog, AttributionStore, KvStore};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Data-layer event bus feeding the SSE stream
    pub bus: Arc<EventBus>,
    /// Shared secret for API authentication (0 disables auth)
    pub shared_secret: i64,
    /// Attribution record store
    pub attribution: AttributionStore,
    /// Key/value settings store with TTL support
    pub kv: KvStore,
    /// Update-activity audit log
    pub activity: ActivityLog,
    /// Hour-window rate limiter
    pub limiter: RateLimiter,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, shared_secret: i64, bus: Arc<EventBus>) -> Self {
        let kv = KvStore::new(db.clone());
        Self {
            attribution: AttributionStore::new(db.clone()),
            activity: ActivityLog::new(db.clone()),
            limiter: RateLimiter::new(kv.clone()),
            kv,
            db,
            bus,
            shared_secret,
        }
    }
}

/// Build application router
///
/// Protected endpoints require the timestamp+hash request token; the health
/// endpoint and the data-layer SSE stream are public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/track", post(api::track_event))
        .route("/api/forms/:framework", post(api::intake_form))
        .route("/api/leads/:click_id/score", post(api::update_lead_score))
        .route("/api/leads/recent", get(api::recent_leads))
        .route(
            "/api/settings/bcc",
            get(api::get_bcc_settings).put(api::put_bcc_settings),
        )
        .route("/api/mail/filter", post(api::filter_mail))
        .route("/api/activity", get(api::list_activity))
        .route("/api/testdata/cleanup", post(api::cleanup_test_data))
        .route("/api/admin/migrate/up", post(api::migrate_up))
        .route("/api/admin/migrate/down", post(api::migrate_down))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
