//! HTTP API handlers for ltrk-ts

pub mod activity;
pub mod admin;
pub mod auth;
pub mod forms;
pub mod health;
pub mod leads;
pub mod mail;
pub mod settings;
pub mod sse;
pub mod track;

pub use activity::list_activity;
pub use admin::{migrate_down, migrate_up};
pub use auth::auth_middleware;
pub use forms::intake_form;
pub use health::health_routes;
pub use leads::{cleanup_test_data, recent_leads, update_lead_score};
pub use mail::filter_mail;
pub use settings::{get_bcc_settings, put_bcc_settings};
pub use sse::event_stream;
pub use track::track_event;
