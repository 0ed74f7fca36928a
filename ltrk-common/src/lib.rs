//! # LTRK Common Library
//!
//! Shared code for the LTRK (Lead Tracker) services including:
//! - Database initialization, schema and migrations
//! - Data models (attribution records, update activity, settings)
//! - Data-layer event types (DataLayerEvent enum) and EventBus
//! - API envelope/auth types
//! - Configuration loading
//! - Timestamp utilities

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
