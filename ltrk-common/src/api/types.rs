//! Shared API request/response types
//!
//! Every LTRK endpoint responds with the same JSON envelope:
//! `{"success": bool, "data": {...}}`. Expected failures (validation,
//! missing records, bad auth) are reported inside the envelope rather than
//! surfaced as unstructured errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Uniform API response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the requested operation succeeded
    pub success: bool,
    /// Operation payload, or `{"error": ...}` details on failure
    pub data: Value,
}

impl Envelope {
    /// Successful response with payload
    pub fn ok(data: Value) -> Self {
        Self { success: true, data }
    }

    /// Failure envelope with an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: json!({ "error": message.into() }),
        }
    }

    /// Failure envelope with an error message and extra details
    pub fn error_with_details(message: impl Into<String>, details: Value) -> Self {
        Self {
            success: false,
            data: json!({ "error": message.into(), "details": details }),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
