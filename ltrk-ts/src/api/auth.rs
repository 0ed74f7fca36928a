//! Authentication middleware for ltrk-ts
//!
//! Every protected request carries the anti-forgery token: a timestamp and
//! a SHA-256 hash over the canonical request content plus the shared
//! secret. Mutating requests put both fields in the JSON body; GET requests
//! pass them as query parameters. Secret 0 disables all checking.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use ltrk_common::api::auth::{validate_hash, validate_timestamp, ApiAuthError};
use ltrk_common::api::Envelope;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::AppState;

/// Authentication request fields
#[derive(Debug, Deserialize)]
struct AuthFields {
    timestamp: i64,
    hash: String,
}

/// Authentication middleware
///
/// Applied to protected routes only; health and SSE endpoints do not use it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: axum::middleware::Next,
) -> Result<Response, AuthError> {
    // Secret 0 disables all auth checking
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    if request.method() == Method::GET {
        let auth = parse_query_auth(request.uri().query().unwrap_or(""))?;

        validate_timestamp(auth.timestamp).map_err(auth_error)?;

        // GET requests hash the auth fields alone
        let value = json!({ "timestamp": auth.timestamp, "hash": auth.hash.clone() });
        validate_hash(&auth.hash, &value, state.shared_secret).map_err(auth_error)?;

        return Ok(next.run(request).await);
    }

    // Mutating request: extract the body for hash validation.
    // Body size is limited to keep a hostile payload from exhausting memory.
    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, 10 * 1024 * 1024)
        .await
        .map_err(|e| AuthError::ParseError(format!("Failed to read body: {}", e)))?;

    let json_value: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| AuthError::ParseError(format!("Invalid JSON: {}", e)))?;

    let auth: AuthFields = serde_json::from_value(json_value.clone())
        .map_err(|e| AuthError::MissingFields(format!("Missing auth fields: {}", e)))?;

    validate_timestamp(auth.timestamp).map_err(auth_error)?;
    validate_hash(&auth.hash, &json_value, state.shared_secret).map_err(auth_error)?;

    // Reconstruct request with restored body for downstream handlers
    let request = Request::from_parts(parts, Body::from(body_bytes));

    Ok(next.run(request).await)
}

fn parse_query_auth(query: &str) -> Result<AuthFields, AuthError> {
    let mut timestamp = None;
    let mut hash = None;

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            match key {
                "timestamp" => timestamp = value.parse::<i64>().ok(),
                "hash" => hash = Some(value.to_string()),
                _ => {}
            }
        }
    }

    match (timestamp, hash) {
        (Some(timestamp), Some(hash)) => Ok(AuthFields { timestamp, hash }),
        _ => Err(AuthError::MissingFields(
            "timestamp and hash query parameters required".to_string(),
        )),
    }
}

fn auth_error(e: ApiAuthError) -> AuthError {
    match e {
        ApiAuthError::InvalidTimestamp { reason, .. } => AuthError::InvalidTimestamp(reason),
        ApiAuthError::InvalidHash {
            provided,
            calculated,
        } => {
            warn!(
                "Hash validation failed: provided={}, calculated={}",
                provided, calculated
            );
            AuthError::InvalidHash
        }
        other => AuthError::Other(other.to_string()),
    }
}

/// Authentication error types for HTTP responses
#[derive(Debug)]
pub enum AuthError {
    InvalidTimestamp(String),
    InvalidHash,
    MissingFields(String),
    ParseError(String),
    Other(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::InvalidTimestamp(reason) => (
                StatusCode::UNAUTHORIZED,
                format!("Invalid timestamp: {}", reason),
            ),
            AuthError::InvalidHash => (StatusCode::UNAUTHORIZED, "Invalid hash".to_string()),
            AuthError::MissingFields(msg) => (
                StatusCode::BAD_REQUEST,
                format!("Missing required fields: {}", msg),
            ),
            AuthError::ParseError(msg) => {
                (StatusCode::BAD_REQUEST, format!("Parse error: {}", msg))
            }
            AuthError::Other(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authentication error: {}", msg),
            ),
        };

        (status, axum::Json(Envelope::error(message))).into_response()
    }
}
