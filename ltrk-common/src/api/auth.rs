//! API request authentication via timestamp and hash validation
//!
//! The anti-forgery token accompanying every mutating request is a SHA-256
//! hash over the canonical request JSON plus a shared secret stored in the
//! settings table. Setting the secret to `0` disables checking entirely
//! (used by local development and tests).
//!
//! # Pure Functions
//!
//! This module contains only pure functions and database operations; the
//! HTTP middleware applying them lives in the service crate.

use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum accepted request age in milliseconds
const MAX_PAST_MS: i64 = 5000;
/// Maximum accepted clock drift into the future in milliseconds
const MAX_FUTURE_MS: i64 = 1000;

/// Placeholder substituted for the hash field before hashing
const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Authentication error types
#[derive(Debug, Clone)]
pub enum ApiAuthError {
    /// Timestamp outside acceptable window
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    /// Hash does not match calculated value
    InvalidHash { provided: String, calculated: String },

    /// Timestamp field missing from request
    MissingTimestamp,

    /// Hash field missing from request
    MissingHash,

    /// Database error loading shared secret
    DatabaseError(String),

    /// Failed to parse request body
    ParseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::InvalidTimestamp { reason, .. } => {
                write!(f, "Invalid timestamp: {}", reason)
            }
            ApiAuthError::InvalidHash { .. } => write!(f, "Invalid hash"),
            ApiAuthError::MissingTimestamp => write!(f, "Missing timestamp field"),
            ApiAuthError::MissingHash => write!(f, "Missing hash field"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
            ApiAuthError::ParseError(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Shared Secret Management
// ========================================

/// Load the shared secret from database settings
///
/// Key: `api_shared_secret`, value i64; special value 0 disables auth
/// checking. Generates and stores a fresh secret on first use.
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = 'api_shared_secret'")
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Initialize the shared secret if not present
///
/// Generates a cryptographically random non-zero i64 and stores it.
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES ('api_shared_secret', ?)")
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

// ========================================
// Timestamp Validation
// ========================================

/// Validate a request timestamp (Unix epoch milliseconds)
///
/// The asymmetric window is intentional: generous past tolerance absorbs
/// processing delay; future tolerance covers clock drift only.
pub fn validate_timestamp(timestamp: i64) -> Result<(), ApiAuthError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let diff = now - timestamp;

    if diff > MAX_PAST_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", diff, MAX_PAST_MS),
        });
    }

    if diff < -MAX_FUTURE_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                diff.abs(),
                MAX_FUTURE_MS
            ),
        });
    }

    Ok(())
}

// ========================================
// Hash Calculation and Validation
// ========================================

/// Calculate the request hash
///
/// 1. Replace the hash field with the dummy hash
/// 2. Convert to canonical JSON (sorted keys, no whitespace)
/// 3. Append the shared secret as a decimal i64 string
/// 4. SHA-256 the concatenation, hex-encoded (64 chars)
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let canonical = to_canonical_json(&value);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    let result = hasher.finalize();

    format!("{:x}", result)
}

/// Validate a provided hash against the calculated value
pub fn validate_hash(
    provided: &str,
    json_value: &Value,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(json_value, shared_secret);
    if provided == calculated {
        Ok(())
    } else {
        Err(ApiAuthError::InvalidHash {
            provided: provided.to_string(),
            calculated,
        })
    }
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("\"{}\":{}", k, to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT NOT NULL, expires_at TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = json!({"z": 3, "a": 1, "m": 2});
        let canonical = to_canonical_json(&value);
        assert_eq!(canonical, "{\"a\":1,\"m\":2,\"z\":3}");
    }

    #[test]
    fn test_canonical_json_nested() {
        let value = json!({"b": {"y": 2, "x": 1}, "a": [3, 2]});
        let canonical = to_canonical_json(&value);
        assert_eq!(canonical, "{\"a\":[3,2],\"b\":{\"x\":1,\"y\":2}}");
    }

    #[test]
    fn test_calculate_hash_is_stable() {
        let value = json!({"click_id": "abc", "timestamp": 1730000000000i64, "hash": "dummy"});
        let h1 = calculate_hash(&value, 42);
        let h2 = calculate_hash(&value, 42);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_hash_depends_on_secret() {
        let value = json!({"click_id": "abc", "hash": "dummy"});
        assert_ne!(calculate_hash(&value, 1), calculate_hash(&value, 2));
    }

    #[test]
    fn test_validate_hash_round_trip() {
        let value = json!({"click_id": "abc", "timestamp": 1730000000000i64, "hash": "x"});
        let hash = calculate_hash(&value, 99);
        assert!(validate_hash(&hash, &value, 99).is_ok());
        assert!(validate_hash(&hash, &value, 100).is_err());
    }

    #[test]
    fn test_validate_timestamp_window() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;

        assert!(validate_timestamp(now).is_ok());
        assert!(validate_timestamp(now - 500).is_ok());
        assert!(validate_timestamp(now - 60_000).is_err());
        assert!(validate_timestamp(now + 60_000).is_err());
    }

    #[tokio::test]
    async fn test_shared_secret_initialized_once() {
        let pool = setup_test_db().await;

        let first = load_shared_secret(&pool).await.unwrap();
        assert_ne!(first, 0);

        let second = load_shared_secret(&pool).await.unwrap();
        assert_eq!(first, second);
    }
}
