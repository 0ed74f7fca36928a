//! Outgoing-mail interception
//!
//! Classifies outgoing mail parameters and conditionally appends a single
//! blind-copy header for selected categories, consulting the hour-window
//! rate limiter. Mutation is strictly additive: only the header list may
//! gain one `Bcc:` entry, every other field passes through unchanged, and
//! any internal failure degrades to "no BCC added" so delivery of the
//! primary message is never at risk.

mod classify;

pub use classify::{classify, is_valid_email, EmailCategory};

use crate::ratelimit::RateLimiter;
use crate::store::KvStore;
use ltrk_common::time;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Rate-limit feature name shared by the interceptor and its pause marker
const BCC_FEATURE: &str = "bcc";

/// Outgoing mail parameters as seen by the filter point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailParams {
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// What to do when the rate limit for a window is exhausted
///
/// The limit always stops further BCC additions for the window; the action
/// only controls the side effect: `LogOnly` records the fact, while
/// `PauseUntilNextPeriod` additionally sets a marker that short-circuits
/// counter work until the next hour window begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    LogOnly,
    PauseUntilNextPeriod,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::LogOnly => "log_only",
            RateLimitAction::PauseUntilNextPeriod => "pause_until_next_period",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "log_only" => Some(RateLimitAction::LogOnly),
            "pause_until_next_period" => Some(RateLimitAction::PauseUntilNextPeriod),
            _ => None,
        }
    }
}

/// Blind-copy configuration, reified from the settings store
#[derive(Debug, Clone, PartialEq)]
pub struct BccConfig {
    pub enabled: bool,
    pub bcc_email: String,
    pub selected_email_types: Vec<EmailCategory>,
    /// `<= 0` means unlimited
    pub rate_limit_threshold: i64,
    pub rate_limit_action: RateLimitAction,
}

impl Default for BccConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bcc_email: String::new(),
            selected_email_types: vec![EmailCategory::FormSubmission],
            rate_limit_threshold: 0,
            rate_limit_action: RateLimitAction::LogOnly,
        }
    }
}

impl BccConfig {
    /// Load the configuration from settings
    ///
    /// Malformed or missing values degrade to defaults; loading never fails
    /// because the interceptor must never block mail delivery.
    pub async fn load(kv: &KvStore) -> Self {
        let defaults = Self::default();

        let enabled = matches!(
            read(kv, "bcc_enabled").await.as_deref(),
            Some("1") | Some("true")
        );

        let bcc_email = read(kv, "bcc_email").await.unwrap_or_default();

        let selected_email_types = match read(kv, "bcc_email_types").await {
            Some(csv) => csv
                .split(',')
                .filter_map(EmailCategory::parse)
                .collect::<Vec<_>>(),
            None => defaults.selected_email_types.clone(),
        };

        let rate_limit_threshold = read(kv, "bcc_rate_limit_threshold")
            .await
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(defaults.rate_limit_threshold);

        let rate_limit_action = read(kv, "bcc_rate_limit_action")
            .await
            .and_then(|v| RateLimitAction::parse(&v))
            .unwrap_or(defaults.rate_limit_action);

        Self {
            enabled,
            bcc_email,
            selected_email_types,
            rate_limit_threshold,
            rate_limit_action,
        }
    }

    /// Persist the configuration to settings
    pub async fn store(&self, kv: &KvStore) -> ltrk_common::Result<()> {
        kv.set("bcc_enabled", if self.enabled { "1" } else { "0" }, None)
            .await?;
        kv.set("bcc_email", &self.bcc_email, None).await?;

        let types = self
            .selected_email_types
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");
        kv.set("bcc_email_types", &types, None).await?;

        kv.set(
            "bcc_rate_limit_threshold",
            &self.rate_limit_threshold.to_string(),
            None,
        )
        .await?;
        kv.set("bcc_rate_limit_action", self.rate_limit_action.as_str(), None)
            .await?;

        Ok(())
    }
}

async fn read(kv: &KvStore, key: &str) -> Option<String> {
    match kv.get(key).await {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            warn!("Failed to read setting '{}': {}", key, e);
            None
        }
    }
}

/// Pure eligibility check, before the rate limiter is consulted
fn wants_bcc(params: &MailParams, config: &BccConfig, category: EmailCategory) -> bool {
    config.enabled
        && is_valid_email(&config.bcc_email)
        && config.selected_email_types.contains(&category)
        && !recipient_matches(params, &config.bcc_email)
        && !already_blind_copied(params, &config.bcc_email)
}

fn recipient_matches(params: &MailParams, address: &str) -> bool {
    params
        .to
        .iter()
        .any(|recipient| recipient.trim().eq_ignore_ascii_case(address.trim()))
}

fn already_blind_copied(params: &MailParams, address: &str) -> bool {
    let needle = address.trim().to_lowercase();
    params.headers.iter().any(|header| {
        let header = header.to_lowercase();
        header.trim_start().starts_with("bcc:") && header.contains(&needle)
    })
}

/// Apply the blind-copy policy to outgoing mail parameters
///
/// Returns the (possibly augmented) parameters and whether a BCC header was
/// added. All failure paths return the input unchanged.
pub async fn apply_bcc(
    params: &MailParams,
    config: &BccConfig,
    limiter: &RateLimiter,
    kv: &KvStore,
    category: EmailCategory,
) -> (MailParams, bool) {
    let out = params.clone();

    if !wants_bcc(params, config, category) {
        return (out, false);
    }

    let now = time::now();
    let pause_key = format!("pause_{}_{}", BCC_FEATURE, time::hour_window_key(now));

    match kv.get(&pause_key).await {
        Ok(Some(_)) => return (out, false),
        Ok(None) => {}
        Err(e) => {
            warn!("BCC pause check failed, skipping BCC: {}", e);
            return (out, false);
        }
    }

    let allowed = match limiter.check(BCC_FEATURE, config.rate_limit_threshold).await {
        Ok(allowed) => allowed,
        Err(e) => {
            warn!("BCC rate-limit check failed, skipping BCC: {}", e);
            return (out, false);
        }
    };

    if !allowed {
        match config.rate_limit_action {
            RateLimitAction::LogOnly => {
                warn!(
                    "BCC rate limit ({}) reached for this hour; not adding BCC",
                    config.rate_limit_threshold
                );
            }
            RateLimitAction::PauseUntilNextPeriod => {
                warn!(
                    "BCC rate limit ({}) reached; pausing until next hour window",
                    config.rate_limit_threshold
                );
                let ttl = time::next_hour_boundary(now) - now;
                if let Err(e) = kv.set(&pause_key, "1", Some(ttl)).await {
                    warn!("Failed to set BCC pause marker: {}", e);
                }
            }
        }
        return (out, false);
    }

    let mut out = out;
    out.headers.push(format!("Bcc: {}", config.bcc_email));
    (out, true)
}
