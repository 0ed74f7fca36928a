//! Outgoing-mail classification
//!
//! Heuristic keyword matching against the subject line, in fixed priority
//! order, with a recipient-equals-admin fallback. Matching is
//! case-insensitive; the first matching category wins.

use crate::mail::MailParams;
use serde::{Deserialize, Serialize};

/// Mail categories recognized by the interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailCategory {
    FormSubmission,
    UserRegistration,
    PasswordReset,
    Comment,
    Admin,
    Other,
}

impl EmailCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailCategory::FormSubmission => "form_submission",
            EmailCategory::UserRegistration => "user_registration",
            EmailCategory::PasswordReset => "password_reset",
            EmailCategory::Comment => "comment",
            EmailCategory::Admin => "admin",
            EmailCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "form_submission" => Some(EmailCategory::FormSubmission),
            "user_registration" => Some(EmailCategory::UserRegistration),
            "password_reset" => Some(EmailCategory::PasswordReset),
            "comment" => Some(EmailCategory::Comment),
            "admin" => Some(EmailCategory::Admin),
            "other" => Some(EmailCategory::Other),
            _ => None,
        }
    }
}

const FORM_KEYWORDS: &[&str] = &[
    "contact form",
    "form submission",
    "new submission",
    "enquiry",
    "inquiry",
    "your message",
    "contact request",
];

const REGISTRATION_KEYWORDS: &[&str] = &["new user", "registration", "welcome to"];

const PASSWORD_KEYWORDS: &[&str] = &[
    "password reset",
    "password changed",
    "lost password",
    "reset your password",
];

const COMMENT_KEYWORDS: &[&str] = &["comment", "moderate"];

/// Classify outgoing mail into a category
///
/// Priority: form submission > registration > password reset > comment >
/// recipient-equals-admin > other.
pub fn classify(params: &MailParams, admin_email: &str) -> EmailCategory {
    let subject = params.subject.to_lowercase();

    if contains_any(&subject, FORM_KEYWORDS) {
        return EmailCategory::FormSubmission;
    }
    if contains_any(&subject, REGISTRATION_KEYWORDS) {
        return EmailCategory::UserRegistration;
    }
    if contains_any(&subject, PASSWORD_KEYWORDS) {
        return EmailCategory::PasswordReset;
    }
    if contains_any(&subject, COMMENT_KEYWORDS) {
        return EmailCategory::Comment;
    }

    let admin = admin_email.trim();
    if !admin.is_empty()
        && params
            .to
            .iter()
            .any(|recipient| recipient.trim().eq_ignore_ascii_case(admin))
    {
        return EmailCategory::Admin;
    }

    EmailCategory::Other
}

fn contains_any(subject: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| subject.contains(keyword))
}

/// Pragmatic mailbox address validation (RFC 5322 shape)
///
/// One `@`, non-empty local part up to 64 chars, dotted domain without
/// leading/trailing dots, no whitespace anywhere.
pub fn is_valid_email(address: &str) -> bool {
    let address = address.trim();
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return false;
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }

    domain
        .split('.')
        .all(|label| !label.is_empty() && label.chars().all(|c| c.is_alphanumeric() || c == '-'))
}
