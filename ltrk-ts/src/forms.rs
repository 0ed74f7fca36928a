//! Form-framework contact field extraction
//!
//! A closed set of supported form builders, each knowing how to pull the
//! contact fields out of its own native submission payload shape. Framework
//! availability is an explicit registry populated from settings at startup,
//! not runtime discovery.

use crate::mail::is_valid_email;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Supported form builders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFramework {
    ContactForm7,
    Gravity,
    Ninja,
    Elementor,
    Avada,
}

/// Contact fields extracted from a submission payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactFields {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub form_id: Option<String>,
    pub form_name: Option<String>,
}

impl FormFramework {
    pub const ALL: [FormFramework; 5] = [
        FormFramework::ContactForm7,
        FormFramework::Gravity,
        FormFramework::Ninja,
        FormFramework::Elementor,
        FormFramework::Avada,
    ];

    /// URL/config slug for this framework
    pub fn slug(&self) -> &'static str {
        match self {
            FormFramework::ContactForm7 => "cf7",
            FormFramework::Gravity => "gravity",
            FormFramework::Ninja => "ninja",
            FormFramework::Elementor => "elementor",
            FormFramework::Avada => "avada",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.trim() {
            "cf7" => Some(FormFramework::ContactForm7),
            "gravity" => Some(FormFramework::Gravity),
            "ninja" => Some(FormFramework::Ninja),
            "elementor" => Some(FormFramework::Elementor),
            "avada" => Some(FormFramework::Avada),
            _ => None,
        }
    }

    /// Extract contact fields from this framework's submission payload
    ///
    /// Extraction is best-effort: unexpected payload shapes yield empty
    /// fields, never an error.
    pub fn extract_contact_fields(&self, payload: &Value) -> ContactFields {
        match self {
            FormFramework::ContactForm7 => extract_cf7(payload),
            FormFramework::Gravity => extract_gravity(payload),
            FormFramework::Ninja => extract_ninja(payload),
            FormFramework::Elementor => extract_elementor(payload),
            FormFramework::Avada => extract_avada(payload),
        }
    }
}

/// Frameworks the service accepts submissions from
#[derive(Debug, Clone)]
pub struct FrameworkRegistry {
    enabled: Vec<FormFramework>,
}

impl FrameworkRegistry {
    /// Build from the comma-separated `tracking_frameworks` setting
    ///
    /// Unknown slugs are ignored; an empty or missing setting enables all
    /// frameworks.
    pub fn from_csv(csv: &str) -> Self {
        let enabled: Vec<FormFramework> =
            csv.split(',').filter_map(FormFramework::from_slug).collect();
        if enabled.is_empty() {
            Self {
                enabled: FormFramework::ALL.to_vec(),
            }
        } else {
            Self { enabled }
        }
    }

    pub fn is_registered(&self, framework: FormFramework) -> bool {
        self.enabled.contains(&framework)
    }
}

// ----------------------------------------------------------------------
// Per-framework payload shapes
// ----------------------------------------------------------------------

/// Contact Form 7: `posted_data` is a flat map of field name to value;
/// field names are author-chosen (`your-email`, `tel-463`, ...)
fn extract_cf7(payload: &Value) -> ContactFields {
    let mut fields = ContactFields {
        form_id: json_to_string(&payload["form_id"]),
        form_name: json_to_string(&payload["title"]),
        ..Default::default()
    };

    if let Some(posted) = payload["posted_data"].as_object() {
        for (name, value) in posted {
            let Some(value) = json_to_string(value) else {
                continue;
            };
            assign_by_field_name(&mut fields, name, value);
        }
    }

    fields
}

/// Gravity Forms: field metadata lives in `form.fields` (typed), values in
/// `entry` keyed by stringified field id
fn extract_gravity(payload: &Value) -> ContactFields {
    let mut fields = ContactFields {
        form_id: json_to_string(&payload["form"]["id"]),
        form_name: json_to_string(&payload["form"]["title"]),
        ..Default::default()
    };

    let entry = payload["entry"].as_object();
    if let (Some(form_fields), Some(entry)) = (payload["form"]["fields"].as_array(), entry) {
        for field in form_fields {
            let Some(id) = json_to_string(&field["id"]) else {
                continue;
            };
            let Some(value) = entry.get(&id).and_then(json_to_string) else {
                continue;
            };
            match field["type"].as_str() {
                Some("email") if fields.email.is_none() => fields.email = Some(value),
                Some("phone") if fields.phone.is_none() => fields.phone = Some(value),
                _ => {}
            }
        }
    }

    fields
}

/// Ninja Forms: `fields` is an array of `{key, value}` objects
fn extract_ninja(payload: &Value) -> ContactFields {
    let mut fields = ContactFields {
        form_id: json_to_string(&payload["form_id"]),
        form_name: json_to_string(&payload["form_title"]),
        ..Default::default()
    };

    if let Some(entries) = payload["fields"].as_array() {
        for entry in entries {
            let Some(key) = entry["key"].as_str() else {
                continue;
            };
            let Some(value) = json_to_string(&entry["value"]) else {
                continue;
            };
            assign_by_field_name(&mut fields, key, value);
        }
    }

    fields
}

/// Elementor Pro: `fields` maps field id to either a `{id, value}` record
/// or a bare string value
fn extract_elementor(payload: &Value) -> ContactFields {
    let mut fields = ContactFields {
        form_id: json_to_string(&payload["form_id"]),
        form_name: json_to_string(&payload["form_name"]),
        ..Default::default()
    };

    if let Some(map) = payload["fields"].as_object() {
        for (name, raw) in map {
            let value = match raw {
                Value::Object(_) => json_to_string(&raw["value"]),
                other => json_to_string(other),
            };
            let Some(value) = value else {
                continue;
            };
            assign_by_field_name(&mut fields, name, value);
        }
    }

    fields
}

/// Avada/Fusion forms: `data` is a flat map of field name to value
fn extract_avada(payload: &Value) -> ContactFields {
    let mut fields = ContactFields {
        form_id: json_to_string(&payload["form_id"]),
        ..Default::default()
    };

    if let Some(data) = payload["data"].as_object() {
        for (name, value) in data {
            let Some(value) = json_to_string(value) else {
                continue;
            };
            assign_by_field_name(&mut fields, name, value);
        }
    }

    fields
}

/// Route a name/value pair into email or phone
///
/// Email is recognized by value shape (field names are author-chosen and
/// unreliable across frameworks); phone by field-name convention.
fn assign_by_field_name(fields: &mut ContactFields, name: &str, value: String) {
    let name = name.to_lowercase();

    if fields.email.is_none() && is_valid_email(&value) {
        fields.email = Some(value);
        return;
    }

    if fields.phone.is_none() && (name.contains("phone") || name.contains("tel")) {
        fields.phone = Some(value);
    }
}

fn json_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
