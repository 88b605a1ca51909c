use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::enums::{Backend, FieldType, TemplateStatus};

/// One named, typed slot to extract from every document of a template.
///
/// Deserialization is deliberately lenient: field definitions frequently
/// arrive from AI backends with string-typed numbers, null options, or the
/// HTML `tel` spelling. Anything recoverable is recovered; validation of
/// user-saved fields happens separately in [`validate_fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, deserialize_with = "lenient_options")]
    pub options: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub default_value: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub placeholder: Option<String>,
    #[serde(default, deserialize_with = "lenient_order")]
    pub order: u32,
}

/// A user-defined document type: field schema plus processing preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Overrides the default reconciliation guidance when set.
    pub custom_instruction: Option<String>,
    /// Set once a user has picked a winning backend for a test document.
    pub preferred_backend: Option<Backend>,
    pub fields: Vec<FieldDef>,
    pub example_image_path: Option<String>,
    pub status: TemplateStatus,
    pub created_at: NaiveDateTime,
}

impl Template {
    pub fn fields_json(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Validate a user-edited field list and re-sequence display orders.
///
/// Rules: every field needs a non-empty machine name and label; names must
/// be unique within the template. On success the list comes back with
/// orders rewritten as a dense 1-based run (stable over the submitted
/// order values).
pub fn validate_fields(fields: Vec<FieldDef>) -> Result<Vec<FieldDef>, String> {
    if fields.is_empty() {
        return Err("Field list must not be empty".to_string());
    }

    for field in &fields {
        if field.name.trim().is_empty() {
            return Err("Every field needs a machine name".to_string());
        }
        if field.label.trim().is_empty() {
            return Err(format!("Field '{}' is missing a label", field.name));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for field in &fields {
        if !seen.insert(field.name.as_str()) {
            return Err(format!("Duplicate field name: {}", field.name));
        }
    }

    Ok(resequence(fields))
}

/// Clean a detected field list: drop nameless entries, keep the first of
/// any duplicated name, default empty labels from the name, re-sequence.
pub fn sanitize_detected_fields(fields: Vec<FieldDef>) -> Vec<FieldDef> {
    let mut seen = std::collections::HashSet::new();
    let mut kept: Vec<FieldDef> = Vec::with_capacity(fields.len());

    for mut field in fields {
        let name = field.name.trim().to_string();
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        field.name = name;
        if field.label.trim().is_empty() {
            field.label = field.name.clone();
        }
        kept.push(field);
    }

    resequence(kept)
}

/// Rewrite orders as a dense 1-based sequence, stable over submitted order.
fn resequence(mut fields: Vec<FieldDef>) -> Vec<FieldDef> {
    fields.sort_by_key(|f| f.order);
    for (i, field) in fields.iter_mut().enumerate() {
        field.order = (i + 1) as u32;
    }
    fields
}

// ── Lenient deserializers for AI-produced field definitions ──

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_string(&value).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_string(&value).filter(|s| !s.is_empty()))
}

fn lenient_field_type<'de, D: Deserializer<'de>>(d: D) -> Result<FieldType, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::String(s) => FieldType::parse_lenient(&s),
        _ => FieldType::default(),
    })
}

fn lenient_options<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Array(items) => {
            let opts: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            if opts.is_empty() {
                None
            } else {
                Some(opts)
            }
        }
        _ => None,
    })
}

fn lenient_order<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().unwrap_or(0) as u32,
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}
