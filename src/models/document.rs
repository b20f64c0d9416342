//! Toxicology profile document: field taxonomy, typed entries, blank template.
//!
//! The document itself travels as `serde_json::Value` because LLM patches
//! address it by JSON pointer and may touch fields outside the fixed set.
//! Entries built by deterministic code go through the typed structs below.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::enums::MetricType;

/// List-of-findings fields (append-with-dedup semantics).
pub const FINDING_FIELDS: &[&str] = &[
    "acute_toxicity",
    "skin_irritation",
    "skin_sensitization",
    "ocular_irritation",
    "phototoxicity",
    "repeated_dose_toxicity",
    "percutaneous_absorption",
    "ingredient_profile",
];

/// Scalar-metric fields (replace semantics, at most one live entry).
pub const METRIC_FIELDS: &[&str] = &["NOAEL", "DAP"];

/// Keys every Finding entry carries.
pub const FINDING_KEYS: &[&str] = &["reference", "data", "source", "statement", "replaced"];

/// Ingredient name used when nothing better is known.
pub const PLACEHOLDER_INCI: &str = "INCI_NAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Identity,
    Finding,
    Metric,
}

/// Classify a top-level field name. `None` for fields outside the schema.
pub fn field_kind(name: &str) -> Option<FieldKind> {
    if FINDING_FIELDS.contains(&name) {
        Some(FieldKind::Finding)
    } else if METRIC_FIELDS.contains(&name) {
        Some(FieldKind::Metric)
    } else if matches!(name, "inci" | "inci_ori" | "cas" | "category" | "isSkip") {
        Some(FieldKind::Identity)
    } else {
        None
    }
}

pub fn is_finding_field(name: &str) -> bool {
    FINDING_FIELDS.contains(&name)
}

pub fn is_metric_field(name: &str) -> bool {
    METRIC_FIELDS.contains(&name)
}

/// Canonical blank document.
pub fn blank_template() -> Value {
    let mut doc = Map::new();
    doc.insert("inci".into(), json!(PLACEHOLDER_INCI));
    doc.insert("cas".into(), json!([]));
    doc.insert("isSkip".into(), json!(false));
    doc.insert("category".into(), json!("OTHERS"));
    for field in FINDING_FIELDS.iter().chain(METRIC_FIELDS) {
        doc.insert((*field).into(), json!([]));
    }
    doc.insert("inci_ori".into(), json!("inci_name"));
    Value::Object(doc)
}

/// Current ingredient name of a document, if it has a usable one.
pub fn document_inci(doc: &Value) -> Option<&str> {
    doc.get("inci")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Set both `inci` and `inci_ori`.
pub fn set_inci(doc: &mut Value, name: &str) {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("inci".into(), json!(name));
        obj.insert("inci_ori".into(), json!(name));
    }
}

/// Mutable handle to a list field, creating it (or replacing a non-list) as needed.
pub fn list_field_mut<'a>(doc: &'a mut Value, field: &str) -> Option<&'a mut Vec<Value>> {
    let obj = doc.as_object_mut()?;
    let slot = obj.entry(field.to_string()).or_insert_with(|| json!([]));
    if !slot.is_array() {
        *slot = json!([]);
    }
    slot.as_array_mut()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Reference {
    pub title: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Replaced {
    pub replaced_inci: String,
    pub replaced_type: String,
}

/// A toxicology observation stored in a finding-list field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub reference: Reference,
    pub data: Vec<String>,
    pub source: String,
    pub statement: Option<String>,
    pub replaced: Replaced,
}

impl Finding {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A NOAEL or DAP value with its supporting metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub note: Option<String>,
    pub unit: String,
    pub experiment_target: Option<String>,
    pub source: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub study_duration: Option<String>,
    pub value: serde_json::Number,
}

impl Metric {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Schema-appropriate default for a missing Finding key.
pub fn finding_key_default(key: &str) -> Value {
    match key {
        "reference" => json!({"title": "", "link": null}),
        "data" => json!([]),
        "replaced" => json!({"replaced_inci": "", "replaced_type": ""}),
        _ => json!(""),
    }
}
