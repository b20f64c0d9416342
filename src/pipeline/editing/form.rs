//! Deterministic form application: NOAEL / DAP metric submissions and the
//! generic Finding form for any finding-list field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::merge::{append_unique_by_title, DedupMode};
use super::parser::extract_json_object;
use super::EditError;
use crate::models::{
    is_finding_field, list_field_mut, set_inci, Finding, MetricType, Metric, Reference, Replaced,
};

const DEFAULT_NOAEL_UNIT: &str = "mg/kg bw/day";

// ═══════════════════════════════════════════════════════════
// Metric payloads
// ═══════════════════════════════════════════════════════════

/// One NOAEL or DAP submission as it arrives from a form or from extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    #[serde(default)]
    pub inci_name: Option<String>,
    #[serde(default = "zero")]
    pub value: Number,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub experiment_target: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub study_duration: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub reference_title: Option<String>,
    #[serde(default)]
    pub reference_link: Option<String>,
    #[serde(default)]
    pub statement: Option<String>,
}

fn zero() -> Number {
    Number::from(0)
}

impl MetricPayload {
    pub fn new(value: Number) -> Self {
        Self {
            inci_name: None,
            value,
            unit: None,
            experiment_target: None,
            source: None,
            study_duration: None,
            note: None,
            reference_title: None,
            reference_link: None,
            statement: None,
        }
    }

    /// Source as stored: lower-cased, spaces replaced by underscores.
    fn normalized_source(&self) -> String {
        self.source
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
            .replace(' ', "_")
    }

    fn build_metric(&self, kind: MetricType, source: &str) -> Metric {
        let unit = match kind {
            MetricType::Dap => "%".to_string(),
            MetricType::Noael => self
                .unit
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NOAEL_UNIT.to_string()),
        };
        Metric {
            note: self.note.clone(),
            unit,
            experiment_target: Some(self.experiment_target.clone().unwrap_or_default()),
            source: source.to_string(),
            metric_type: kind,
            study_duration: Some(self.study_duration.clone().unwrap_or_default()),
            value: self.value.clone(),
        }
    }

    fn build_finding(&self, sentence: String, source: &str) -> Finding {
        Finding {
            reference: Reference {
                title: self.reference_title.clone().unwrap_or_default(),
                link: self.reference_link.clone(),
            },
            data: vec![sentence],
            source: source.to_string(),
            statement: Some(
                self.statement
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| format!("Based on {source} assessment")),
            ),
            replaced: Replaced::default(),
        }
    }
}

/// Raw payloads by kind. Kept undecoded so a malformed one fails alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormPayloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noael: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dap: Option<Value>,
}

impl FormPayloads {
    pub fn is_empty(&self) -> bool {
        self.noael.is_none() && self.dap.is_none()
    }

    pub fn from_typed(noael: Option<&MetricPayload>, dap: Option<&MetricPayload>) -> Self {
        Self {
            noael: noael.and_then(|p| serde_json::to_value(p).ok()),
            dap: dap.and_then(|p| serde_json::to_value(p).ok()),
        }
    }
}

/// Pull form payloads out of user input. `noael`/`noael_payload` and
/// `dap`/`dap_payload` name their kind; a bare payload with `value` or
/// `unit` is routed by its `type` (NOAEL when absent).
pub fn extract_form_payloads(input: &str) -> FormPayloads {
    let Some(obj) = extract_json_object(input) else {
        return FormPayloads::default();
    };

    let pick = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|k| obj.get(*k))
            .filter(|v| !v.is_null())
            .cloned()
    };

    let mut payloads = FormPayloads {
        noael: pick(["noael", "noael_payload"]),
        dap: pick(["dap", "dap_payload"]),
    };

    if payloads.is_empty() && (obj.contains_key("value") || obj.contains_key("unit")) {
        let bare = Value::Object(obj.clone());
        let is_dap = obj
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| t.eq_ignore_ascii_case("dap"));
        if is_dap {
            payloads.dap = Some(bare);
        } else {
            payloads.noael = Some(bare);
        }
    }
    payloads
}

/// Replace `NOAEL` with the submitted entry and add its supporting
/// `repeated_dose_toxicity` finding (deduplicated by reference title).
pub fn apply_noael(payload: &MetricPayload, document: &Value, inci: &str) -> Value {
    let source = payload.normalized_source();
    let metric = payload.build_metric(MetricType::Noael, &source);
    let sentence = format!(
        "NOAEL of {} {} established in {} ({} study) based on {} assessment",
        metric.value,
        metric.unit,
        metric.experiment_target.as_deref().unwrap_or_default(),
        metric.study_duration.as_deref().unwrap_or_default(),
        source
    );
    let finding = payload.build_finding(sentence, &source);
    apply_metric_pair(document, inci, "NOAEL", metric, "repeated_dose_toxicity", finding)
}

/// Replace `DAP` with the submitted entry (unit always `%`) and add its
/// supporting `percutaneous_absorption` finding.
pub fn apply_dap(payload: &MetricPayload, document: &Value, inci: &str) -> Value {
    let source = payload.normalized_source();
    let metric = payload.build_metric(MetricType::Dap, &source);
    let sentence = format!(
        "Dermal absorption estimated at {}% in {} ({} study) based on {} assessment",
        metric.value,
        metric.experiment_target.as_deref().unwrap_or_default(),
        metric.study_duration.as_deref().unwrap_or_default(),
        source
    );
    let finding = payload.build_finding(sentence, &source);
    apply_metric_pair(document, inci, "DAP", metric, "percutaneous_absorption", finding)
}

fn apply_metric_pair(
    document: &Value,
    inci: &str,
    metric_field: &str,
    metric: Metric,
    finding_field: &str,
    finding: Finding,
) -> Value {
    let mut doc = document.clone();
    if !doc.is_object() {
        doc = Value::Object(Map::new());
    }
    set_inci(&mut doc, inci);
    if let Some(obj) = doc.as_object_mut() {
        obj.insert(metric_field.to_string(), Value::Array(vec![metric.to_value()]));
    }
    if let Some(list) = list_field_mut(&mut doc, finding_field) {
        append_unique_by_title(list, finding.to_value());
    }
    doc
}

/// Result of applying a set of form payloads.
#[derive(Debug, Clone)]
pub struct FormOutcome {
    pub document: Value,
    pub applied: Vec<MetricType>,
    pub errors: Vec<String>,
    pub response: String,
}

impl FormOutcome {
    pub fn error(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }

    pub fn summary(&self) -> String {
        if self.applied.is_empty() {
            "final-save".to_string()
        } else {
            format!("form apply: {}", applied_labels(&self.applied))
        }
    }
}

fn applied_labels(applied: &[MetricType]) -> String {
    applied
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Apply NOAEL then DAP. A payload that does not decode is an error for its
/// kind only; the other kind still applies.
pub fn apply_form_payloads(document: &Value, payloads: &FormPayloads, inci: &str) -> FormOutcome {
    if payloads.is_empty() {
        return FormOutcome {
            document: document.clone(),
            applied: Vec::new(),
            errors: vec!["Empty form payloads".to_string()],
            response: "No form data to apply.".to_string(),
        };
    }

    let mut current = document.clone();
    let mut applied = Vec::new();
    let mut errors = Vec::new();

    let kinds = [
        (MetricType::Noael, payloads.noael.as_ref()),
        (MetricType::Dap, payloads.dap.as_ref()),
    ];
    for (kind, raw) in kinds {
        let Some(raw) = raw else { continue };
        match serde_json::from_value::<MetricPayload>(raw.clone()) {
            Ok(payload) => {
                let name = payload
                    .inci_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(inci);
                current = match kind {
                    MetricType::Noael => apply_noael(&payload, &current, name),
                    MetricType::Dap => apply_dap(&payload, &current, name),
                };
                tracing::info!(kind = %kind, value = %payload.value, "Form payload applied");
                applied.push(kind);
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Form payload rejected");
                errors.push(format!("{kind}: {e}"));
            }
        }
    }

    let response = match (applied.is_empty(), errors.is_empty()) {
        (false, true) => format!(
            "Form data applied: {} (replaces existing)",
            applied_labels(&applied)
        ),
        (false, false) => format!(
            "Partial. Applied: {}. Errors: {}",
            applied_labels(&applied),
            errors.join("; ")
        ),
        (true, _) => format!("Failed: {}", errors.join("; ")),
    };

    FormOutcome {
        document: current,
        applied,
        errors,
        response,
    }
}

// ═══════════════════════════════════════════════════════════
// Generic Finding form
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingFormRequest {
    pub inci_name: String,
    pub data: Vec<String>,
    pub source: String,
    pub reference_title: String,
    #[serde(default)]
    pub reference_link: Option<String>,
    #[serde(default)]
    pub statement: Option<String>,
    /// Study details (`test_subject`, `test_guideline`, `concentration`,
    /// `study_duration`, ...). Kept on the entry as `_metadata`.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl FindingFormRequest {
    /// Explicit statement, else one composed from the source and metadata.
    pub fn resolved_statement(&self) -> String {
        if let Some(s) = self.statement.as_deref().filter(|s| !s.trim().is_empty()) {
            return s.to_string();
        }

        let mut parts = vec![format!("Based on {} assessment", self.source)];
        if let Some(meta) = &self.metadata {
            let phrases = [
                ("test_subject", "with {}"),
                ("test_guideline", "following {}"),
                ("concentration", "at {} concentration"),
                ("study_duration", "over {}"),
            ];
            for (key, template) in phrases {
                if let Some(text) = meta.get(key).and_then(metadata_text) {
                    parts.push(template.replace("{}", &text));
                }
            }
        }
        parts.join(" ")
    }

    fn to_entry(&self) -> Value {
        let finding = Finding {
            reference: Reference {
                title: self.reference_title.clone(),
                link: self.reference_link.clone(),
            },
            data: self.data.clone(),
            source: self.source.clone(),
            statement: Some(self.resolved_statement()),
            replaced: Replaced::default(),
        };
        let mut entry = finding.to_value();
        if let (Some(meta), Some(obj)) = (&self.metadata, entry.as_object_mut()) {
            obj.insert("_metadata".into(), Value::Object(meta.clone()));
        }
        entry
    }
}

fn metadata_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct FindingFormOutcome {
    pub document: Value,
    pub field: String,
    pub added: bool,
    pub entries_count: usize,
    pub message: String,
}

pub(crate) fn require_finding_field(field: &str) -> Result<(), EditError> {
    if is_finding_field(field) {
        Ok(())
    } else {
        Err(EditError::InvalidRequest(format!(
            "unknown finding field: {field}"
        )))
    }
}

/// Add one Finding to `field`, skipping strict-identity duplicates.
pub fn apply_finding_form(
    field: &str,
    request: &FindingFormRequest,
    document: &Value,
) -> Result<FindingFormOutcome, EditError> {
    require_finding_field(field)?;
    if request.data.is_empty() {
        return Err(EditError::InvalidRequest(
            "data must contain at least one item".into(),
        ));
    }
    if request.inci_name.trim().is_empty() {
        return Err(EditError::InvalidRequest("inci_name is required".into()));
    }

    let entry = request.to_entry();
    let mut doc = document.clone();
    set_inci(&mut doc, request.inci_name.trim());

    let list = list_field_mut(&mut doc, field)
        .ok_or_else(|| EditError::InvalidRequest("document is not an object".into()))?;
    let duplicate = list
        .iter()
        .any(|e| DedupMode::Strict.same_finding(e, &entry));
    if !duplicate {
        list.push(entry);
    }
    let entries_count = list.len();

    let message = if duplicate {
        format!("Duplicate entry detected in {field} - not added")
    } else {
        format!("{field} updated successfully")
    };

    Ok(FindingFormOutcome {
        document: doc,
        field: field.to_string(),
        added: !duplicate,
        entries_count,
        message,
    })
}

/// Entries currently stored in a finding field.
pub fn list_findings(document: &Value, field: &str) -> Result<Vec<Value>, EditError> {
    require_finding_field(field)?;
    Ok(document
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// Remove the entry at `index`, returning the new document and the removed entry.
pub fn delete_finding(
    document: &Value,
    field: &str,
    index: usize,
) -> Result<(Value, Value), EditError> {
    require_finding_field(field)?;
    let mut doc = document.clone();
    let list = list_field_mut(&mut doc, field)
        .ok_or_else(|| EditError::InvalidRequest("document is not an object".into()))?;
    if index >= list.len() {
        return Err(EditError::FindingNotFound {
            field: field.to_string(),
            index,
        });
    }
    let removed = list.remove(index);
    Ok((doc, removed))
}
