//! NOAEL / DAP extraction from raw correction-form text (FORM_EDIT_RAW).

use serde::Deserialize;
use serde_json::Value;

use super::form::{FormPayloads, MetricPayload};
use super::parser::extract_inci_name;
use super::prompt::{
    build_dap_extraction_prompt, build_noael_extraction_prompt, build_task_classification_prompt,
    metric_extraction_schema, task_classification_schema, EXTRACTION_SYSTEM_PROMPT,
};
use super::types::LlmClient;
use super::EditError;
use crate::models::{ExtractionTask, MetricType};

const NOAEL_KEYWORDS: &[&str] = &["noael", "mg/kg", "ld50"];
const DAP_KEYWORDS: &[&str] = &["dap", "absorption", "經皮"];

/// What a correction form yielded.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub task: ExtractionTask,
    pub inci_name: Option<String>,
    pub payloads: FormPayloads,
}

#[derive(Debug, Deserialize)]
struct TaskClassification {
    task_type: String,
    #[serde(default)]
    has_noael_data: bool,
    #[serde(default)]
    has_dap_data: bool,
    #[serde(default)]
    inci_name: Option<String>,
}

/// Keyword fallback used when the classifier call fails.
pub fn keyword_task(text: &str) -> ExtractionTask {
    let lower = text.to_lowercase();
    let has_noael = NOAEL_KEYWORDS.iter().any(|k| lower.contains(k));
    let has_dap = DAP_KEYWORDS.iter().any(|k| lower.contains(k));
    ExtractionTask::from_flags(has_noael, has_dap)
}

/// Which metric kinds the form carries, plus the ingredient it names.
pub fn classify_task(
    text: &str,
    llm: &dyn LlmClient,
    model: &str,
) -> (ExtractionTask, Option<String>) {
    let answer = llm
        .generate_structured(
            model,
            &build_task_classification_prompt(text),
            EXTRACTION_SYSTEM_PROMPT,
            &task_classification_schema(),
        )
        .and_then(|v| {
            serde_json::from_value::<TaskClassification>(v)
                .map_err(|e| EditError::LlmOutputMalformed(e.to_string()))
        });

    match answer {
        Ok(c) => {
            let task = c.task_type.parse().unwrap_or_else(|_| {
                ExtractionTask::from_flags(c.has_noael_data, c.has_dap_data)
            });
            let inci = c
                .inci_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .or_else(|| extract_inci_name(text));
            (task, inci)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Task classification failed, using keywords");
            (keyword_task(text), extract_inci_name(text))
        }
    }
}

/// Classify, then run one structured extraction per detected kind. A kind
/// whose call fails is dropped; nothing extracted is `ExtractionEmpty`.
pub fn extract_metrics(
    text: &str,
    llm: &dyn LlmClient,
    model: &str,
) -> Result<Extraction, EditError> {
    let (task, mut inci_name) = classify_task(text, llm, model);
    tracing::debug!(task = %task, inci = ?inci_name, "Correction form classified");

    let mut noael = None;
    let mut dap = None;

    if task.wants_noael() {
        noael = extract_one(text, MetricType::Noael, llm, model);
    }
    if task.wants_dap() {
        dap = extract_one(text, MetricType::Dap, llm, model);
    }

    if noael.is_none() && dap.is_none() {
        return Err(EditError::ExtractionEmpty);
    }

    if inci_name.is_none() {
        inci_name = noael
            .iter()
            .chain(dap.iter())
            .find_map(|p: &MetricPayload| p.inci_name.clone())
            .filter(|n| !n.trim().is_empty());
    }

    Ok(Extraction {
        task,
        inci_name,
        payloads: FormPayloads::from_typed(noael.as_ref(), dap.as_ref()),
    })
}

fn extract_one(
    text: &str,
    kind: MetricType,
    llm: &dyn LlmClient,
    model: &str,
) -> Option<MetricPayload> {
    let prompt = match kind {
        MetricType::Noael => build_noael_extraction_prompt(text),
        MetricType::Dap => build_dap_extraction_prompt(text),
    };

    let result = llm
        .generate_structured(model, &prompt, EXTRACTION_SYSTEM_PROMPT, &metric_extraction_schema())
        .and_then(|v| {
            serde_json::from_value::<MetricPayload>(strip_nulls(v))
                .map_err(|e| EditError::LlmOutputMalformed(e.to_string()))
        });

    match result {
        Ok(payload) => Some(with_defaults(payload, kind)),
        Err(e) => {
            tracing::warn!(kind = %kind, error = %e, "Metric extraction failed");
            None
        }
    }
}

/// Drop null members so serde defaults apply to them.
fn strip_nulls(v: Value) -> Value {
    match v {
        Value::Object(mut map) => {
            map.retain(|_, v| !v.is_null());
            Value::Object(map)
        }
        other => other,
    }
}

fn with_defaults(mut payload: MetricPayload, kind: MetricType) -> MetricPayload {
    let (unit, target, duration) = match kind {
        MetricType::Noael => ("mg/kg bw/day", "Rats", "90-day"),
        MetricType::Dap => ("%", "Human skin", "theoretical"),
    };
    fill(&mut payload.unit, unit);
    fill(&mut payload.experiment_target, target);
    fill(&mut payload.study_duration, duration);
    if kind == MetricType::Dap {
        payload.unit = Some("%".into());
    }
    payload
}

fn fill(slot: &mut Option<String>, default: &str) {
    if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
        *slot = Some(default.to_string());
    }
}
