use super::parser::{extract_json_object, parse_intent_label};
use super::prompt::INTENT_SYSTEM_PROMPT;
use super::types::LlmClient;
use super::EditError;
use crate::models::EditIntent;

/// Keys that mark a JSON object as a structured form submission.
const FORM_KEYS: &[&str] = &["noael", "dap", "noael_payload", "dap_payload", "value", "unit"];

/// Leading verbs of a plain-language edit. Checked before the raw-form
/// heuristics so "for X, set NOAEL to 200" never reads as pasted form data.
const EDIT_VERBS: &[&str] = &[
    "change ", "update ", "set ", "delete ", "add ", "remove ", "modify ", "edit ", "replace ",
    "fix ", "correct ", "for ",
];

const QUESTION_WORDS: &[&str] = &["what ", "how ", "why ", "is ", "can "];

/// Colon-terminated labels typical of a pasted correction form.
const RAW_FORM_MARKERS: &[&str] = &[
    "noael:",
    "loael:",
    "pod:",
    "hed:",
    "species:",
    "duration:",
    "study type:",
    "endpoint:",
    "correction form",
    "unit-",
    "value-",
];

/// Ordered heuristics. `None` means the input is ambiguous and needs the LLM.
pub fn classify_heuristic(input: &str) -> Option<EditIntent> {
    let lower = input.trim().to_lowercase();
    if lower.is_empty() {
        return Some(EditIntent::NoEdit);
    }

    if has_form_json(input) {
        return Some(EditIntent::FormEditStructured);
    }

    if has_edit_verb(&lower) {
        return Some(EditIntent::NliEdit);
    }

    if is_question(&lower) {
        return Some(EditIntent::NoEdit);
    }

    if has_raw_form_pattern(&lower) {
        return Some(EditIntent::FormEditRaw);
    }

    None
}

/// Classify with heuristics first and the LLM for the ambiguous remainder.
/// An unusable LLM answer or a failed call defaults to `NliEdit`.
pub fn classify_intent(input: &str, llm: &dyn LlmClient, model: &str) -> EditIntent {
    if let Some(intent) = classify_heuristic(input) {
        tracing::debug!(intent = %intent, "Intent from heuristics");
        return intent;
    }

    match llm
        .generate(model, input, INTENT_SYSTEM_PROMPT)
        .and_then(|answer| {
            parse_intent_label(&answer)
                .ok_or_else(|| EditError::ClassificationAmbiguous(answer.trim().to_string()))
        }) {
        Ok(intent) => {
            tracing::debug!(intent = %intent, "Intent from LLM");
            intent
        }
        Err(e) => {
            tracing::warn!(error = %e, "Intent classification fell back to NLI_EDIT");
            EditIntent::NliEdit
        }
    }
}

fn has_form_json(input: &str) -> bool {
    extract_json_object(input)
        .map(|obj| FORM_KEYS.iter().any(|k| obj.contains_key(*k)))
        .unwrap_or(false)
}

fn has_edit_verb(lower: &str) -> bool {
    EDIT_VERBS.iter().any(|v| lower.starts_with(v))
}

fn is_question(lower: &str) -> bool {
    lower.ends_with('?') || QUESTION_WORDS.iter().any(|q| lower.starts_with(q))
}

fn has_raw_form_pattern(lower: &str) -> bool {
    RAW_FORM_MARKERS.iter().filter(|m| lower.contains(*m)).count() >= 2
}
