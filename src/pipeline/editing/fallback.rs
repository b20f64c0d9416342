use serde_json::Value;

use super::merge::{merge_updates, repair_llm_updates, DedupMode};
use super::parser::parse_fallback_updates;
use super::prompt::{build_fallback_prompt, FALLBACK_SYSTEM_PROMPT};
use super::types::LlmClient;

/// Result of the full-document fallback. On any failure `document` is the
/// input unchanged and `error` says why.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub document: Value,
    pub changed_fields: Vec<String>,
    pub error: Option<String>,
}

impl FallbackOutcome {
    pub fn summary(&self) -> String {
        if self.changed_fields.is_empty() {
            "final-save".to_string()
        } else {
            format!("Updated {}", self.changed_fields.join(", "))
        }
    }

    pub fn response(&self) -> String {
        match &self.error {
            Some(e) => format!("Full-document update failed: {e}"),
            None if self.changed_fields.is_empty() => "No changes were returned.".to_string(),
            None => format!("Updated fields: {}", self.changed_fields.join(", ")),
        }
    }
}

/// Ask the LLM for the changed top-level fields and merge them in.
pub fn regenerate_fields(
    document: &Value,
    instruction: &str,
    inci: &str,
    llm: &dyn LlmClient,
    model: &str,
    mode: DedupMode,
) -> FallbackOutcome {
    let prompt = build_fallback_prompt(document, instruction, inci);

    let updates = llm
        .generate(model, &prompt, FALLBACK_SYSTEM_PROMPT)
        .and_then(|raw| parse_fallback_updates(&raw));

    match updates {
        Ok(raw_updates) => {
            let updates = repair_llm_updates(raw_updates);
            let changed_fields: Vec<String> = updates.keys().cloned().collect();
            tracing::info!(fields = ?changed_fields, "Fallback returned changed fields");
            FallbackOutcome {
                document: merge_updates(document, updates, mode),
                changed_fields,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Full-document fallback failed, document unchanged");
            FallbackOutcome {
                document: document.clone(),
                changed_fields: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}
