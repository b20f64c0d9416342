//! Deterministic, LLM-free update from sections already present in the
//! instruction as JSON arrays.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::diff::diff_documents;
use super::merge::{merge_updates, DedupMode};
use super::parser::balanced_end;
use crate::models::{PatchOperation, FINDING_FIELDS, METRIC_FIELDS};

/// Pre-parser feeding the fast path: field name to the entries the input
/// carries for it. An empty map means "nothing structured here".
pub trait SectionExtractor: Send + Sync {
    fn extract(&self, input: &str) -> BTreeMap<String, Vec<Value>>;
}

/// Finds `"<field>": [ ... ]` for each taxonomy field.
pub struct RegexSectionExtractor;

static SECTION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([A-Za-z_]+)"\s*:\s*\["#).unwrap());

impl SectionExtractor for RegexSectionExtractor {
    fn extract(&self, input: &str) -> BTreeMap<String, Vec<Value>> {
        let mut sections = BTreeMap::new();

        for caps in SECTION_START.captures_iter(input) {
            let (Some(name), Some(whole)) = (caps.get(1), caps.get(0)) else {
                continue;
            };
            let field = name.as_str();
            if !FINDING_FIELDS.contains(&field) && !METRIC_FIELDS.contains(&field) {
                continue;
            }
            if sections.contains_key(field) {
                continue;
            }

            let open = whole.end() - 1;
            let Some(len) = balanced_end(&input[open..], '[', ']') else {
                tracing::warn!(field, "Unterminated section in instruction");
                continue;
            };
            match serde_json::from_str::<Vec<Value>>(&input[open..open + len]) {
                Ok(entries) if !entries.is_empty() => {
                    sections.insert(field.to_string(), entries);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(field, error = %e, "Skipping undecodable section");
                }
            }
        }
        sections
    }
}

#[derive(Debug, Clone)]
pub struct FastPathOutcome {
    pub document: Value,
    /// Fields that were merged, in name order. Empty means a miss.
    pub applied: Vec<String>,
    /// Diff from the input document to `document`, for the audit trail.
    pub patches: Vec<PatchOperation>,
}

impl FastPathOutcome {
    pub fn fast_done(&self) -> bool {
        !self.applied.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("fastpath update: Updated {}", self.applied.join(", "))
    }

    pub fn response(&self, inci: &str) -> String {
        format!(
            "Updated toxicology data for {inci}: {}",
            self.applied.join(", ")
        )
    }
}

/// Merge every section into a copy of `document`. Never fails: a section
/// that does not produce a list is skipped.
pub fn apply_sections(
    document: &Value,
    sections: &BTreeMap<String, Vec<Value>>,
    mode: DedupMode,
) -> FastPathOutcome {
    let mut current = document.clone();
    let mut applied = Vec::new();

    for (field, entries) in sections {
        if entries.is_empty() {
            continue;
        }
        let mut update = Map::new();
        update.insert(field.clone(), Value::Array(entries.clone()));
        let merged = merge_updates(&current, update, mode);
        if merged.get(field).is_some_and(Value::is_array) {
            current = merged;
            applied.push(field.clone());
        } else {
            tracing::warn!(field = %field, "Fast-path section skipped");
        }
    }

    let patches = diff_documents(document, &current);
    FastPathOutcome {
        document: current,
        applied,
        patches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blank_template;
    use crate::pipeline::editing::patch::apply_in_place;
    use serde_json::json;

    fn replay(from: &Value, ops: &[PatchOperation]) -> Value {
        let mut doc = from.clone();
        for op in ops {
            apply_in_place(&mut doc, op).unwrap();
        }
        doc
    }

    #[test]
    fn extracts_known_sections_only() {
        let input = r#"Update with "NOAEL": [{"value": 200, "unit": "mg/kg"}] and "notes": [1]"#;
        let sections = RegexSectionExtractor.extract(input);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections["NOAEL"][0]["value"], 200);
    }

    #[test]
    fn nested_brackets_inside_entries() {
        let input = r#""acute_toxicity": [{"data": ["LD50 [oral] > 2000"], "source": "echa",
            "reference": {"title": "T", "link": null}}]"#;
        let sections = RegexSectionExtractor.extract(input);
        assert_eq!(sections["acute_toxicity"][0]["data"][0], "LD50 [oral] > 2000");
    }

    #[test]
    fn empty_and_broken_sections_are_ignored() {
        let input = r#""DAP": [] "NOAEL": [{"value": } "#;
        assert!(RegexSectionExtractor.extract(input).is_empty());
        assert!(RegexSectionExtractor.extract("Set NOAEL to 200").is_empty());
    }

    #[test]
    fn apply_sections_merges_and_reports() {
        let mut sections = BTreeMap::new();
        sections.insert("DAP".to_string(), vec![json!({"value": 5, "unit": "%"})]);
        sections.insert(
            "skin_irritation".to_string(),
            vec![json!({"source": "cir", "reference": {"title": "R"}, "data": ["mild"]})],
        );
        let outcome = apply_sections(&blank_template(), &sections, DedupMode::Baseline);
        assert!(outcome.fast_done());
        assert_eq!(outcome.applied, vec!["DAP", "skin_irritation"]);
        assert_eq!(outcome.summary(), "fastpath update: Updated DAP, skin_irritation");
        assert_eq!(outcome.document["DAP"][0]["value"], 5);
        let paths: Vec<&str> = outcome.patches.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/DAP/0", "/skin_irritation/0"]);
        assert_eq!(replay(&blank_template(), &outcome.patches), outcome.document);
        assert_eq!(
            outcome.response("GLYCERIN"),
            "Updated toxicology data for GLYCERIN: DAP, skin_irritation"
        );
    }

    #[test]
    fn recorded_patches_replay_across_dedup_and_metric_replace() {
        let mut seed = blank_template();
        seed["skin_irritation"] = json!([
            {"source": "cir", "reference": {"title": "R", "link": null}, "data": ["mild"],
             "statement": null, "replaced": {"replaced_inci": "", "replaced_type": ""}}
        ]);
        seed["DAP"] = json!([{"value": 2, "unit": "%"}]);

        let mut sections = BTreeMap::new();
        sections.insert("DAP".to_string(), vec![json!({"value": 5, "unit": "%"})]);
        sections.insert(
            "skin_irritation".to_string(),
            vec![
                json!({"source": "cir", "reference": {"title": "R"}, "data": ["severe"]}),
                json!({"source": "echa", "reference": {"title": "E"}, "data": ["none"]}),
            ],
        );
        let outcome = apply_sections(&seed, &sections, DedupMode::Baseline);

        assert_eq!(outcome.document["skin_irritation"].as_array().unwrap().len(), 2);
        assert_eq!(outcome.document["DAP"].as_array().unwrap().len(), 1);
        assert_eq!(replay(&seed, &outcome.patches), outcome.document);
    }

    #[test]
    fn empty_mapping_is_a_miss() {
        let doc = blank_template();
        let outcome = apply_sections(&doc, &BTreeMap::new(), DedupMode::Baseline);
        assert!(!outcome.fast_done());
        assert_eq!(outcome.document, doc);
    }
}
