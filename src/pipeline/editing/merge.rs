//! Field-specific merge rules shared by the fast path, the full-document
//! fallback and the form applicators.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{field_kind, set_inci, FieldKind};

/// Identity used to recognise the same Finding twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    /// `(source, reference.title)`.
    #[default]
    Baseline,
    /// `(source, reference.title, data[0])`.
    Strict,
}

impl DedupMode {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::Baseline
        }
    }

    /// Whether two Finding entries denote the same observation.
    pub fn same_finding(self, a: &Value, b: &Value) -> bool {
        let base = source_of(a) == source_of(b) && title_of(a) == title_of(b);
        match self {
            Self::Baseline => base,
            Self::Strict => base && first_data(a) == first_data(b),
        }
    }
}

fn source_of(entry: &Value) -> Option<&str> {
    entry.get("source").and_then(Value::as_str)
}

pub(crate) fn title_of(entry: &Value) -> Option<&str> {
    entry
        .get("reference")
        .and_then(|r| r.get("title"))
        .and_then(Value::as_str)
}

fn first_data(entry: &Value) -> Option<&Value> {
    entry.get("data").and_then(|d| d.get(0))
}

/// Clean up common LLM output mistakes before merging.
pub fn repair_llm_updates(updates: Map<String, Value>) -> Map<String, Value> {
    let mut repaired = Map::new();

    for (key, value) in updates {
        match (key.as_str(), value) {
            ("toxicology", Value::Object(nested)) => {
                for (inner_key, inner_value) in nested {
                    repaired.insert(inner_key, inner_value);
                }
            }
            ("INCI", value) => {
                repaired.insert("inci".to_string(), value);
            }
            (_, value) => {
                repaired.insert(key, value);
            }
        }
    }

    repaired.retain(|key, value| {
        let placeholder = is_ellipsis_placeholder(value);
        if placeholder {
            tracing::debug!(field = %key, "Dropping placeholder list from LLM output");
        }
        !placeholder
    });
    repaired
}

fn is_ellipsis_placeholder(value: &Value) -> bool {
    matches!(value.as_array().map(Vec::as_slice), Some([Value::String(s)]) if s == "...")
}

/// Append each new entry, overwriting the keys of an existing entry with the
/// same identity instead of adding a duplicate.
pub fn merge_findings(existing: &mut Vec<Value>, incoming: &[Value], mode: DedupMode) {
    for entry in incoming {
        let position = existing.iter().position(|e| mode.same_finding(e, entry));
        match (position, entry.as_object()) {
            (Some(i), Some(fields)) => {
                if let Some(target) = existing[i].as_object_mut() {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                } else {
                    existing[i] = entry.clone();
                }
            }
            _ => existing.push(entry.clone()),
        }
    }
}

/// Append entries whose `reference.title` is not yet present; a match is
/// replaced in place. Used by the form applicators.
pub fn append_unique_by_title(existing: &mut Vec<Value>, entry: Value) {
    let title = title_of(&entry).map(str::to_string);
    match existing
        .iter()
        .position(|e| title.is_some() && title_of(e) == title.as_deref())
    {
        Some(i) => existing[i] = entry,
        None => existing.push(entry),
    }
}

/// Merge changed top-level fields into a copy of `document`.
pub fn merge_updates(document: &Value, updates: Map<String, Value>, mode: DedupMode) -> Value {
    let mut merged = document.clone();
    if !merged.is_object() {
        merged = Value::Object(Map::new());
    }

    for (key, value) in updates {
        if key == "inci" {
            match value.as_str() {
                Some(name) => set_inci(&mut merged, name),
                None => {
                    if let Some(obj) = merged.as_object_mut() {
                        obj.insert("inci_ori".to_string(), value.clone());
                        obj.insert(key, value);
                    }
                }
            }
            continue;
        }

        let non_empty_list = value.as_array().is_some_and(|a| !a.is_empty());
        let kind = field_kind(&key);

        let Some(obj) = merged.as_object_mut() else {
            break;
        };

        match (kind, value) {
            (Some(FieldKind::Finding), Value::Array(incoming)) if non_empty_list => {
                let slot = obj.entry(key).or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                if let Some(existing) = slot.as_array_mut() {
                    merge_findings(existing, &incoming, mode);
                }
            }
            (_, value) => {
                obj.insert(key, value);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blank_template;
    use serde_json::json;

    fn finding(source: &str, title: &str, data: &str) -> Value {
        json!({
            "reference": {"title": title, "link": null},
            "data": [data],
            "source": source,
            "statement": null,
            "replaced": {"replaced_inci": "", "replaced_type": ""}
        })
    }

    #[test]
    fn repair_renames_flattens_and_drops_placeholders() {
        let raw = json!({
            "INCI": "GLYCERIN",
            "toxicology": {"DAP": [{"value": 5}]},
            "acute_toxicity": ["..."]
        });
        let repaired = repair_llm_updates(raw.as_object().unwrap().clone());
        assert_eq!(repaired["inci"], "GLYCERIN");
        assert_eq!(repaired["DAP"][0]["value"], 5);
        assert!(!repaired.contains_key("acute_toxicity"));
        assert!(!repaired.contains_key("INCI"));
        assert!(!repaired.contains_key("toxicology"));
    }

    #[test]
    fn same_finding_twice_leaves_one_entry_with_second_fields() {
        let mut list = Vec::new();
        merge_findings(&mut list, &[finding("echa", "Dossier", "first")], DedupMode::Baseline);
        merge_findings(&mut list, &[finding("echa", "Dossier", "second")], DedupMode::Baseline);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["data"], json!(["second"]));
    }

    #[test]
    fn strict_mode_keeps_entries_with_different_first_data() {
        let mut list = Vec::new();
        merge_findings(&mut list, &[finding("echa", "Dossier", "first")], DedupMode::Strict);
        merge_findings(&mut list, &[finding("echa", "Dossier", "second")], DedupMode::Strict);
        assert_eq!(list.len(), 2);

        merge_findings(&mut list, &[finding("echa", "Dossier", "second")], DedupMode::Strict);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn overwrite_keeps_keys_the_new_entry_lacks() {
        let mut list = vec![finding("cir", "Report", "x")];
        let partial = json!({"source": "cir", "reference": {"title": "Report"}, "statement": "s"});
        merge_findings(&mut list, &[partial], DedupMode::Baseline);
        assert_eq!(list[0]["statement"], "s");
        assert_eq!(list[0]["data"], json!(["x"]));
    }

    #[test]
    fn metrics_are_replaced_wholesale() {
        let mut doc = blank_template();
        doc["NOAEL"] = json!([{"value": 100}]);
        let updates = json!({"NOAEL": [{"value": 200}]});
        let merged = merge_updates(&doc, updates.as_object().unwrap().clone(), DedupMode::Baseline);
        assert_eq!(merged["NOAEL"], json!([{"value": 200}]));
    }

    #[test]
    fn inci_update_sets_inci_ori() {
        let updates = json!({"inci": "L-MENTHOL"});
        let merged = merge_updates(
            &blank_template(),
            updates.as_object().unwrap().clone(),
            DedupMode::Baseline,
        );
        assert_eq!(merged["inci"], "L-MENTHOL");
        assert_eq!(merged["inci_ori"], "L-MENTHOL");
    }

    #[test]
    fn null_inci_also_overwrites_inci_ori() {
        let mut doc = blank_template();
        set_inci(&mut doc, "GLYCERIN");
        let updates = json!({"inci": null});
        let merged = merge_updates(&doc, updates.as_object().unwrap().clone(), DedupMode::Baseline);
        assert_eq!(merged["inci"], Value::Null);
        assert_eq!(merged["inci_ori"], Value::Null);
    }

    #[test]
    fn empty_finding_list_is_assigned_directly() {
        let mut doc = blank_template();
        doc["phototoxicity"] = json!([finding("a", "b", "c")]);
        let updates = json!({"phototoxicity": [], "category": "HUMECTANT"});
        let merged = merge_updates(&doc, updates.as_object().unwrap().clone(), DedupMode::Baseline);
        assert_eq!(merged["phototoxicity"], json!([]));
        assert_eq!(merged["category"], "HUMECTANT");
    }

    #[test]
    fn merge_does_not_touch_input() {
        let doc = blank_template();
        let snapshot = doc.clone();
        let updates = json!({"acute_toxicity": [finding("s", "t", "d")]});
        let merged = merge_updates(&doc, updates.as_object().unwrap().clone(), DedupMode::Baseline);
        assert_eq!(doc, snapshot);
        assert_eq!(merged["acute_toxicity"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn append_unique_by_title_replaces_match() {
        let mut list = vec![finding("a", "T", "old")];
        append_unique_by_title(&mut list, finding("b", "T", "new"));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["source"], "b");
        append_unique_by_title(&mut list, finding("b", "U", "other"));
        assert_eq!(list.len(), 2);
    }
}
