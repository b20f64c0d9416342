//! Schema-aware validation and copy-on-write application of a single patch.

use serde_json::Value;
use thiserror::Error;

use crate::models::{
    finding_key_default, is_finding_field, is_metric_field, PatchOpKind, PatchOperation,
    FINDING_KEYS,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("add and replace operations require a value")]
    MissingValue,

    #[error("path must start with '/', got {0:?}")]
    RelativePath(String),

    #[error("path {0:?} does not name a top-level field")]
    NoField(String),

    #[error("finding entry for {field} must be an object")]
    FindingNotObject { field: String },

    #[error("metric value for {field} must be a number, string or object")]
    MetricValueKind { field: String },

    #[error("path {0:?} does not resolve to an existing location")]
    TargetMissing(String),

    #[error("index {index} out of range for {path:?} (length {len})")]
    IndexOutOfRange { path: String, index: usize, len: usize },

    #[error("invalid array index {token:?} in {path:?}")]
    BadIndex { path: String, token: String },

    #[error("cannot descend into a scalar at {0:?}")]
    NotContainer(String),
}

/// Check an operation against the document schema, repairing what can be
/// repaired. A finding entry missing any of its five keys gets defaults.
/// An entry-level add on a metric list becomes an add of the whole field,
/// so metrics hold only the latest value.
pub fn validate_patch(op: &PatchOperation) -> Result<PatchOperation, PatchError> {
    let needs_value = matches!(op.op, PatchOpKind::Add | PatchOpKind::Replace);
    if needs_value && op.value.as_ref().map_or(true, Value::is_null) {
        return Err(PatchError::MissingValue);
    }

    if !op.path.starts_with('/') {
        return Err(PatchError::RelativePath(op.path.clone()));
    }

    let field = op
        .top_level_field()
        .ok_or_else(|| PatchError::NoField(op.path.clone()))?
        .to_string();

    let mut repaired = op.clone();

    // Only "/<field>/<index or ->" adds carry a single entry; "/<field>"
    // adds replace the list and deeper paths edit inside an entry.
    let targets_element = split_pointer(&op.path).len() == 2;

    if op.op == PatchOpKind::Add && targets_element && is_finding_field(&field) {
        let entry = repaired
            .value
            .as_mut()
            .and_then(Value::as_object_mut)
            .ok_or_else(|| PatchError::FindingNotObject {
                field: field.clone(),
            })?;
        let missing: Vec<&str> = FINDING_KEYS
            .iter()
            .copied()
            .filter(|k| !entry.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(field = %field, ?missing, "Finding entry missing keys, filling defaults");
            for key in missing {
                entry.insert(key.to_string(), finding_key_default(key));
            }
        }
    }

    if op.op == PatchOpKind::Add && targets_element && is_metric_field(&field) {
        let value = match repaired.value.take() {
            Some(v @ (Value::Number(_) | Value::String(_) | Value::Object(_))) => v,
            _ => return Err(PatchError::MetricValueKind { field }),
        };
        tracing::debug!(field = %field, path = %op.path, "Metric entry add replaces the whole field");
        repaired = PatchOperation::add(format!("/{field}"), Value::Array(vec![value]));
    }

    Ok(repaired)
}

/// Validate, then apply to a copy of `document`. The input is never
/// touched; on error nothing of the operation is visible anywhere.
pub fn apply_patch(document: &Value, op: &PatchOperation) -> Result<Value, PatchError> {
    apply_validated(document, &validate_patch(op)?)
}

/// Apply an operation that already went through [`validate_patch`] to a
/// copy of `document`.
pub fn apply_validated(document: &Value, op: &PatchOperation) -> Result<Value, PatchError> {
    let mut updated = document.clone();
    apply_in_place(&mut updated, op)?;
    Ok(updated)
}

/// RFC 6902 add/remove/replace on an already-validated operation.
pub(crate) fn apply_in_place(doc: &mut Value, op: &PatchOperation) -> Result<(), PatchError> {
    let tokens = split_pointer(&op.path);
    let (last, parents) = tokens
        .split_last()
        .ok_or_else(|| PatchError::NoField(op.path.clone()))?;

    let mut parent = doc;
    for token in parents {
        parent = match parent {
            Value::Object(map) => map
                .get_mut(token.as_str())
                .ok_or_else(|| PatchError::TargetMissing(op.path.clone()))?,
            Value::Array(items) => {
                let len = items.len();
                let index = parse_index(&op.path, token)?;
                items.get_mut(index).ok_or(PatchError::IndexOutOfRange {
                    path: op.path.clone(),
                    index,
                    len,
                })?
            }
            _ => return Err(PatchError::NotContainer(op.path.clone())),
        };
    }

    let value = op.value.clone().unwrap_or(Value::Null);

    match (op.op, parent) {
        (PatchOpKind::Add, Value::Object(map)) => {
            map.insert(last.clone(), value);
        }
        (PatchOpKind::Replace, Value::Object(map)) => {
            let slot = map
                .get_mut(last.as_str())
                .ok_or_else(|| PatchError::TargetMissing(op.path.clone()))?;
            *slot = value;
        }
        (PatchOpKind::Remove, Value::Object(map)) => {
            map.remove(last.as_str())
                .ok_or_else(|| PatchError::TargetMissing(op.path.clone()))?;
        }
        (PatchOpKind::Add, Value::Array(items)) => {
            if last == "-" {
                items.push(value);
            } else {
                let index = parse_index(&op.path, last)?;
                if index > items.len() {
                    return Err(PatchError::IndexOutOfRange {
                        path: op.path.clone(),
                        index,
                        len: items.len(),
                    });
                }
                items.insert(index, value);
            }
        }
        (PatchOpKind::Replace, Value::Array(items)) => {
            let index = existing_index(&op.path, last, items.len())?;
            items[index] = value;
        }
        (PatchOpKind::Remove, Value::Array(items)) => {
            let index = existing_index(&op.path, last, items.len())?;
            items.remove(index);
        }
        (_, _) => return Err(PatchError::NotContainer(op.path.clone())),
    }
    Ok(())
}

/// Split a JSON pointer into unescaped reference tokens.
fn split_pointer(path: &str) -> Vec<String> {
    path.split('/')
        .skip(1)
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn parse_index(path: &str, token: &str) -> Result<usize, PatchError> {
    let leading_zero = token.len() > 1 && token.starts_with('0');
    if leading_zero || token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PatchError::BadIndex {
            path: path.to_string(),
            token: token.to_string(),
        });
    }
    token.parse().map_err(|_| PatchError::BadIndex {
        path: path.to_string(),
        token: token.to_string(),
    })
}

fn existing_index(path: &str, token: &str, len: usize) -> Result<usize, PatchError> {
    let index = parse_index(path, token)?;
    if index >= len {
        return Err(PatchError::IndexOutOfRange {
            path: path.to_string(),
            index,
            len,
        });
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blank_template;
    use serde_json::json;

    fn doc() -> Value {
        let mut d = blank_template();
        d["inci"] = json!("L-MENTHOL");
        d["NOAEL"] = json!([{"value": 100, "type": "NOAEL"}]);
        d
    }

    #[test]
    fn add_and_replace_need_a_value() {
        let err = validate_patch(&PatchOperation {
            op: PatchOpKind::Replace,
            path: "/inci".into(),
            value: None,
        })
        .unwrap_err();
        assert_eq!(err, PatchError::MissingValue);

        let null = PatchOperation::add("/NOAEL/-", Value::Null);
        assert_eq!(validate_patch(&null).unwrap_err(), PatchError::MissingValue);
    }

    #[test]
    fn path_must_be_absolute() {
        let err = validate_patch(&PatchOperation::replace("inci", json!("X"))).unwrap_err();
        assert!(matches!(err, PatchError::RelativePath(_)));
    }

    #[test]
    fn finding_add_fills_missing_keys() {
        let op = PatchOperation::add(
            "/acute_toxicity/-",
            json!({"data": ["LD50 = 500 mg/kg"], "source": "echa"}),
        );
        let repaired = validate_patch(&op).unwrap();
        let entry = repaired.value.unwrap();
        assert_eq!(entry["replaced"], json!({"replaced_inci": "", "replaced_type": ""}));
        assert_eq!(entry["reference"]["title"], "");
        assert_eq!(entry["statement"], "");
        assert_eq!(entry["data"], json!(["LD50 = 500 mg/kg"]));
    }

    #[test]
    fn finding_add_rejects_scalar_entry() {
        let op = PatchOperation::add("/acute_toxicity/-", json!("LD50 = 500"));
        assert!(matches!(
            validate_patch(&op).unwrap_err(),
            PatchError::FindingNotObject { .. }
        ));
    }

    #[test]
    fn metric_add_rejects_booleans_and_arrays() {
        for bad in [json!(true), json!([1])] {
            let op = PatchOperation::add("/DAP/-", bad);
            assert!(matches!(
                validate_patch(&op).unwrap_err(),
                PatchError::MetricValueKind { .. }
            ));
        }
        assert!(validate_patch(&PatchOperation::add("/DAP/-", json!(7))).is_ok());
        assert!(validate_patch(&PatchOperation::add("/DAP/-", json!("7%"))).is_ok());
    }

    #[test]
    fn finding_append_and_index_insert() {
        let mut original = doc();
        original["skin_irritation"] = json!([{"source": "cir"}]);
        let entry = json!({"source": "echa", "data": ["mild"]});

        let appended =
            apply_patch(&original, &PatchOperation::add("/skin_irritation/-", entry.clone()))
                .unwrap();
        assert_eq!(appended["skin_irritation"].as_array().unwrap().len(), 2);
        assert_eq!(appended["skin_irritation"][1]["source"], "echa");

        let inserted =
            apply_patch(&original, &PatchOperation::add("/skin_irritation/0", entry)).unwrap();
        assert_eq!(inserted["skin_irritation"][0]["source"], "echa");
        assert_eq!(inserted["skin_irritation"][1]["source"], "cir");
    }

    #[test]
    fn metric_entry_add_replaces_the_whole_field() {
        let original = doc();
        for path in ["/NOAEL/-", "/NOAEL/0", "/NOAEL/1"] {
            let op = PatchOperation::add(path, json!({"value": 300, "type": "NOAEL"}));
            let valid = validate_patch(&op).unwrap();
            assert_eq!(valid.path, "/NOAEL");
            assert_eq!(valid.summary(), "add at /NOAEL");

            let updated = apply_patch(&original, &op).unwrap();
            assert_eq!(updated["NOAEL"], json!([{"value": 300, "type": "NOAEL"}]));
        }

        let scalar = apply_patch(&blank_template(), &PatchOperation::add("/DAP/-", json!(7)))
            .unwrap();
        assert_eq!(scalar["DAP"], json!([7]));
    }

    #[test]
    fn deep_paths_are_not_entry_adds() {
        let mut original = doc();
        original["acute_toxicity"] = json!([{"data": ["a"], "source": "cir"}]);

        let op = PatchOperation::add("/acute_toxicity/0/data/-", json!("b"));
        let updated = apply_patch(&original, &op).unwrap();
        assert_eq!(updated["acute_toxicity"][0]["data"], json!(["a", "b"]));

        let op = PatchOperation::add("/NOAEL/0/note", json!("oral"));
        let updated = apply_patch(&original, &op).unwrap();
        assert_eq!(updated["NOAEL"][0]["note"], "oral");
        assert_eq!(updated["NOAEL"][0]["value"], 100);
    }

    #[test]
    fn apply_validated_skips_repair() {
        let op = PatchOperation::add("/acute_toxicity/-", json!({"source": "echa"}));
        let valid = validate_patch(&op).unwrap();
        let once = apply_validated(&doc(), &valid).unwrap();
        assert_eq!(once, apply_patch(&doc(), &op).unwrap());
        assert_eq!(once["acute_toxicity"][0], valid.value.unwrap());
    }

    #[test]
    fn replace_scalar_field() {
        let updated =
            apply_patch(&doc(), &PatchOperation::replace("/inci", json!("GLYCERIN"))).unwrap();
        assert_eq!(updated["inci"], "GLYCERIN");
    }

    #[test]
    fn remove_element_and_nested_replace() {
        let removed = apply_patch(&doc(), &PatchOperation::remove("/NOAEL/0")).unwrap();
        assert_eq!(removed["NOAEL"], json!([]));

        let nested =
            apply_patch(&doc(), &PatchOperation::replace("/NOAEL/0/value", json!(300))).unwrap();
        assert_eq!(nested["NOAEL"][0]["value"], 300);
    }

    #[test]
    fn out_of_range_leaves_input_untouched() {
        let original = doc();
        let snapshot = original.clone();
        let err = apply_patch(&original, &PatchOperation::remove("/NOAEL/5")).unwrap_err();
        assert_eq!(
            err,
            PatchError::IndexOutOfRange {
                path: "/NOAEL/5".into(),
                index: 5,
                len: 1
            }
        );
        assert_eq!(original, snapshot);
    }

    #[test]
    fn missing_targets_are_rejected() {
        let d = doc();
        assert!(matches!(
            apply_patch(&d, &PatchOperation::replace("/unknown", json!(1))).unwrap_err(),
            PatchError::TargetMissing(_)
        ));
        assert!(matches!(
            apply_patch(&d, &PatchOperation::replace("/NOAEL/x", json!(1))).unwrap_err(),
            PatchError::BadIndex { .. }
        ));
        assert!(matches!(
            apply_patch(&d, &PatchOperation::add("/inci/x", json!(1))).unwrap_err(),
            PatchError::NotContainer(_)
        ));
    }

    #[test]
    fn escaped_pointer_tokens() {
        let d = json!({"a/b": 1, "c~d": 2});
        let updated = apply_patch(&d, &PatchOperation::replace("/a~1b", json!(9))).unwrap();
        assert_eq!(updated["a/b"], 9);
        let updated = apply_patch(&d, &PatchOperation::remove("/c~0d")).unwrap();
        assert!(updated.get("c~d").is_none());
    }
}
