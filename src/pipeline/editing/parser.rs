//! Lenient parsing of user input and LLM output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::EditError;
use crate::models::{EditIntent, PatchOperation};

/// Reduce raw LLM text to its JSON payload: drop leading prose, markdown
/// fences and trailing prose. Spans from the first `{`/`[` to the last `}`/`]`.
pub fn clean_llm_json_output(content: &str) -> String {
    let mut clean = content.trim();

    if let Some(start) = clean.find(['{', '[']) {
        clean = &clean[start..];
    }
    clean = clean.trim_start_matches("```json").trim_start_matches("```");
    clean = clean.trim_end_matches("```").trim();

    if let Some(end) = clean.rfind(['}', ']']) {
        clean = &clean[..=end];
    }
    clean.to_string()
}

/// Decode the full-document fallback reply into a map of changed fields.
pub fn parse_fallback_updates(content: &str) -> Result<Map<String, Value>, EditError> {
    let cleaned = clean_llm_json_output(content);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(EditError::LlmOutputMalformed(format!(
            "expected a JSON object of changed fields, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(EditError::LlmOutputMalformed(e.to_string())),
    }
}

/// Interpret structured LLM output as one patch operation.
pub fn parse_patch_operation(value: Value) -> Result<PatchOperation, EditError> {
    // Some models wrap the operation in a one-element array.
    let value = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    serde_json::from_value(value).map_err(|e| EditError::LlmOutputMalformed(e.to_string()))
}

/// Accept an intent label from the classifier LLM, tolerating case and punctuation.
pub fn parse_intent_label(raw: &str) -> Option<EditIntent> {
    let label: String = raw
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .to_uppercase();
    label.parse().ok()
}

/// JSON object in user input: the whole input, else the first balanced
/// `{...}` block (covers an `INCI: <name>` line before the object).
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str(text) {
        return Some(map);
    }

    let start = text.find('{')?;
    let end = balanced_end(&text[start..], '{', '}')?;
    match serde_json::from_str(&text[start..start + end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Byte length of the balanced block opening at `s[0]`, string-literal aware.
pub(crate) fn balanced_end(s: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

static INCI_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"inci_name\s*=\s*["']?([^"'\n]+)["']?"#).unwrap());

static INCI_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"INCI[：:]\s*([^\n]+)").unwrap());

/// Ingredient name named in an instruction: `inci_name = "X"` or `INCI: X`.
pub fn extract_inci_name(text: &str) -> Option<String> {
    let captured = INCI_ASSIGNMENT
        .captures(text)
        .or_else(|| INCI_LABEL.captures(text))?;
    let name = captured.get(1)?.as_str().trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatchOpKind;
    use serde_json::json;

    #[test]
    fn clean_strips_fences_and_prose() {
        let raw = "Here you go:\n```json\n{\"NOAEL\": []}\n```\nHope this helps!";
        assert_eq!(clean_llm_json_output(raw), "{\"NOAEL\": []}");
    }

    #[test]
    fn clean_keeps_top_level_array() {
        assert_eq!(clean_llm_json_output("result: [1, 2] done"), "[1, 2]");
    }

    #[test]
    fn fallback_updates_decode_object() {
        let updates = parse_fallback_updates("```json\n{\"inci\": \"X\"}\n```").unwrap();
        assert_eq!(updates["inci"], "X");
    }

    #[test]
    fn fallback_updates_reject_truncated_output() {
        let err = parse_fallback_updates("{\"NOAEL\": [{\"value\": 1").unwrap_err();
        assert!(matches!(err, EditError::LlmOutputMalformed(_)));
    }

    #[test]
    fn fallback_updates_reject_array() {
        let err = parse_fallback_updates("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn patch_operation_from_structured_output() {
        let op = parse_patch_operation(json!({"op": "add", "path": "/NOAEL/-", "value": 100}))
            .unwrap();
        assert_eq!(op.op, PatchOpKind::Add);
        assert_eq!(op.value, Some(json!(100)));

        let wrapped =
            parse_patch_operation(json!([{"op": "remove", "path": "/DAP/0"}])).unwrap();
        assert_eq!(wrapped.op, PatchOpKind::Remove);

        assert!(parse_patch_operation(json!({"op": "move", "path": "/a"})).is_err());
    }

    #[test]
    fn intent_label_is_lenient() {
        assert_eq!(parse_intent_label(" no_edit.\n"), Some(EditIntent::NoEdit));
        assert_eq!(parse_intent_label("\"FORM_EDIT_RAW\""), Some(EditIntent::FormEditRaw));
        assert_eq!(parse_intent_label("I think it is an edit"), None);
    }

    #[test]
    fn json_object_with_inci_prefix() {
        let map = extract_json_object("INCI: L-MENTHOL\n{\"noael\": {\"value\": 100}}").unwrap();
        assert_eq!(map["noael"]["value"], 100);
    }

    #[test]
    fn json_object_ignores_braces_in_strings() {
        let map = extract_json_object("x {\"note\": \"a } b\", \"v\": {\"w\": 1}} y").unwrap();
        assert_eq!(map["v"]["w"], 1);
    }

    #[test]
    fn non_json_input_has_no_object() {
        assert!(extract_json_object("Set NOAEL to 200").is_none());
        assert!(extract_json_object("[1, 2]").is_none());
        assert!(extract_json_object("").is_none());
    }

    #[test]
    fn inci_name_patterns() {
        assert_eq!(
            extract_inci_name("inci_name = \"GLYCERIN\" set DAP to 5").as_deref(),
            Some("GLYCERIN")
        );
        assert_eq!(
            extract_inci_name("INCI: L-MENTHOL\nNOAEL: 50").as_deref(),
            Some("L-MENTHOL")
        );
        assert_eq!(extract_inci_name("INCI：薄荷醇\n").as_deref(), Some("薄荷醇"));
        assert_eq!(extract_inci_name("Set NOAEL to 200"), None);
    }
}
