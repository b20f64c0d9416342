use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::PatchOpKind;

/// One add/remove/replace instruction addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOpKind::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOpKind::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    /// First path segment, e.g. `NOAEL` for `/NOAEL/0`.
    pub fn top_level_field(&self) -> Option<&str> {
        self.path
            .strip_prefix('/')
            .and_then(|rest| rest.split('/').next())
            .filter(|s| !s.is_empty())
    }

    /// Short audit label, e.g. `remove at /NOAEL/0`.
    pub fn summary(&self) -> String {
        format!("{} at {}", self.op, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_field_from_path() {
        assert_eq!(
            PatchOperation::remove("/NOAEL/0").top_level_field(),
            Some("NOAEL")
        );
        assert_eq!(
            PatchOperation::replace("/inci", json!("X")).top_level_field(),
            Some("inci")
        );
        assert_eq!(PatchOperation::remove("inci").top_level_field(), None);
        assert_eq!(PatchOperation::remove("/").top_level_field(), None);
    }

    #[test]
    fn remove_omits_value_on_the_wire() {
        let v = serde_json::to_value(PatchOperation::remove("/DAP/0")).unwrap();
        assert_eq!(v, json!({"op": "remove", "path": "/DAP/0"}));
    }

    #[test]
    fn null_value_deserializes_as_none() {
        let op: PatchOperation =
            serde_json::from_value(json!({"op": "add", "path": "/NOAEL/-", "value": null}))
                .unwrap();
        assert!(op.value.is_none());
    }
}
