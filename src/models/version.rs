use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::patch::PatchOperation;

/// One immutable snapshot in a conversation's linear history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: i64,
    pub conversation_id: String,
    pub version: i64,
    pub data: Value,
    pub modification_summary: String,
    pub patch_operations: Option<Vec<PatchOperation>>,
    pub inci_name: Option<String>,
    pub batch_id: Option<String>,
    pub is_batch_item: bool,
    pub patch_success: bool,
    pub fallback_used: bool,
    pub content_hash: String,
    pub created_at: NaiveDateTime,
}

/// Everything the caller supplies when appending a version.
/// The store assigns `id`, `version`, `content_hash` and `created_at`.
#[derive(Debug, Clone, Default)]
pub struct NewVersion {
    pub data: Value,
    pub modification_summary: String,
    pub patch_operations: Option<Vec<PatchOperation>>,
    pub inci_name: Option<String>,
    pub batch_id: Option<String>,
    pub is_batch_item: bool,
    pub patch_success: bool,
    pub fallback_used: bool,
}

impl NewVersion {
    pub fn new(data: Value, summary: impl Into<String>) -> Self {
        Self {
            data,
            modification_summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_patches(mut self, patches: Vec<PatchOperation>) -> Self {
        self.patch_operations = if patches.is_empty() { None } else { Some(patches) };
        self
    }

    pub fn with_inci(mut self, inci: Option<&str>) -> Self {
        self.inci_name = inci
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase);
        self
    }

    pub fn with_batch(mut self, batch_id: Option<&str>) -> Self {
        self.is_batch_item = batch_id.is_some();
        self.batch_id = batch_id.map(str::to_string);
        self
    }

    pub fn with_flags(mut self, patch_success: bool, fallback_used: bool) -> Self {
        self.patch_success = patch_success;
        self.fallback_used = fallback_used;
        self
    }
}

/// SHA-256 of the document's canonical JSON, hex-encoded.
/// `serde_json` keeps object keys sorted, so equal documents hash equally.
pub fn content_hash(data: &Value) -> String {
    let bytes = serde_json::to_vec(data).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_hash_ignores_key_order() {
        let a = json!({"inci": "X", "DAP": []});
        let b: Value = serde_json::from_str(r#"{"DAP": [], "inci": "X"}"#).unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn inci_index_is_uppercased() {
        let v = NewVersion::new(json!({}), "s").with_inci(Some(" l-menthol "));
        assert_eq!(v.inci_name.as_deref(), Some("L-MENTHOL"));
        let blank = NewVersion::new(json!({}), "s").with_inci(Some("  "));
        assert!(blank.inci_name.is_none());
    }

    #[test]
    fn batch_tag_sets_flag() {
        let v = NewVersion::new(json!({}), "s").with_batch(Some("b-1"));
        assert!(v.is_batch_item);
        assert_eq!(v.batch_id.as_deref(), Some("b-1"));
    }
}
