//! Sequential batch editing over isolated per-ingredient threads.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::orchestrator::EditOrchestrator;
use super::types::EditRequest;
use super::EditError;
use crate::models::{blank_template, PLACEHOLDER_INCI};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub inci_name: Option<String>,
    #[serde(default)]
    pub instruction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub patch_success_data: Vec<bool>,
    pub fallback_used_data: Vec<bool>,
    pub updated_data: Vec<Value>,
    pub data_count: usize,
    /// Ingredient name to the thread (conversation) id its edits went to.
    pub inci_thread_map: BTreeMap<String, String>,
    /// Version number each item wrote, in item order.
    pub versions: Vec<i64>,
}

/// Run every edit in order. Each distinct ingredient gets a fresh thread id
/// and starts from the blank template; repeated ingredients continue from
/// the batch cache without reading the store.
pub fn run_batch(
    orchestrator: &EditOrchestrator,
    batch_id: Option<String>,
    items: &[BatchItem],
) -> Result<BatchOutcome, EditError> {
    let batch_id = batch_id
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let _span = tracing::info_span!("batch", batch_id = %batch_id, items = items.len()).entered();

    let mut threads: BTreeMap<String, String> = BTreeMap::new();
    let mut cache: HashMap<String, Value> = HashMap::new();
    let mut outcome = BatchOutcome {
        batch_id: batch_id.clone(),
        patch_success_data: Vec::with_capacity(items.len()),
        fallback_used_data: Vec::with_capacity(items.len()),
        updated_data: Vec::with_capacity(items.len()),
        data_count: 0,
        inci_thread_map: BTreeMap::new(),
        versions: Vec::with_capacity(items.len()),
    };

    for item in items {
        let inci = item
            .inci_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(PLACEHOLDER_INCI)
            .to_string();

        let thread_id = threads
            .entry(inci.clone())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let starting = cache.get(&inci).cloned().unwrap_or_else(blank_template);

        let result = orchestrator.edit(
            EditRequest::new(item.instruction.clone())
                .in_conversation(thread_id.clone())
                .for_inci(inci.clone())
                .with_cached(starting)
                .in_batch(batch_id.clone()),
        )?;

        tracing::info!(
            inci = %inci,
            thread_id = %thread_id,
            version = result.version,
            patch_success = result.patch_success,
            fallback_used = result.fallback_used,
            "Batch item done"
        );

        cache.insert(inci, result.document.clone());
        outcome.patch_success_data.push(result.patch_success);
        outcome.fallback_used_data.push(result.fallback_used);
        outcome.versions.push(result.version);
        outcome.updated_data.push(result.document);
    }

    outcome.data_count = outcome.updated_data.len();
    outcome.inci_thread_map = threads;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteVersionStore, VersionStore};
    use crate::pipeline::editing::history::versions_by_batch;
    use crate::pipeline::editing::ollama::MockLlmClient;
    use std::sync::Arc;

    const DAP_PATCH: &str = r#"{"op": "add", "path": "/DAP/-", "value": 5}"#;

    fn item(inci: &str, instruction: &str) -> BatchItem {
        BatchItem {
            inci_name: Some(inci.into()),
            instruction: instruction.into(),
        }
    }

    #[test]
    fn repeated_ingredient_shares_thread_and_cache() {
        let store = Arc::new(SqliteVersionStore::in_memory().unwrap());
        let llm = MockLlmClient::sequence(vec![
            DAP_PATCH,
            r#"{"op": "add", "path": "/DAP/-", "value": 7}"#,
            r#"{"op": "add", "path": "/DAP/-", "value": 9}"#,
        ]);
        let orch = EditOrchestrator::new(store.clone(), Box::new(llm), "m");

        let outcome = run_batch(
            &orch,
            Some("batch-1".into()),
            &[
                item("L-MENTHOL", "Add DAP 5"),
                item("GLYCERIN", "Add DAP 7"),
                item("L-MENTHOL", "Add DAP 9"),
            ],
        )
        .unwrap();

        assert_eq!(outcome.batch_id, "batch-1");
        assert_eq!(outcome.data_count, 3);
        assert_eq!(outcome.inci_thread_map.len(), 2);
        assert_eq!(outcome.patch_success_data, vec![true, true, true]);
        assert_eq!(outcome.versions, vec![1, 1, 2]);

        // Third item continued the first item's thread; DAP holds one value.
        assert_eq!(outcome.updated_data[0]["DAP"], serde_json::json!([5]));
        assert_eq!(outcome.updated_data[1]["DAP"], serde_json::json!([7]));
        assert_eq!(outcome.updated_data[2]["DAP"], serde_json::json!([9]));
        assert_eq!(outcome.updated_data[0]["inci"], "L-MENTHOL");

        let menthol_thread = &outcome.inci_thread_map["L-MENTHOL"];
        let history = store.list_versions(menthol_thread).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.is_batch_item));
        assert!(history
            .iter()
            .all(|r| r.batch_id.as_deref() == Some("batch-1")));

        assert_eq!(versions_by_batch(store.as_ref(), "batch-1").unwrap().len(), 3);
    }

    #[test]
    fn batch_id_is_generated_when_absent() {
        let store = Arc::new(SqliteVersionStore::in_memory().unwrap());
        let orch = EditOrchestrator::new(store, Box::new(MockLlmClient::new(DAP_PATCH)), "m");
        let outcome = run_batch(&orch, None, &[item("X", "Add DAP 5")]).unwrap();
        assert!(Uuid::parse_str(&outcome.batch_id).is_ok());
    }

    #[test]
    fn empty_batch_is_empty() {
        let store = Arc::new(SqliteVersionStore::in_memory().unwrap());
        let orch = EditOrchestrator::new(store, Box::new(MockLlmClient::unreachable()), "m");
        let outcome = run_batch(&orch, None, &[]).unwrap();
        assert_eq!(outcome.data_count, 0);
        assert!(outcome.inci_thread_map.is_empty());
    }
}
