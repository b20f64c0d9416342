use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EditError;
use crate::models::{EditIntent, PatchOperation};

/// The LLM oracle. Every call is synchronous and bounded by the client's timeout.
pub trait LlmClient {
    /// Free-text completion.
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, EditError>;

    /// Completion constrained to a JSON schema; returns the decoded object.
    fn generate_structured(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        schema: &Value,
    ) -> Result<Value, EditError>;
}

/// Where LOAD takes the starting document from.
#[derive(Debug, Clone, Default)]
pub enum InitialDocument {
    /// Latest stored version, else the blank template.
    #[default]
    FromStore,
    /// Latest stored version, else this seed, else the blank template.
    Seed(Value),
    /// Use this document as-is without reading the store.
    Cached(Value),
}

/// One call to `edit`.
#[derive(Debug, Clone, Default)]
pub struct EditRequest {
    /// Existing conversation to continue; a new id is minted when absent.
    pub conversation_id: Option<String>,
    pub instruction: String,
    pub inci_name: Option<String>,
    pub initial: InitialDocument,
    /// Tags the saved version as part of a batch run.
    pub batch_id: Option<String>,
}

impl EditRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn for_inci(mut self, inci_name: impl Into<String>) -> Self {
        self.inci_name = Some(inci_name.into());
        self
    }

    pub fn with_seed(mut self, seed: Value) -> Self {
        self.initial = InitialDocument::Seed(seed);
        self
    }

    pub fn with_cached(mut self, document: Value) -> Self {
        self.initial = InitialDocument::Cached(document);
        self
    }

    pub fn in_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

/// Result of one `edit`: the saved document and how it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditOutcome {
    pub conversation_id: String,
    pub version: i64,
    pub document: Value,
    pub response: String,
    pub intent: EditIntent,
    pub error: Option<String>,
    pub fast_done: bool,
    pub patch_success: bool,
    pub fallback_used: bool,
    pub patches: Vec<PatchOperation>,
    pub summary: String,
}
