//! Shared application state, built once at startup and handed to the
//! HTTP layer behind an `Arc`.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{DatabaseError, SqliteVersionStore, VersionStore};
use crate::pipeline::editing::{EditError, EditOrchestrator, LlmClient, OllamaClient};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Version store could not be opened: {0}")]
    Database(#[from] DatabaseError),
    #[error("LLM client could not be built: {0}")]
    Llm(#[from] EditError),
}

pub struct CoreState {
    pub config: AppConfig,
    store: Arc<dyn VersionStore>,
    orchestrator: EditOrchestrator,
}

impl CoreState {
    /// Open the configured database and connect the Ollama client.
    pub fn from_config(config: AppConfig) -> Result<Self, CoreError> {
        let store: Arc<dyn VersionStore> = Arc::new(SqliteVersionStore::open(&config.db_path)?);
        let llm = OllamaClient::new(&config.ollama_url, config.llm_timeout_secs)?;
        tracing::info!(
            db_path = %config.db_path.display(),
            ollama_url = %config.ollama_url,
            model = %config.model,
            dedup = ?config.dedup_mode(),
            "Core state ready"
        );
        Ok(Self::with_parts(config, store, Box::new(llm)))
    }

    /// Assemble from explicit parts. Tests pass an in-memory store and a
    /// scripted LLM here.
    pub fn with_parts(
        config: AppConfig,
        store: Arc<dyn VersionStore>,
        llm: Box<dyn LlmClient + Send + Sync>,
    ) -> Self {
        let orchestrator = EditOrchestrator::new(store.clone(), llm, config.model.clone())
            .with_dedup_mode(config.dedup_mode());
        Self {
            config,
            store,
            orchestrator,
        }
    }

    pub fn store(&self) -> &dyn VersionStore {
        self.store.as_ref()
    }

    pub fn orchestrator(&self) -> &EditOrchestrator {
        &self.orchestrator
    }
}
