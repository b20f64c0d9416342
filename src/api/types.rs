//! Shared types for the API layer.

use std::sync::Arc;

use crate::api::error::ApiError;
use crate::core_state::CoreState;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }

    /// Run pipeline work off the async workers. Store access and LLM calls
    /// are synchronous and may block for the full LLM timeout.
    pub async fn blocking<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&CoreState) -> Result<T, ApiError> + Send + 'static,
    {
        let core = self.core.clone();
        tokio::task::spawn_blocking(move || work(&core)).await?
    }
}
