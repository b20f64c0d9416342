pub mod batch;
pub mod classify;
pub mod diff;
pub mod extract;
pub mod fallback;
pub mod fast_path;
pub mod form;
pub mod history;
pub mod merge;
pub mod ollama;
pub mod orchestrator;
pub mod parser;
pub mod patch;
pub mod prompt;
pub mod types;

pub use batch::*;
pub use classify::*;
pub use diff::*;
pub use extract::*;
pub use fallback::*;
pub use fast_path::*;
pub use form::*;
pub use history::*;
pub use merge::*;
pub use ollama::*;
pub use orchestrator::*;
pub use parser::*;
pub use patch::*;
pub use prompt::*;
pub use types::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum EditError {
    #[error("LLM server is not reachable at {0}")]
    OllamaConnection(String),

    #[error("LLM server returned error (status {status}): {body}")]
    OllamaError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Could not classify instruction: {0}")]
    ClassificationAmbiguous(String),

    #[error("Patch rejected: {0}")]
    PatchInvalid(#[from] PatchError),

    #[error("LLM output was not valid JSON: {0}")]
    LlmOutputMalformed(String),

    #[error("Could not extract NOAEL or DAP data from the provided text")]
    ExtractionEmpty,

    #[error("Version store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No entry {index} in {field}")]
    FindingNotFound { field: String, index: usize },
}

impl EditError {
    /// Fatal errors abort the request; everything else degrades to a
    /// completed edit with `error` populated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::InvalidRequest(_))
    }
}
