use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::LlmClient;
use super::EditError;

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client pointing at an Ollama instance. Every call is bounded
    /// by `timeout_secs`.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, EditError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EditError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> EditError {
        if e.is_connect() {
            EditError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            EditError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
        } else {
            EditError::HttpClient(e.to_string())
        }
    }

    fn post_generate(&self, body: &OllamaGenerateRequest<'_>) -> Result<String, EditError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EditError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| EditError::LlmOutputMalformed(e.to_string()))?;

        Ok(parsed.response)
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, EditError> {
        tracing::debug!(model, prompt_len = prompt.len(), "LLM free-text call");
        self.post_generate(&OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            format: None,
            options: OllamaOptions { temperature: 0.0 },
        })
    }

    fn generate_structured(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        schema: &Value,
    ) -> Result<Value, EditError> {
        tracing::debug!(model, prompt_len = prompt.len(), "LLM structured call");
        let raw = self.post_generate(&OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            format: Some(schema),
            options: OllamaOptions { temperature: 0.0 },
        })?;
        serde_json::from_str(raw.trim()).map_err(|e| EditError::LlmOutputMalformed(e.to_string()))
    }
}

/// Scripted LLM client for tests.
///
/// Replies are consumed in order; the last one repeats once the script runs
/// out. `unreachable()` fails every call like a stopped server.
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    unreachable: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::sequence(vec![response])
    }

    pub fn sequence(responses: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            last: Mutex::new(None),
            unreachable: false,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::sequence(Vec::new())
        }
    }

    /// Number of generate calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self, prompt: &str) -> Result<String, EditError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.unreachable {
            return Err(EditError::OllamaConnection("mock://offline".into()));
        }

        let mut replies = self
            .replies
            .lock()
            .map_err(|_| EditError::HttpClient("mock lock poisoned".into()))?;
        let mut last = self
            .last
            .lock()
            .map_err(|_| EditError::HttpClient("mock lock poisoned".into()))?;

        if let Some(reply) = replies.pop_front() {
            *last = Some(reply.clone());
            return Ok(reply);
        }
        Ok(last.clone().unwrap_or_default())
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, prompt: &str, _system: &str) -> Result<String, EditError> {
        self.next_reply(prompt)
    }

    fn generate_structured(
        &self,
        _model: &str,
        prompt: &str,
        _system: &str,
        _schema: &Value,
    ) -> Result<Value, EditError> {
        let raw = self.next_reply(prompt)?;
        serde_json::from_str(raw.trim()).map_err(|e| EditError::LlmOutputMalformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("test response");
        let result = client.generate("model", "prompt", "system").unwrap();
        assert_eq!(result, "test response");
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn mock_sequence_repeats_last_reply() {
        let client = MockLlmClient::sequence(vec!["one", "two"]);
        assert_eq!(client.generate("m", "a", "").unwrap(), "one");
        assert_eq!(client.generate("m", "b", "").unwrap(), "two");
        assert_eq!(client.generate("m", "c", "").unwrap(), "two");
        assert_eq!(client.prompts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn mock_structured_rejects_non_json() {
        let client = MockLlmClient::new("not json");
        let err = client
            .generate_structured("m", "p", "", &Value::Null)
            .unwrap_err();
        assert!(matches!(err, EditError::LlmOutputMalformed(_)));
    }

    #[test]
    fn unreachable_mock_fails_with_connection_error() {
        let client = MockLlmClient::unreachable();
        let err = client.generate("m", "p", "").unwrap_err();
        assert!(matches!(err, EditError::OllamaConnection(_)));
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.timeout_secs, 60);
    }

    #[test]
    fn unreachable_server_maps_to_connection_error() {
        // Port 9 (discard) is closed on test machines.
        let client = OllamaClient::new("http://127.0.0.1:9", 2).unwrap();
        let err = client.generate("m", "p", "s").unwrap_err();
        assert!(matches!(
            err,
            EditError::OllamaConnection(_) | EditError::HttpClient(_)
        ));
    }

    #[test]
    fn structured_request_carries_schema_format() {
        let schema = serde_json::json!({"type": "object"});
        let body = OllamaGenerateRequest {
            model: "m",
            prompt: "p",
            system: "s",
            stream: false,
            format: Some(&schema),
            options: OllamaOptions { temperature: 0.0 },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["format"]["type"], "object");
        assert_eq!(v["stream"], false);
    }
}
