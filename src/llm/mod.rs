//! Language-model client seam.
//!
//! Narrative generation, diagram planning and diagram-source generation all
//! go through `LlmClient`. Two HTTP back ends exist (local Ollama, hosted
//! Gemini); `MockLlmClient` serves tests.

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::config::LlmProvider;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM service is not reachable at {0}")]
    Connection(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// Blocking text generation against a fixed model.
pub trait LlmClient: Send + Sync {
    /// Generate a completion for `prompt`. `system` may be empty.
    fn generate(&self, prompt: &str, system: &str) -> Result<String, LlmError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Construct the configured back end.
pub fn client_for(provider: &LlmProvider, timeout: Duration) -> Arc<dyn LlmClient> {
    match provider {
        LlmProvider::Ollama { base_url, model } => {
            Arc::new(OllamaClient::new(base_url, model, timeout.as_secs()))
        }
        LlmProvider::Gemini { api_key, model } => {
            Arc::new(GeminiClient::new(api_key, model, timeout.as_secs()))
        }
    }
}

pub(crate) fn map_send_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> LlmError {
    if e.is_connect() {
        LlmError::Connection(base_url.to_string())
    } else if e.is_timeout() {
        LlmError::Timeout(timeout_secs)
    } else {
        LlmError::HttpClient(e.to_string())
    }
}

/// Mock LLM client for testing. Replays scripted responses in order.
///
/// Once the script is exhausted the last entry repeats. Every prompt is
/// recorded so tests can assert on what was asked.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    last: Mutex<Option<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    /// A client whose every call fails with `LlmError::Connection`.
    pub fn failing() -> Self {
        Self::scripted(vec![Err("mock".to_string())])
    }

    pub fn scripted(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = {
            let mut script = self
                .script
                .lock()
                .map_err(|_| LlmError::HttpClient("mock lock poisoned".into()))?;
            script.pop_front()
        };
        let mut last = self
            .last
            .lock()
            .map_err(|_| LlmError::HttpClient("mock lock poisoned".into()))?;
        let entry = match next {
            Some(entry) => {
                *last = Some(entry.clone());
                entry
            }
            None => last.clone().unwrap_or_else(|| Ok(String::new())),
        };
        entry.map_err(LlmError::Connection)
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("test response");
        assert_eq!(client.generate("prompt", "").unwrap(), "test response");
        assert_eq!(client.prompts(), vec!["prompt".to_string()]);
    }

    #[test]
    fn mock_client_replays_script_then_repeats_last() {
        let client = MockLlmClient::scripted(vec![Ok("one".into()), Err("down".into())]);
        assert_eq!(client.generate("a", "").unwrap(), "one");
        assert!(matches!(client.generate("b", ""), Err(LlmError::Connection(_))));
        assert!(matches!(client.generate("c", ""), Err(LlmError::Connection(_))));
        assert_eq!(client.prompts().len(), 3);
    }

    #[test]
    fn client_for_selects_backend() {
        let ollama = client_for(
            &LlmProvider::Ollama {
                base_url: "http://localhost:11434".into(),
                model: "llama3.1".into(),
            },
            Duration::from_secs(5),
        );
        assert_eq!(ollama.model(), "llama3.1");

        let gemini = client_for(
            &LlmProvider::Gemini {
                api_key: "key".into(),
                model: "gemini-1.5-flash".into(),
            },
            Duration::from_secs(5),
        );
        assert_eq!(gemini.model(), "gemini-1.5-flash");
    }

    #[test]
    fn traits_are_object_safe() {
        fn _assert_client(_: &dyn LlmClient) {}
    }
}
