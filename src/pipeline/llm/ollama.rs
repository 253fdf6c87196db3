use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GenerateOptions, LlmClient, LlmError};

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client pointing at an Ollama instance. The timeout bounds every
    /// call; a timed-out call is abandoned and reported as [`LlmError::Timeout`].
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            LlmError::Connection(self.base_url.clone())
        } else {
            LlmError::HttpClient(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl LlmClient for OllamaClient {
    fn generate(
        &self,
        prompt: &str,
        system: &str,
        options: GenerateOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                seed: options.seed,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Mock LLM client for testing: replays scripted outcomes, then repeats the last one.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Mutex<Result<String, LlmError>>,
    calls: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    pub fn failing(error: LlmError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    pub fn timing_out() -> Self {
        Self::failing(LlmError::Timeout(30))
    }

    pub fn scripted(outcomes: Vec<Result<String, LlmError>>) -> Self {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or_else(|| Err(LlmError::Connection("mock".into())));
        Self {
            script: Mutex::new(outcomes.into()),
            last: Mutex::new(last),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn generate(
        &self,
        prompt: &str,
        _system: &str,
        _options: GenerateOptions,
    ) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(outcome) => outcome,
            None => self
                .last
                .lock()
                .map(|l| l.clone())
                .unwrap_or_else(|_| Err(LlmError::Connection("mock".into()))),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("test response");
        let result = client.generate("prompt", "system", GenerateOptions::default()).unwrap();
        assert_eq!(result, "test response");
        assert_eq!(client.calls(), vec!["prompt".to_string()]);
    }

    #[test]
    fn mock_client_replays_script_then_repeats_last() {
        let client = MockLlmClient::scripted(vec![
            Err(LlmError::Timeout(5)),
            Ok("second".into()),
        ]);
        let opts = GenerateOptions::default();
        assert_eq!(client.generate("a", "", opts), Err(LlmError::Timeout(5)));
        assert_eq!(client.generate("b", "", opts).unwrap(), "second");
        assert_eq!(client.generate("c", "", opts).unwrap(), "second");
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "medgemma", 60).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.model(), "medgemma");
        assert_eq!(client.timeout_secs, 60);
    }

    #[test]
    fn unreachable_backend_maps_to_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = OllamaClient::new("http://127.0.0.1:9", "m", 2).unwrap();
        let err = client
            .generate("p", "s", GenerateOptions::default())
            .unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err:?}");
    }

    #[test]
    fn retryable_classification() {
        assert!(LlmError::Timeout(1).is_retryable());
        assert!(LlmError::Backend { status: 503, body: String::new() }.is_retryable());
        assert!(LlmError::Backend { status: 429, body: String::new() }.is_retryable());
        assert!(!LlmError::Backend { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::MalformedResponse("x".into()).is_retryable());
    }

    #[test]
    fn request_serializes_deterministic_options() {
        let body = OllamaGenerateRequest {
            model: "m",
            prompt: "p",
            system: "s",
            stream: false,
            options: OllamaOptions {
                temperature: 0.0,
                seed: Some(42),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["options"]["seed"], 42);
        assert_eq!(json["stream"], false);
    }
}
