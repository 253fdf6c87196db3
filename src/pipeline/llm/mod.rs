pub mod ollama;
pub mod parse;

pub use ollama::*;
pub use parse::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Model backend is not reachable at {0}")]
    Connection(String),

    #[error("Model backend timed out after {0}s")]
    Timeout(u64),

    #[error("Model backend returned error (status {status}): {body}")]
    Backend { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Errors worth one more attempt (transient transport problems).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::HttpClient(_)
        ) || matches!(self, Self::Backend { status, .. } if *status == 429 || *status >= 500)
    }
}

/// Sampling options sent with every generation. Extraction pins temperature
/// and seed so repeated calls on identical text agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub seed: Option<u64>,
}

impl GenerateOptions {
    pub const DETERMINISTIC: GenerateOptions = GenerateOptions {
        temperature: 0.0,
        seed: Some(42),
    };
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::DETERMINISTIC
    }
}

/// Generative backend abstraction (allows mocking).
pub trait LlmClient: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        system: &str,
        options: GenerateOptions,
    ) -> Result<String, LlmError>;

    /// Name of the backend, for logs.
    fn name(&self) -> &str;
}
