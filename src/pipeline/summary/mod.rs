pub mod generator;
pub mod model;
pub mod template;

pub use generator::SummaryGenerator;
pub use model::ModelWriter;
pub use template::TemplateWriter;

use thiserror::Error;

use crate::models::{Audience, SummaryContent, SummaryStrategy, SymptomRecord};
use crate::pipeline::llm::LlmError;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Summary backend failed: {0}")]
    Backend(LlmError),

    #[error("Summary output could not be parsed: {0}")]
    Malformed(String),
}

impl From<LlmError> for SummaryError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::MalformedResponse(msg) => Self::Malformed(msg),
            other => Self::Backend(other),
        }
    }
}

/// One summarization strategy.
pub trait SummaryWriter: Send + Sync {
    fn kind(&self) -> SummaryStrategy;

    fn write(&self, record: &SymptomRecord, audience: Audience) -> Result<SummaryContent, SummaryError>;
}
