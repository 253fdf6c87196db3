pub mod deterministic;
pub mod engine;
pub mod model;
pub mod prompt;

pub use deterministic::DeterministicExtractor;
pub use engine::{ExtractionEngine, ExtractionOutcome};
pub use model::ModelExtractor;

use thiserror::Error;

use crate::models::{ExtractionStrategy, Symptom};
use crate::pipeline::knowledge::KnowledgeBase;
use crate::pipeline::llm::LlmError;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction backend failed: {0}")]
    Backend(#[from] LlmError),

    #[error("Extraction output could not be parsed: {0}")]
    Malformed(String),
}

/// Symptoms produced by one strategy run, before they are merged into a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub symptoms: Vec<Symptom>,
    /// Identifiers proposed by the strategy that are not in the Knowledge Base.
    pub dropped_identifiers: u32,
}

/// One extraction strategy. Both strategies return the same shape; the engine
/// decides which one runs and when to fall back.
pub trait SymptomExtractor: Send + Sync {
    fn kind(&self) -> ExtractionStrategy;

    fn extract(&self, text: &str, kb: &KnowledgeBase) -> Result<Extraction, ExtractionError>;
}
