use std::sync::Arc;

use uuid::Uuid;

use super::{DeterministicExtractor, ExtractionError, ModelExtractor, SymptomExtractor};
use crate::models::{Degradation, ExtractionStrategy, Symptom, SymptomRecord};
use crate::pipeline::knowledge::KnowledgeBase;
use crate::pipeline::llm::LlmClient;

/// Result of one engine call, with provenance for the record metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub symptoms: Vec<Symptom>,
    /// Strategy that actually produced `symptoms`.
    pub strategy: ExtractionStrategy,
    pub degraded: bool,
    pub dropped_identifiers: u32,
    pub degradations: Vec<Degradation>,
}

impl ExtractionOutcome {
    /// Merge into a record and update its extraction metadata and completeness.
    pub fn apply_to(self, record: &mut SymptomRecord) {
        for symptom in self.symptoms {
            record.merge_symptom(symptom);
        }
        let meta = &mut record.metadata;
        meta.extraction_strategy = self.strategy;
        meta.extraction_degraded |= self.degraded;
        meta.dropped_identifiers += self.dropped_identifiers;
        for d in self.degradations {
            meta.note(d);
        }
        record.refresh_completeness();
    }
}

/// Runs the configured strategy, with the deterministic strategy wired in once
/// as the fallback for backend errors, timeouts and malformed output.
pub struct ExtractionEngine {
    kb: Arc<KnowledgeBase>,
    primary: Box<dyn SymptomExtractor>,
    fallback: DeterministicExtractor,
}

impl ExtractionEngine {
    pub fn deterministic(kb: Arc<KnowledgeBase>) -> Self {
        Self {
            kb,
            primary: Box::new(DeterministicExtractor),
            fallback: DeterministicExtractor,
        }
    }

    pub fn model(kb: Arc<KnowledgeBase>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            kb,
            primary: Box::new(ModelExtractor::new(llm)),
            fallback: DeterministicExtractor,
        }
    }

    /// Resolve the configured strategy. `Model` without a backend degrades to
    /// deterministic at construction time.
    pub fn for_strategy(
        strategy: ExtractionStrategy,
        kb: Arc<KnowledgeBase>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        match (strategy, llm) {
            (ExtractionStrategy::Model, Some(llm)) => Self::model(kb, llm),
            (ExtractionStrategy::Model, None) => {
                tracing::warn!("Model extraction configured without a backend, using deterministic");
                Self::deterministic(kb)
            }
            (ExtractionStrategy::Deterministic, _) => Self::deterministic(kb),
        }
    }

    pub fn configured_strategy(&self) -> ExtractionStrategy {
        self.primary.kind()
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Extract symptoms from canonical-language text. Never fails: backend
    /// problems are reported through `degraded` and `degradations`.
    pub fn extract(&self, text: &str) -> ExtractionOutcome {
        let strategy = self.primary.kind();
        if text.trim().is_empty() {
            return ExtractionOutcome {
                symptoms: Vec::new(),
                strategy,
                degraded: false,
                dropped_identifiers: 0,
                degradations: Vec::new(),
            };
        }

        match self.primary.extract(text, &self.kb) {
            Ok(extraction) => {
                let mut degradations = Vec::new();
                if extraction.dropped_identifiers > 0 {
                    tracing::warn!(
                        dropped = extraction.dropped_identifiers,
                        "Extraction proposed identifiers outside the knowledge base"
                    );
                    degradations.push(Degradation::UnknownSymptomIdentifier);
                }
                ExtractionOutcome {
                    symptoms: extraction.symptoms,
                    strategy,
                    degraded: false,
                    dropped_identifiers: extraction.dropped_identifiers,
                    degradations,
                }
            }
            Err(e) => {
                let degradation = match &e {
                    ExtractionError::Backend(_) => Degradation::ExtractionBackendError,
                    ExtractionError::Malformed(_) => Degradation::ExtractionMalformedOutput,
                };
                tracing::warn!(
                    strategy = ?strategy,
                    error = %e,
                    "Extraction failed, falling back to deterministic"
                );
                let symptoms = self
                    .fallback
                    .extract(text, &self.kb)
                    .map(|x| x.symptoms)
                    .unwrap_or_default();
                ExtractionOutcome {
                    symptoms,
                    strategy: ExtractionStrategy::Deterministic,
                    degraded: true,
                    dropped_identifiers: 0,
                    degradations: vec![degradation],
                }
            }
        }
    }

    /// `extract` into a fresh record for `session_id`.
    pub fn extract_record(&self, text: &str, session_id: Uuid) -> SymptomRecord {
        let mut record = SymptomRecord::empty(session_id, self.configured_strategy());
        self.extract(text).apply_to(&mut record);
        record
    }
}
