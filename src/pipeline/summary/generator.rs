use std::sync::Arc;

use chrono::Utc;

use super::{ModelWriter, SummaryWriter, TemplateWriter};
use crate::models::{Audience, ClinicalSummary, SummaryStrategy, SymptomRecord};
use crate::pipeline::knowledge::KnowledgeBase;
use crate::pipeline::llm::LlmClient;

/// Produces complete summaries with the configured strategy, falling back to
/// the template on backend failure or malformed output. Every call returns a
/// fresh summary; nothing is accumulated between calls.
pub struct SummaryGenerator {
    primary: Box<dyn SummaryWriter>,
    fallback: TemplateWriter,
}

impl SummaryGenerator {
    pub fn template(kb: Arc<KnowledgeBase>) -> Self {
        Self {
            primary: Box::new(TemplateWriter::new(kb.clone())),
            fallback: TemplateWriter::new(kb),
        }
    }

    pub fn model(kb: Arc<KnowledgeBase>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            primary: Box::new(ModelWriter::new(llm, kb.clone())),
            fallback: TemplateWriter::new(kb),
        }
    }

    pub fn for_strategy(
        strategy: SummaryStrategy,
        kb: Arc<KnowledgeBase>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        match (strategy, llm) {
            (SummaryStrategy::Model, Some(llm)) => Self::model(kb, llm),
            (SummaryStrategy::Model, None) => {
                tracing::warn!("Model summaries configured without a backend, using template");
                Self::template(kb)
            }
            (SummaryStrategy::Template, _) => Self::template(kb),
        }
    }

    pub fn configured_strategy(&self) -> SummaryStrategy {
        self.primary.kind()
    }

    pub fn summarize(&self, record: &SymptomRecord, audience: Audience) -> ClinicalSummary {
        let (content, strategy, fell_back) = match self.primary.write(record, audience) {
            Ok(content) => (content, self.primary.kind(), false),
            Err(e) => {
                tracing::warn!(
                    audience = audience.as_str(),
                    error = %e,
                    "Summary generation failed, falling back to template"
                );
                // The template writer cannot fail.
                let content = self.fallback.write(record, audience).unwrap_or_default();
                (content, SummaryStrategy::Template, true)
            }
        };

        ClinicalSummary {
            audience,
            content,
            strategy,
            fell_back,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeName, ExtractionStrategy, SymptomSource};
    use crate::pipeline::llm::MockLlmClient;
    use uuid::Uuid;

    fn kb() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::builtin().unwrap())
    }

    fn record() -> SymptomRecord {
        let kb = kb();
        let mut record = SymptomRecord::empty(Uuid::nil(), ExtractionStrategy::Deterministic);
        record.merge_symptom(
            kb.get("chest_pain")
                .unwrap()
                .new_symptom(SymptomSource::KeywordMatched)
                .with_attribute(AttributeName::Severity, "7/10"),
        );
        record
    }

    #[test]
    fn template_regeneration_is_identical() {
        let generator = SummaryGenerator::template(kb());
        let record = record();
        let first = generator.summarize(&record, Audience::Doctor);
        let second = generator.summarize(&record, Audience::Doctor);
        assert_eq!(first.content, second.content);
        assert_eq!(
            serde_json::to_vec(&first.content).unwrap(),
            serde_json::to_vec(&second.content).unwrap()
        );
        assert_eq!(first.strategy, SummaryStrategy::Template);
        assert!(!first.fell_back);
    }

    #[test]
    fn model_failure_falls_back_to_template() {
        let generator = SummaryGenerator::model(kb(), Arc::new(MockLlmClient::timing_out()));
        let summary = generator.summarize(&record(), Audience::Doctor);
        assert!(summary.fell_back);
        assert_eq!(summary.strategy, SummaryStrategy::Template);
        let direct = SummaryGenerator::template(kb()).summarize(&record(), Audience::Doctor);
        assert_eq!(summary.content, direct.content);
    }

    #[test]
    fn malformed_model_output_falls_back() {
        let generator = SummaryGenerator::model(kb(), Arc::new(MockLlmClient::new("not json")));
        let summary = generator.summarize(&record(), Audience::Patient);
        assert!(summary.fell_back);
        assert!(summary.content.narrative.starts_with("You reported 1 symptom(s)"));
    }

    #[test]
    fn model_summary_used_when_valid() {
        let llm = Arc::new(MockLlmClient::new(r#"{"narrative": "Chest pain rated 7/10."}"#));
        let summary = SummaryGenerator::model(kb(), llm).summarize(&record(), Audience::Doctor);
        assert_eq!(summary.strategy, SummaryStrategy::Model);
        assert!(!summary.fell_back);
        assert_eq!(summary.content.narrative, "Chest pain rated 7/10.");
        // unconditional chest pain flag
        assert!(!summary.content.red_flags.is_empty());
    }

    #[test]
    fn strategy_without_backend_resolves_to_template() {
        let generator = SummaryGenerator::for_strategy(SummaryStrategy::Model, kb(), None);
        assert_eq!(generator.configured_strategy(), SummaryStrategy::Template);
    }
}
