//! Model-backed extraction: the backend proposes symptoms, the Knowledge Base
//! decides which of them are real identifiers.

use std::sync::Arc;

use serde::Deserialize;

use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::{Extraction, ExtractionError, SymptomExtractor};
use crate::models::{AttributeName, ExtractionStrategy, Symptom, SymptomSource};
use crate::pipeline::knowledge::KnowledgeBase;
use crate::pipeline::llm::{parse_array_lenient, parse_json_response, GenerateOptions, LlmClient};

#[derive(Deserialize)]
struct RawExtraction {
    symptoms: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawSymptom {
    id: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    frequency: Option<String>,
    #[serde(default, alias = "factors")]
    triggers: Option<String>,
}

impl RawSymptom {
    fn value(&self, attribute: AttributeName) -> Option<&str> {
        match attribute {
            AttributeName::Severity => self.severity.as_deref(),
            AttributeName::Duration => self.duration.as_deref(),
            AttributeName::Frequency => self.frequency.as_deref(),
            AttributeName::Triggers => self.triggers.as_deref(),
        }
        .filter(|v| !v.trim().eq_ignore_ascii_case("null"))
    }
}

pub struct ModelExtractor {
    llm: Arc<dyn LlmClient>,
}

impl ModelExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

impl SymptomExtractor for ModelExtractor {
    fn kind(&self) -> ExtractionStrategy {
        ExtractionStrategy::Model
    }

    fn extract(&self, text: &str, kb: &KnowledgeBase) -> Result<Extraction, ExtractionError> {
        let prompt = build_extraction_prompt(text, kb);
        let response = self
            .llm
            .generate(&prompt, EXTRACTION_SYSTEM_PROMPT, GenerateOptions::DETERMINISTIC)
            .map_err(ExtractionError::Backend)?;
        parse_extraction(&response, kb)
    }
}

/// Validate a model response against the Knowledge Base.
///
/// Identifiers are normalized (case, spaces, hyphens) before lookup. Unknown
/// identifiers are dropped and counted. A response without a `symptoms` array
/// is malformed.
pub fn parse_extraction(response: &str, kb: &KnowledgeBase) -> Result<Extraction, ExtractionError> {
    let raw: RawExtraction =
        parse_json_response(response).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    let items: Vec<RawSymptom> = parse_array_lenient(Some(&raw.symptoms));
    let unparsed = raw.symptoms.len() - items.len();

    let mut symptoms: Vec<Symptom> = Vec::new();
    let mut dropped = unparsed as u32;

    for item in items {
        let id = normalize_identifier(&item.id);
        let Some(entry) = kb.get(&id) else {
            tracing::debug!(identifier = %item.id, "Dropping identifier outside vocabulary");
            dropped += 1;
            continue;
        };

        let mut symptom = entry.new_symptom(SymptomSource::ModelExtracted);
        for &attribute in &entry.attributes {
            symptom.attributes.set(attribute, item.value(attribute));
        }

        match symptoms.iter_mut().find(|s| s.id == symptom.id) {
            Some(existing) => existing.attributes.merge_from(&symptom.attributes),
            None => symptoms.push(symptom),
        }
    }

    Ok(Extraction {
        symptoms,
        dropped_identifiers: dropped,
    })
}

fn normalize_identifier(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{LlmError, MockLlmClient};

    fn kb() -> KnowledgeBase {
        KnowledgeBase::builtin().unwrap()
    }

    #[test]
    fn valid_response_is_parsed() {
        let response = r#"```json
{"symptoms": [
  {"id": "headache", "severity": "severe", "duration": "three days", "frequency": null, "triggers": "morning"},
  {"id": "Nausea", "severity": null}
]}
```"#;
        let extraction = parse_extraction(response, &kb()).unwrap();
        assert_eq!(extraction.dropped_identifiers, 0);
        assert_eq!(extraction.symptoms.len(), 2);

        let headache = &extraction.symptoms[0];
        assert_eq!(headache.source, SymptomSource::ModelExtracted);
        assert_eq!(headache.attributes.get(AttributeName::Duration), Some("three days"));
        assert_eq!(headache.attributes.get(AttributeName::Frequency), None);
        assert_eq!(extraction.symptoms[1].id, "nausea");
    }

    #[test]
    fn unknown_identifiers_are_dropped_and_counted() {
        let response = r#"{"symptoms": [
            {"id": "headache"},
            {"id": "broken heart"},
            {"id": "sore-throat"},
            {"severity": "no id at all"}
        ]}"#;
        let extraction = parse_extraction(response, &kb()).unwrap();
        let ids: Vec<&str> = extraction.symptoms.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["headache", "sore_throat"]);
        assert_eq!(extraction.dropped_identifiers, 2);
    }

    #[test]
    fn missing_symptoms_array_is_malformed() {
        assert!(matches!(
            parse_extraction(r#"{"items": []}"#, &kb()),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(matches!(
            parse_extraction("I think it's a headache", &kb()),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn literal_null_strings_are_unknown() {
        let response = r#"{"symptoms": [{"id": "fever", "duration": "null", "severity": "  "}]}"#;
        let extraction = parse_extraction(response, &kb()).unwrap();
        assert_eq!(extraction.symptoms[0].attributes.known_count(), 0);
    }

    #[test]
    fn backend_error_propagates() {
        let extractor = ModelExtractor::new(Arc::new(MockLlmClient::timing_out()));
        let err = extractor.extract("headache", &kb()).unwrap_err();
        assert!(matches!(err, ExtractionError::Backend(LlmError::Timeout(_))));
    }
}
