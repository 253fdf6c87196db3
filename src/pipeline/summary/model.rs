use std::sync::Arc;

use serde::Deserialize;

use super::template::red_flags;
use super::{SummaryError, SummaryWriter};
use crate::models::{
    Audience, ConfidenceTier, DifferentialEntry, SummaryContent, SummaryStrategy, SymptomRecord,
};
use crate::pipeline::knowledge::KnowledgeBase;
use crate::pipeline::llm::{parse_array_lenient, parse_json_response, GenerateOptions, LlmClient};

const SUMMARY_SYSTEM_PROMPT: &str = r#"You are a clinical documentation assistant. You summarize a structured symptom intake.

RULES:
- Use only the symptoms and attribute values given. Unknown values stay unknown; never invent them.
- For the patient audience: plain, calm language, no diagnoses, no lists of conditions.
- For the doctor audience: concise clinical register, a differential with confidence low|moderate|high, red flags, and suggested investigations.
- Output a single ```json fenced block and nothing else."#;

#[derive(Deserialize)]
struct RawSummary {
    narrative: String,
    #[serde(default)]
    differential: Vec<serde_json::Value>,
    #[serde(default)]
    red_flags: Vec<String>,
    #[serde(default)]
    investigations: Vec<String>,
}

#[derive(Deserialize)]
struct RawDifferential {
    condition: String,
    #[serde(default)]
    supporting_evidence: String,
    #[serde(default)]
    confidence: String,
}

pub struct ModelWriter {
    llm: Arc<dyn LlmClient>,
    kb: Arc<KnowledgeBase>,
}

impl ModelWriter {
    pub fn new(llm: Arc<dyn LlmClient>, kb: Arc<KnowledgeBase>) -> Self {
        Self { llm, kb }
    }
}

impl SummaryWriter for ModelWriter {
    fn kind(&self) -> SummaryStrategy {
        SummaryStrategy::Model
    }

    fn write(&self, record: &SymptomRecord, audience: Audience) -> Result<SummaryContent, SummaryError> {
        let prompt = build_summary_prompt(record, audience)?;
        let response = self
            .llm
            .generate(&prompt, SUMMARY_SYSTEM_PROMPT, GenerateOptions::DETERMINISTIC)?;
        let mut content = parse_summary(&response, audience)?;

        // Rule-based red flags are always present for doctors, whatever the model said.
        if audience == Audience::Doctor {
            let mut flags = red_flags(record, &self.kb);
            for flag in content.red_flags.drain(..) {
                if !flags.iter().any(|f| f.eq_ignore_ascii_case(&flag)) {
                    flags.push(flag);
                }
            }
            content.red_flags = flags;
        }
        Ok(content)
    }
}

fn build_summary_prompt(record: &SymptomRecord, audience: Audience) -> Result<String, SummaryError> {
    let symptoms = serde_json::to_string_pretty(&record.symptoms)
        .map_err(|e| SummaryError::Malformed(e.to_string()))?;
    let schema = match audience {
        Audience::Patient => r#"{"narrative": "<summary for the patient>"}"#,
        Audience::Doctor => {
            r#"{"narrative": "<clinical summary>", "differential": [{"condition": "...", "supporting_evidence": "...", "confidence": "low|moderate|high"}], "red_flags": ["..."], "investigations": ["..."]}"#
        }
    };
    Ok(format!(
        "Audience: {}\n\nReturn JSON with this exact shape:\n```json\n{}\n```\n\n<symptoms>\n{}\n</symptoms>",
        audience.as_str(),
        schema,
        symptoms
    ))
}

/// Parse a model summary. A missing or empty narrative is malformed. Patient
/// summaries never carry clinical lists, even if the model produced them.
pub fn parse_summary(response: &str, audience: Audience) -> Result<SummaryContent, SummaryError> {
    let raw: RawSummary = parse_json_response(response)?;
    let narrative = raw.narrative.trim().to_string();
    if narrative.is_empty() {
        return Err(SummaryError::Malformed("empty narrative".into()));
    }

    if audience == Audience::Patient {
        return Ok(SummaryContent {
            narrative,
            ..SummaryContent::default()
        });
    }

    let differential = parse_array_lenient::<RawDifferential>(Some(&raw.differential))
        .into_iter()
        .filter(|d| !d.condition.trim().is_empty())
        .map(|d| DifferentialEntry {
            condition: d.condition.trim().to_string(),
            supporting_evidence: d.supporting_evidence.trim().to_string(),
            confidence: ConfidenceTier::parse(&d.confidence).unwrap_or(ConfidenceTier::Low),
        })
        .collect();

    Ok(SummaryContent {
        narrative,
        differential,
        red_flags: clean_list(raw.red_flags),
        investigations: clean_list(raw.investigations),
    })
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeName, ExtractionStrategy, SymptomSource};
    use crate::pipeline::llm::{LlmError, MockLlmClient};
    use uuid::Uuid;

    const DOCTOR_RESPONSE: &str = r#"```json
{
  "narrative": "Three-day severe headache, worse in the morning.",
  "differential": [
    {"condition": "Migraine", "supporting_evidence": "severe, episodic", "confidence": "medium"},
    {"condition": "", "confidence": "high"},
    {"condition": "Tension-type headache", "confidence": "certain"}
  ],
  "red_flags": ["Morning headache", "  "],
  "investigations": ["Blood pressure", "Blood pressure"]
}
```"#;

    fn kb() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::builtin().unwrap())
    }

    fn record() -> SymptomRecord {
        let kb = kb();
        let mut record = SymptomRecord::empty(Uuid::nil(), ExtractionStrategy::Model);
        record.merge_symptom(
            kb.get("headache")
                .unwrap()
                .new_symptom(SymptomSource::ModelExtracted)
                .with_attribute(AttributeName::Triggers, "morning"),
        );
        record
    }

    #[test]
    fn doctor_response_is_parsed_and_cleaned() {
        let content = parse_summary(DOCTOR_RESPONSE, Audience::Doctor).unwrap();
        assert_eq!(content.differential.len(), 2);
        assert_eq!(content.differential[0].confidence, ConfidenceTier::Moderate);
        assert_eq!(content.differential[1].confidence, ConfidenceTier::Low);
        assert_eq!(content.red_flags, vec!["Morning headache".to_string()]);
        assert_eq!(content.investigations, vec!["Blood pressure".to_string()]);
    }

    #[test]
    fn patient_audience_strips_clinical_lists() {
        let content = parse_summary(DOCTOR_RESPONSE, Audience::Patient).unwrap();
        assert!(content.differential.is_empty());
        assert!(content.red_flags.is_empty());
        assert!(content.investigations.is_empty());
    }

    #[test]
    fn empty_narrative_is_malformed() {
        let response = r#"{"narrative": "   "}"#;
        assert!(matches!(
            parse_summary(response, Audience::Patient),
            Err(SummaryError::Malformed(_))
        ));
    }

    #[test]
    fn rule_based_red_flags_are_kept() {
        let llm = Arc::new(MockLlmClient::new(r#"{"narrative": "Headache.", "red_flags": []}"#));
        let writer = ModelWriter::new(llm, kb());
        let content = writer.write(&record(), Audience::Doctor).unwrap();
        assert_eq!(content.red_flags.len(), 1);
    }

    #[test]
    fn prompt_carries_record_and_audience() {
        let llm = Arc::new(MockLlmClient::new(r#"{"narrative": "ok"}"#));
        let writer = ModelWriter::new(llm.clone(), kb());
        writer.write(&record(), Audience::Patient).unwrap();
        let prompt = &llm.calls()[0];
        assert!(prompt.starts_with("Audience: patient"));
        assert!(prompt.contains("\"headache\""));
    }

    #[test]
    fn backend_error_is_reported() {
        let writer = ModelWriter::new(Arc::new(MockLlmClient::failing(LlmError::Timeout(30))), kb());
        assert!(matches!(
            writer.write(&record(), Audience::Doctor),
            Err(SummaryError::Backend(_))
        ));
    }
}
