//! Slot-filling summary. Output depends only on the record and the Knowledge
//! Base, so regenerating it yields identical content.

use std::sync::Arc;

use super::{SummaryError, SummaryWriter};
use crate::models::{
    Audience, AttributeName, ConfidenceTier, DifferentialEntry, SummaryContent, SummaryStrategy,
    Symptom, SymptomRecord,
};
use crate::pipeline::knowledge::KnowledgeBase;

pub struct TemplateWriter {
    kb: Arc<KnowledgeBase>,
}

impl TemplateWriter {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }
}

impl SummaryWriter for TemplateWriter {
    fn kind(&self) -> SummaryStrategy {
        SummaryStrategy::Template
    }

    fn write(&self, record: &SymptomRecord, audience: Audience) -> Result<SummaryContent, SummaryError> {
        Ok(match audience {
            Audience::Patient => SummaryContent {
                narrative: patient_narrative(record),
                ..SummaryContent::default()
            },
            Audience::Doctor => SummaryContent {
                narrative: doctor_narrative(record),
                differential: differential(record, &self.kb),
                red_flags: red_flags(record, &self.kb),
                investigations: investigations(record, &self.kb),
            },
        })
    }
}

fn patient_narrative(record: &SymptomRecord) -> String {
    if record.symptoms.is_empty() {
        return "You did not report any specific symptoms.".to_string();
    }
    let mut out = format!(
        "You reported {} symptom(s): {}.",
        record.symptoms.len(),
        symptom_list(&record.symptoms)
    );
    for symptom in &record.symptoms {
        out.push(' ');
        out.push_str(&attribute_sentence(symptom, "you did not say"));
    }
    out.push_str(" A clinician will review this information with you.");
    out
}

fn doctor_narrative(record: &SymptomRecord) -> String {
    if record.symptoms.is_empty() {
        return "Patient reported no specific symptoms.".to_string();
    }
    let mut out = format!(
        "Patient presents with {} reported symptom(s): {}.",
        record.symptoms.len(),
        symptom_list(&record.symptoms)
    );
    for symptom in &record.symptoms {
        out.push(' ');
        out.push_str(&attribute_sentence(symptom, "not reported"));
    }
    let gaps: usize = record
        .symptoms
        .iter()
        .map(|s| s.attributes.expected_count() - s.attributes.known_count())
        .sum();
    if gaps > 0 {
        out.push_str(&format!(" {gaps} attribute(s) remain unknown after follow-up."));
    }
    out
}

fn symptom_list(symptoms: &[Symptom]) -> String {
    symptoms
        .iter()
        .map(|s| s.display_name.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ")
}

/// "Headache: severity severe; duration three days; frequency not reported."
fn attribute_sentence(symptom: &Symptom, unknown: &str) -> String {
    let parts: Vec<String> = AttributeName::PRIORITY
        .iter()
        .filter(|a| symptom.attributes.expected().any(|e| e == **a))
        .map(|a| format!("{} {}", a, symptom.attributes.get(*a).unwrap_or(unknown)))
        .collect();
    format!("{}: {}.", symptom.display_name, parts.join("; "))
}

/// Conditions from the Knowledge Base, ranked by how many reported symptoms
/// support them. Never rated high: no examination has taken place.
fn differential(record: &SymptomRecord, kb: &KnowledgeBase) -> Vec<DifferentialEntry> {
    let mut support: Vec<(String, Vec<String>)> = Vec::new();
    for symptom in &record.symptoms {
        let Some(entry) = kb.get(&symptom.id) else { continue };
        for condition in &entry.possible_conditions {
            match support.iter_mut().find(|(c, _)| c == condition) {
                Some((_, evidence)) => evidence.push(symptom.display_name.to_lowercase()),
                None => support.push((condition.clone(), vec![symptom.display_name.to_lowercase()])),
            }
        }
    }

    // Stable sort keeps first-appearance order among equals.
    support.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    support
        .into_iter()
        .map(|(condition, evidence)| DifferentialEntry {
            confidence: if evidence.len() >= 2 {
                ConfidenceTier::Moderate
            } else {
                ConfidenceTier::Low
            },
            supporting_evidence: format!("Reported {}", evidence.join(" and ")),
            condition,
        })
        .collect()
}

pub(crate) fn red_flags(record: &SymptomRecord, kb: &KnowledgeBase) -> Vec<String> {
    let mut flags: Vec<String> = Vec::new();
    for symptom in &record.symptoms {
        let Some(entry) = kb.get(&symptom.id) else { continue };
        for rule in &entry.red_flags {
            if rule.fires_for(&symptom.attributes) && !flags.contains(&rule.message) {
                flags.push(rule.message.clone());
            }
        }
    }
    flags
}

fn investigations(record: &SymptomRecord, kb: &KnowledgeBase) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for symptom in &record.symptoms {
        let Some(entry) = kb.get(&symptom.id) else { continue };
        for item in &entry.investigations {
            if !out.contains(item) {
                out.push(item.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionStrategy, SymptomSource};
    use uuid::Uuid;

    fn kb() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::builtin().unwrap())
    }

    fn headache_record() -> SymptomRecord {
        let mut record = SymptomRecord::empty(Uuid::nil(), ExtractionStrategy::Deterministic);
        record.merge_symptom(
            Symptom::new("headache", "Headache", &AttributeName::PRIORITY, SymptomSource::KeywordMatched)
                .with_attribute(AttributeName::Severity, "severe")
                .with_attribute(AttributeName::Duration, "three days")
                .with_attribute(AttributeName::Triggers, "morning"),
        );
        record
    }

    #[test]
    fn patient_summary_has_no_clinical_lists() {
        let content = TemplateWriter::new(kb()).write(&headache_record(), Audience::Patient).unwrap();
        assert!(content.narrative.starts_with("You reported 1 symptom(s): headache."));
        assert!(content.narrative.contains("Headache: severity severe; duration three days; frequency you did not say; triggers morning."));
        assert!(content.differential.is_empty());
        assert!(content.red_flags.is_empty());
        assert!(content.investigations.is_empty());
    }

    #[test]
    fn doctor_summary_includes_differential_and_flags() {
        let content = TemplateWriter::new(kb()).write(&headache_record(), Audience::Doctor).unwrap();
        assert!(content.narrative.starts_with("Patient presents with 1 reported symptom(s): headache."));
        assert!(content.narrative.contains("1 attribute(s) remain unknown"));
        assert!(!content.differential.is_empty());
        assert!(content.differential.iter().all(|d| d.confidence == ConfidenceTier::Low));
        // "morning" trigger fires the headache pattern rule
        assert_eq!(content.red_flags.len(), 1);
        assert!(!content.investigations.is_empty());
    }

    #[test]
    fn shared_conditions_rank_first_with_moderate_confidence() {
        let kb = kb();
        let mut record = SymptomRecord::empty(Uuid::nil(), ExtractionStrategy::Deterministic);
        for id in ["vomiting", "nausea", "diarrhea"] {
            record.merge_symptom(kb.get(id).unwrap().new_symptom(SymptomSource::KeywordMatched));
        }
        let diff = differential(&record, &kb);
        assert_eq!(diff[0].condition, "Gastroenteritis");
        assert_eq!(diff[0].confidence, ConfidenceTier::Moderate);
        assert_eq!(diff[0].supporting_evidence, "Reported vomiting and nausea and diarrhea");
        assert!(diff.iter().all(|d| d.confidence != ConfidenceTier::High));
    }

    #[test]
    fn template_output_is_identical_across_calls() {
        let writer = TemplateWriter::new(kb());
        let record = headache_record();
        for audience in [Audience::Patient, Audience::Doctor] {
            assert_eq!(
                writer.write(&record, audience).unwrap(),
                writer.write(&record, audience).unwrap()
            );
        }
    }

    #[test]
    fn empty_record_summaries() {
        let writer = TemplateWriter::new(kb());
        let record = SymptomRecord::empty(Uuid::nil(), ExtractionStrategy::Deterministic);
        let doctor = writer.write(&record, Audience::Doctor).unwrap();
        assert_eq!(doctor.narrative, "Patient reported no specific symptoms.");
        assert!(doctor.differential.is_empty());
        assert!(doctor.red_flags.is_empty());
    }

    #[test]
    fn red_flags_are_deduplicated() {
        let kb = kb();
        let mut record = SymptomRecord::empty(Uuid::nil(), ExtractionStrategy::Deterministic);
        record.merge_symptom(kb.get("chest_pain").unwrap().new_symptom(SymptomSource::KeywordMatched));
        let once = red_flags(&record, &kb);
        record.merge_symptom(kb.get("chest_pain").unwrap().new_symptom(SymptomSource::KeywordMatched));
        assert_eq!(red_flags(&record, &kb), once);
    }
}
