use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::symptom::{AttributeName, Symptom};

/// Non-fatal degradations recorded on the record instead of being raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    DetectionLowConfidence,
    TranslationUnavailable,
    ExtractionBackendError,
    ExtractionMalformedOutput,
    UnknownSymptomIdentifier,
}

/// Extraction strategy, selected once per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    Model,
    Deterministic,
}

/// A clarifying question targeting one attribute of one symptom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub symptom_id: String,
    pub attribute: AttributeName,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeMetadata {
    pub session_id: Uuid,
    /// `None` when detection confidence fell below the threshold.
    pub detected_language: Option<String>,
    pub language_confidence: f32,
    pub translation_applied: bool,
    /// Strategy that actually produced the symptom set in the latest round.
    pub extraction_strategy: ExtractionStrategy,
    pub extraction_degraded: bool,
    pub dropped_identifiers: u32,
    pub degradations: Vec<Degradation>,
    pub completeness: f32,
    pub rounds_completed: u32,
    pub open_questions: Vec<FollowUpQuestion>,
    pub frozen: bool,
    pub created_at: DateTime<Utc>,
    pub frozen_at: Option<DateTime<Utc>>,
}

impl IntakeMetadata {
    pub fn new(session_id: Uuid, strategy: ExtractionStrategy) -> Self {
        Self {
            session_id,
            detected_language: None,
            language_confidence: 0.0,
            translation_applied: false,
            extraction_strategy: strategy,
            extraction_degraded: false,
            dropped_identifiers: 0,
            degradations: Vec::new(),
            completeness: 0.0,
            rounds_completed: 0,
            open_questions: Vec::new(),
            frozen: false,
            created_at: Utc::now(),
            frozen_at: None,
        }
    }

    /// Record a degradation once, keeping first-occurrence order.
    pub fn note(&mut self, degradation: Degradation) {
        if !self.degradations.contains(&degradation) {
            self.degradations.push(degradation);
        }
    }
}

/// Ordered symptom set plus intake metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomRecord {
    pub symptoms: Vec<Symptom>,
    pub metadata: IntakeMetadata,
}

impl SymptomRecord {
    pub fn empty(session_id: Uuid, strategy: ExtractionStrategy) -> Self {
        Self {
            symptoms: Vec::new(),
            metadata: IntakeMetadata::new(session_id, strategy),
        }
    }

    pub fn symptom(&self, id: &str) -> Option<&Symptom> {
        self.symptoms.iter().find(|s| s.id == id)
    }

    pub fn symptom_mut(&mut self, id: &str) -> Option<&mut Symptom> {
        self.symptoms.iter_mut().find(|s| s.id == id)
    }

    /// Merge a detection into the record. Duplicate identifiers union their
    /// attribute sets; detection order of the first occurrence is kept.
    pub fn merge_symptom(&mut self, incoming: Symptom) {
        match self.symptom_mut(&incoming.id) {
            Some(existing) => existing.attributes.merge_from(&incoming.attributes),
            None => self.symptoms.push(incoming),
        }
    }

    /// Fraction of expected attributes, across all symptoms, with a known value.
    pub fn completeness_score(&self) -> f32 {
        let expected: usize = self.symptoms.iter().map(|s| s.attributes.expected_count()).sum();
        if expected == 0 {
            return 0.0;
        }
        let known: usize = self.symptoms.iter().map(|s| s.attributes.known_count()).sum();
        known as f32 / expected as f32
    }

    /// Raise the recorded completeness to the current score. The recorded
    /// value never drops, even when a later round adds a symptom with gaps.
    pub fn refresh_completeness(&mut self) {
        self.metadata.completeness = self.metadata.completeness.max(self.completeness_score());
    }

    pub fn is_frozen(&self) -> bool {
        self.metadata.frozen
    }

    /// Stop accepting answers. Remaining gaps stay unknown permanently.
    pub fn freeze(&mut self) {
        if !self.metadata.frozen {
            self.metadata.frozen = true;
            self.metadata.frozen_at = Some(Utc::now());
            self.metadata.open_questions.clear();
        }
    }
}

/// A [`SymptomRecord`] whose string leaves are ciphertext tokens.
///
/// Kept as a JSON tree mirroring the record's shape so the store can index
/// the cleartext numeric, boolean and allow-listed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedRecord(pub serde_json::Value);

impl EncryptedRecord {
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn symptom_count(&self) -> usize {
        self.0["symptoms"].as_array().map(Vec::len).unwrap_or(0)
    }

    pub fn completeness(&self) -> f64 {
        self.0["metadata"]["completeness"].as_f64().unwrap_or(0.0)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.0["metadata"]["session_id"].as_str()
    }

    pub fn created_at(&self) -> Option<&str> {
        self.0["metadata"]["created_at"].as_str()
    }
}
