//! Follow-up question planning.
//!
//! Questions target one (symptom, attribute) gap each. Symptoms are visited
//! by Knowledge Base priority, then detection order; attributes in
//! [`AttributeName::PRIORITY`] order. Output is a pure function of the record.

use std::sync::Arc;

use crate::models::{AttributeName, FollowUpQuestion, Symptom, SymptomRecord};
use crate::pipeline::knowledge::KnowledgeBase;

/// Questions about overall health, asked once per intake alongside the
/// attribute questions. They do not count towards completeness.
pub const GENERAL_QUESTIONS: &[&str] = &[
    "Do you have any chronic medical conditions?",
    "Are you currently taking any medications?",
    "Have you had any surgeries in the past?",
    "Do you have any allergies?",
    "How would you describe your overall health?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Frozen,
    Complete,
    RoundsExhausted,
    NothingToAsk,
}

pub struct FollowUpPlanner {
    kb: Arc<KnowledgeBase>,
    completeness_threshold: f32,
    max_rounds: u32,
    max_questions_per_round: usize,
}

impl FollowUpPlanner {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        completeness_threshold: f32,
        max_rounds: u32,
        max_questions_per_round: usize,
    ) -> Self {
        Self {
            kb,
            completeness_threshold,
            max_rounds,
            max_questions_per_round,
        }
    }

    /// Why planning would emit nothing for this record, if it would.
    pub fn stop_reason(&self, record: &SymptomRecord) -> Option<StopReason> {
        if record.is_frozen() {
            Some(StopReason::Frozen)
        } else if record.symptoms.is_empty() {
            Some(StopReason::NothingToAsk)
        } else if record.completeness_score() >= self.completeness_threshold {
            Some(StopReason::Complete)
        } else if record.metadata.rounds_completed >= self.max_rounds {
            Some(StopReason::RoundsExhausted)
        } else {
            None
        }
    }

    /// Questions for the next round, in asking order.
    pub fn plan(&self, record: &SymptomRecord) -> Vec<FollowUpQuestion> {
        if self.stop_reason(record).is_some() {
            return Vec::new();
        }

        let mut ordered: Vec<(usize, &Symptom)> =
            record.symptoms.iter().enumerate().collect();
        ordered.sort_by_key(|(detected_at, s)| (self.kb.priority_of(&s.id), *detected_at));

        ordered
            .into_iter()
            .flat_map(|(_, symptom)| {
                AttributeName::PRIORITY
                    .into_iter()
                    .filter(move |a| symptom.attributes.expected().any(|e| e == *a))
                    .filter(move |a| !symptom.attributes.is_known(*a))
                    .map(move |attribute| FollowUpQuestion {
                        symptom_id: symptom.id.clone(),
                        attribute,
                        text: question_text(&symptom.display_name, attribute),
                    })
            })
            .take(self.max_questions_per_round)
            .collect()
    }

    pub fn general_questions(&self) -> &'static [&'static str] {
        GENERAL_QUESTIONS
    }
}

pub fn question_text(display_name: &str, attribute: AttributeName) -> String {
    let name = display_name.to_lowercase();
    match attribute {
        AttributeName::Severity => {
            format!("On a scale of 1-10, how would you rate the severity of your {name}?")
        }
        AttributeName::Duration => format!("How long have you been experiencing {name}?"),
        AttributeName::Frequency => format!("How frequently do you experience {name}?"),
        AttributeName::Triggers => {
            format!("Have you noticed anything that triggers or worsens your {name}?")
        }
    }
}
