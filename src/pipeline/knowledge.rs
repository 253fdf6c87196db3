//! Static symptom reference: keywords, clinical priority, expected attributes,
//! and the template material used by deterministic summaries.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{AttributeName, Symptom, SymptomAttributeSet, SymptomSource};

const DEFAULT_KNOWLEDGE_BASE: &str = include_str!("../../resources/knowledge_base.json");

#[derive(Error, Debug)]
pub enum KnowledgeBaseError {
    #[error("Knowledge base is not valid JSON: {0}")]
    Parse(String),

    #[error("Duplicate symptom identifier in knowledge base: {0}")]
    DuplicateIdentifier(String),

    #[error("Symptom {0} declares no keywords")]
    NoKeywords(String),

    #[error("Invalid keyword pattern for {id}: {reason}")]
    InvalidKeyword { id: String, reason: String },
}

/// A red-flag rule. Fires when `attribute` (or any attribute, if unset) contains
/// one of `terms`; fires unconditionally when `terms` is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct RedFlagRule {
    #[serde(default)]
    pub attribute: Option<AttributeName>,
    #[serde(default)]
    pub terms: Vec<String>,
    pub message: String,
}

impl RedFlagRule {
    pub fn fires_for(&self, attributes: &SymptomAttributeSet) -> bool {
        if self.terms.is_empty() {
            return true;
        }
        let values: Vec<String> = match self.attribute {
            Some(attr) => attributes.get(attr).map(str::to_lowercase).into_iter().collect(),
            None => attributes
                .expected()
                .filter_map(|a| attributes.get(a).map(str::to_lowercase))
                .collect(),
        };
        values
            .iter()
            .any(|v| self.terms.iter().any(|t| v.contains(&t.to_lowercase())))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymptomEntry {
    pub id: String,
    pub display_name: String,
    pub keywords: Vec<String>,
    /// 1 is the most clinically urgent.
    pub priority: u8,
    #[serde(default = "default_attributes")]
    pub attributes: Vec<AttributeName>,
    #[serde(default)]
    pub possible_conditions: Vec<String>,
    #[serde(default)]
    pub red_flags: Vec<RedFlagRule>,
    #[serde(default)]
    pub investigations: Vec<String>,
}

fn default_attributes() -> Vec<AttributeName> {
    AttributeName::PRIORITY.to_vec()
}

impl SymptomEntry {
    /// A fresh symptom for this entry with every expected attribute unknown.
    pub fn new_symptom(&self, source: SymptomSource) -> Symptom {
        Symptom::new(&self.id, &self.display_name, &self.attributes, source)
    }
}

#[derive(Deserialize)]
struct RawKnowledgeBase {
    symptoms: Vec<SymptomEntry>,
}

/// Compiled keyword matcher for one entry.
#[derive(Debug, Clone)]
pub(crate) struct KeywordMatcher {
    pub entry_index: usize,
    pub regex: Regex,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<SymptomEntry>,
    index: HashMap<String, usize>,
    matchers: Vec<KeywordMatcher>,
}

impl KnowledgeBase {
    /// The embedded default knowledge base.
    pub fn builtin() -> Result<Self, KnowledgeBaseError> {
        Self::from_json(DEFAULT_KNOWLEDGE_BASE)
    }

    pub fn from_json(json: &str) -> Result<Self, KnowledgeBaseError> {
        let raw: RawKnowledgeBase =
            serde_json::from_str(json).map_err(|e| KnowledgeBaseError::Parse(e.to_string()))?;
        Self::from_entries(raw.symptoms)
    }

    pub fn from_entries(entries: Vec<SymptomEntry>) -> Result<Self, KnowledgeBaseError> {
        let mut index = HashMap::with_capacity(entries.len());
        let mut matchers = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.id.clone(), i).is_some() {
                return Err(KnowledgeBaseError::DuplicateIdentifier(entry.id.clone()));
            }
            if entry.keywords.is_empty() {
                return Err(KnowledgeBaseError::NoKeywords(entry.id.clone()));
            }
            for keyword in &entry.keywords {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword.trim()));
                let regex = Regex::new(&pattern).map_err(|e| KnowledgeBaseError::InvalidKeyword {
                    id: entry.id.clone(),
                    reason: e.to_string(),
                })?;
                matchers.push(KeywordMatcher { entry_index: i, regex });
            }
        }

        Ok(Self {
            entries,
            index,
            matchers,
        })
    }

    pub fn get(&self, id: &str) -> Option<&SymptomEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn entries(&self) -> &[SymptomEntry] {
        &self.entries
    }

    /// Clinical priority for ordering; unknown identifiers sort last.
    pub fn priority_of(&self, id: &str) -> u8 {
        self.get(id).map(|e| e.priority).unwrap_or(u8::MAX)
    }

    /// Identifier vocabulary offered to the model as a constraint.
    pub fn vocabulary(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub(crate) fn matchers(&self) -> &[KeywordMatcher] {
        &self.matchers
    }

    pub(crate) fn entry_at(&self, index: usize) -> &SymptomEntry {
        &self.entries[index]
    }
}
