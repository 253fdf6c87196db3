//! Keyword + pattern extraction. No external calls; always available.

use std::sync::LazyLock;

use regex::Regex;

use super::{Extraction, ExtractionError, SymptomExtractor};
use crate::models::{AttributeName, ExtractionStrategy, Symptom, SymptomAttributeSet, SymptomSource};
use crate::pipeline::knowledge::KnowledgeBase;

/// Longest attribute value kept from free text.
const MAX_VALUE_CHARS: usize = 80;

const COUNT_WORDS: &str = r"(?:\d+|a|an|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|a\s+few|a\s+couple\s+of|couple\s+of|few|several)";
const TIME_UNITS: &str = r"(?:minute|hour|day|week|month|year)s?";

static DURATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"(?i)\b(?:for|past|last|over)\s+(?:the\s+)?(?:past\s+|last\s+)?({COUNT_WORDS}\s+{TIME_UNITS})\b"),
        format!(r"(?i)\b({COUNT_WORDS}\s+{TIME_UNITS}\s+ago)\b"),
        format!(r"(?i)\b(\d+\s*{TIME_UNITS})\b"),
        r"(?i)\b(since\s+(?:yesterday|last\s+\w+|this\s+\w+|(?:mon|tues|wednes|thurs|fri|satur|sun)day))\b"
            .to_string(),
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static SEVERITY_SCALE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*(?:/|out\s+of)\s*10\b").ok());

static SEVERITY_WORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(mild|moderate|severe|extreme|intense|slight|excruciating|unbearable|terrible|worst|very\s+bad|really\s+bad)\b",
    )
    .ok()
});

static FREQUENCY_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(constant(?:ly)?|all\s+the\s+time|always|daily|every\s*day|every\s+(?:morning|evening|night|hour|week|other\s+day)|hourly|weekly|nightly|on\s+and\s+off|comes\s+and\s+goes|intermittent(?:ly)?|occasional(?:ly)?|frequent(?:ly)?|rarely|sometimes|(?:once|twice|three\s+times|\d+\s+times?)\s+(?:a|per|an|each)\s+(?:day|week|month|hour|night))\b",
    )
    .ok()
});

static TRIGGER_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:worse|worsens|worsened|triggered|caused|brought\s+on|aggravated|starts|comes\s+on)\s+(?:by|when|after|with|in|during|at|on|from)\s+(?:the\s+)?([^.!?,;\n]+)",
    )
    .ok()
});

/// Keyword-matching strategy over the Knowledge Base vocabulary.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicExtractor;

impl SymptomExtractor for DeterministicExtractor {
    fn kind(&self) -> ExtractionStrategy {
        ExtractionStrategy::Deterministic
    }

    fn extract(&self, text: &str, kb: &KnowledgeBase) -> Result<Extraction, ExtractionError> {
        Ok(Extraction {
            symptoms: detect_symptoms(text, kb),
            dropped_identifiers: 0,
        })
    }
}

/// Detect Knowledge Base symptoms in detection order, with attributes pulled
/// from the sentence around each mention.
pub fn detect_symptoms(text: &str, kb: &KnowledgeBase) -> Vec<Symptom> {
    // (first position, entry index, all mention starts)
    let mut hits: Vec<(usize, usize, Vec<usize>)> = Vec::new();

    for matcher in kb.matchers() {
        for m in matcher.regex.find_iter(text) {
            match hits.iter_mut().find(|(_, idx, _)| *idx == matcher.entry_index) {
                Some((first, _, starts)) => {
                    *first = (*first).min(m.start());
                    starts.push(m.start());
                }
                None => hits.push((m.start(), matcher.entry_index, vec![m.start()])),
            }
        }
    }

    hits.sort_by_key(|(first, idx, _)| (*first, *idx));

    hits.into_iter()
        .map(|(_, idx, mut starts)| {
            let entry = kb.entry_at(idx);
            let mut symptom = entry.new_symptom(SymptomSource::KeywordMatched);
            starts.sort_unstable();
            starts.dedup();
            for start in starts {
                let window = sentence_around(text, start);
                let found = extract_attributes(window, &entry.attributes);
                symptom.attributes.merge_from(&found);
            }
            symptom
        })
        .collect()
}

/// Extract attribute values from a span of text. Unmatched attributes stay unknown.
pub fn extract_attributes(window: &str, expected: &[AttributeName]) -> SymptomAttributeSet {
    let mut set = SymptomAttributeSet::expecting(expected);
    for &attribute in expected {
        let value = match attribute {
            AttributeName::Duration => extract_duration(window),
            AttributeName::Severity => extract_severity(window),
            AttributeName::Frequency => first_capture(FREQUENCY_PATTERN.as_ref(), window),
            AttributeName::Triggers => first_capture(TRIGGER_PATTERN.as_ref(), window),
        };
        set.set(attribute, value.as_deref());
    }
    set
}

pub fn extract_duration(text: &str) -> Option<String> {
    DURATION_PATTERNS
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| normalize_value(m.as_str()))
}

pub fn extract_severity(text: &str) -> Option<String> {
    if let Some(caps) = SEVERITY_SCALE.as_ref().and_then(|re| re.captures(text)) {
        if let Some(score) = caps.get(1) {
            return Some(format!("{}/10", score.as_str()));
        }
    }
    first_capture(SEVERITY_WORDS.as_ref(), text)
}

/// First clause of a short reply, normalized like any extracted value. Used
/// when a follow-up answer matches no attribute pattern.
pub fn leading_clause(text: &str) -> Option<String> {
    let end = text
        .find(|c: char| matches!(c, '.' | '!' | '?' | ';' | '\n'))
        .unwrap_or(text.len());
    Some(normalize_value(&text[..end])).filter(|v| !v.is_empty())
}

fn first_capture(re: Option<&Regex>, text: &str) -> Option<String> {
    re.and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| normalize_value(m.as_str()))
        .filter(|v| !v.is_empty())
}

/// Lowercase, collapse whitespace, cap length on a char boundary.
fn normalize_value(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    collapsed.chars().take(MAX_VALUE_CHARS).collect::<String>().trim().to_string()
}

/// The sentence (split on terminal punctuation or newline) containing `pos`.
fn sentence_around(text: &str, pos: usize) -> &str {
    let is_boundary = |c: char| matches!(c, '.' | '!' | '?' | ';' | '\n');
    let start = text[..pos]
        .rfind(is_boundary)
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = text[pos..]
        .find(is_boundary)
        .map(|i| pos + i)
        .unwrap_or(text.len());
    &text[start..end]
}
