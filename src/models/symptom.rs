use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attributes collected for every symptom, in follow-up priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeName {
    Severity,
    Duration,
    Frequency,
    Triggers,
}

impl AttributeName {
    /// Fixed order in which missing attributes are requested.
    pub const PRIORITY: [AttributeName; 4] = [
        AttributeName::Severity,
        AttributeName::Duration,
        AttributeName::Frequency,
        AttributeName::Triggers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Severity => "severity",
            Self::Duration => "duration",
            Self::Frequency => "frequency",
            Self::Triggers => "triggers",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "severity" => Some(Self::Severity),
            "duration" => Some(Self::Duration),
            "frequency" => Some(Self::Frequency),
            "triggers" | "factors" | "trigger" => Some(Self::Triggers),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute name to optional value. A missing or blank value means "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymptomAttributeSet(BTreeMap<AttributeName, Option<String>>);

impl SymptomAttributeSet {
    /// An attribute set with every expected attribute present but unknown.
    pub fn expecting(attributes: &[AttributeName]) -> Self {
        Self(attributes.iter().map(|a| (*a, None)).collect())
    }

    pub fn get(&self, attribute: AttributeName) -> Option<&str> {
        self.0.get(&attribute).and_then(|v| v.as_deref())
    }

    pub fn is_known(&self, attribute: AttributeName) -> bool {
        self.get(attribute).is_some()
    }

    /// Set a value. Blank input is stored as unknown rather than as empty text.
    pub fn set(&mut self, attribute: AttributeName, value: Option<&str>) {
        let value = value.map(str::trim).filter(|v| !v.is_empty()).map(String::from);
        self.0.insert(attribute, value);
    }

    /// Fill an attribute only when it is currently unknown.
    pub fn fill_if_unknown(&mut self, attribute: AttributeName, value: Option<&str>) {
        if !self.is_known(attribute) {
            self.set(attribute, value);
        }
    }

    /// Union with another set: known values here are kept, unknown ones take the other's value.
    pub fn merge_from(&mut self, other: &SymptomAttributeSet) {
        for (attribute, value) in &other.0 {
            self.fill_if_unknown(*attribute, value.as_deref());
        }
    }

    /// Attributes this set tracks (known or not).
    pub fn expected(&self) -> impl Iterator<Item = AttributeName> + '_ {
        self.0.keys().copied()
    }

    pub fn expected_count(&self) -> usize {
        self.0.len()
    }

    pub fn known_count(&self) -> usize {
        self.0.values().filter(|v| v.is_some()).count()
    }
}

/// How a symptom entered the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomSource {
    KeywordMatched,
    ModelExtracted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symptom {
    /// Canonical Knowledge Base identifier. Identity of the symptom within a record.
    pub id: String,
    pub display_name: String,
    pub attributes: SymptomAttributeSet,
    pub source: SymptomSource,
}

impl Symptom {
    pub fn new(
        id: &str,
        display_name: &str,
        expected: &[AttributeName],
        source: SymptomSource,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            attributes: SymptomAttributeSet::expecting(expected),
            source,
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeName, value: &str) -> Self {
        self.attributes.set(attribute, Some(value));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_unknown() {
        let mut set = SymptomAttributeSet::expecting(&AttributeName::PRIORITY);
        set.set(AttributeName::Duration, Some("   "));
        assert!(!set.is_known(AttributeName::Duration));
        assert_eq!(set.known_count(), 0);
        assert_eq!(set.expected_count(), 4);
    }

    #[test]
    fn merge_keeps_known_and_fills_unknown() {
        let mut first = SymptomAttributeSet::expecting(&AttributeName::PRIORITY);
        first.set(AttributeName::Severity, Some("mild"));

        let mut later = SymptomAttributeSet::expecting(&AttributeName::PRIORITY);
        later.set(AttributeName::Severity, Some("severe"));
        later.set(AttributeName::Duration, Some("two weeks"));

        first.merge_from(&later);
        assert_eq!(first.get(AttributeName::Severity), Some("mild"));
        assert_eq!(first.get(AttributeName::Duration), Some("two weeks"));
    }

    #[test]
    fn attribute_parse_accepts_legacy_factor_name() {
        assert_eq!(AttributeName::parse("Factors"), Some(AttributeName::Triggers));
        assert_eq!(AttributeName::parse(" severity "), Some(AttributeName::Severity));
        assert_eq!(AttributeName::parse("colour"), None);
    }

    #[test]
    fn attribute_set_serializes_as_map() {
        let symptom = Symptom::new(
            "headache",
            "Headache",
            &[AttributeName::Severity, AttributeName::Duration],
            SymptomSource::KeywordMatched,
        )
        .with_attribute(AttributeName::Severity, "severe");
        let json = serde_json::to_value(&symptom).unwrap();
        assert_eq!(json["attributes"]["severity"], "severe");
        assert!(json["attributes"]["duration"].is_null());
        assert_eq!(json["source"], "keyword_matched");
    }
}
