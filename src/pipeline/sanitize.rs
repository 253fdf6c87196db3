use std::sync::LazyLock;

use regex::Regex;

/// Maximum intake text length in characters.
pub const MAX_INPUT_LENGTH: usize = 10_000;

/// Patient text after cleanup, with a flag for whether anything changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedText {
    pub text: String,
    pub was_modified: bool,
}

/// Clean patient text before it reaches detection, translation or a backend.
pub fn sanitize_intake_text(raw: &str, max_length: usize) -> SanitizedText {
    let mut text = remove_invisible_unicode(raw);
    text = remove_control_characters(&text);
    text = remove_injection_patterns(&text);
    text = normalize_whitespace(&text);
    if text.chars().count() > max_length {
        text = truncate_at_word_boundary(&text, max_length);
    }
    let was_modified = text != raw;
    SanitizedText { text, was_modified }
}

/// Remove zero-width and invisible Unicode characters, including bidi overrides.
/// ZWNJ and ZWJ stay: Persian, Urdu and Indic spelling depends on them.
fn remove_invisible_unicode(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200B}'               // Zero-width space
                | '\u{200E}'..='\u{200F}' // LRM / RLM
                | '\u{202A}'..='\u{202E}' // Directional formatting
                | '\u{2060}'..='\u{2064}' // Invisible operators
                | '\u{2066}'..='\u{2069}' // Directional isolates
                | '\u{FEFF}'              // BOM
                | '\u{00AD}'              // Soft hyphen
                | '\u{034F}'              // Combining grapheme joiner
                | '\u{061C}'              // Arabic letter mark
                | '\u{180E}'              // Mongolian vowel separator
            )
        })
        .collect()
}

/// Remove control characters except newline and tab.
fn remove_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn remove_injection_patterns(text: &str) -> String {
    static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        [
            r"(?i)ignore\s+(?:previous|above|all\s+prior|the\s+above)\s+(?:instructions?|rules?|prompts?)",
            r"(?i)forget\s+(?:everything|all|your)\s+(?:previous|prior)?",
            r"(?i)new\s+instructions?:",
            r"(?i)you\s+are\s+now\s+(?:a|an)\s+",
            r"<<SYS>>",
            r"\[INST\]",
            r"<\|im_start\|>",
            r"<\|im_end\|>",
            r"(?i)</?patient_text>",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });

    let mut result = text.to_string();
    for pattern in INJECTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, "[FILTERED]").to_string();
    }
    result
}

/// Collapse runs of spaces/tabs within lines, trim lines, drop blank lines.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to `max` characters, backing up to the last whitespace.
fn truncate_at_word_boundary(text: &str, max: usize) -> String {
    let cut = text
        .char_indices()
        .nth(max)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let truncated = &text[..cut];
    match truncated.rfind(char::is_whitespace) {
        Some(pos) => truncated[..pos].to_string(),
        None => truncated.to_string(),
    }
}
