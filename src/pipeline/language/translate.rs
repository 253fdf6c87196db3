use std::sync::Arc;

use super::{display_name, LanguageError};
use crate::pipeline::llm::{GenerateOptions, LlmClient};

/// Longest piece of text sent to the translator in one call.
pub const MAX_CHUNK_CHARS: usize = 4_500;

const TRANSLATION_SYSTEM_PROMPT: &str = "You are a medical translator. Translate the patient's words faithfully. \
Keep symptom descriptions, numbers and time expressions exact. Do not add, explain or summarize. \
Output only the translated text.";

/// Text translation backend.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, LanguageError>;
}

/// Translation through the generative backend.
pub struct LlmTranslator {
    llm: Arc<dyn LlmClient>,
}

impl LlmTranslator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

impl Translator for LlmTranslator {
    fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, LanguageError> {
        let prompt = format!(
            "Translate the following text from {} to {}.\n\n<text>\n{}\n</text>",
            display_name(from).unwrap_or(from),
            display_name(to).unwrap_or(to),
            text
        );
        let response = self
            .llm
            .generate(&prompt, TRANSLATION_SYSTEM_PROMPT, GenerateOptions::DETERMINISTIC)?;
        let translated = strip_wrapping(&response);
        if translated.is_empty() {
            return Err(LanguageError::EmptyTranslation);
        }
        Ok(translated.to_string())
    }
}

/// Models sometimes echo the `<text>` wrapper or a code fence around the answer.
fn strip_wrapping(response: &str) -> &str {
    let mut out = response.trim();
    for (open, close) in [("<text>", "</text>"), ("```", "```")] {
        if let Some(inner) = out.strip_prefix(open).and_then(|s| s.strip_suffix(close)) {
            out = inner.trim();
        }
    }
    out
}

/// Split text into chunks of at most `max_chars` characters, on line
/// boundaries where possible and on whitespace otherwise.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.lines() {
        for piece in split_long_line(line, max_chars) {
            let piece_len = piece.chars().count();
            let joined_len = if current.is_empty() { piece_len } else { current_len + 1 + piece_len };
            if joined_len > max_chars && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_long_line(line: &str, max_chars: usize) -> Vec<String> {
    if line.chars().count() <= max_chars {
        return vec![line.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in line.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        // A single word longer than a chunk is hard-split.
        if word_len > max_chars {
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(max_chars) {
                if current_len > 0 {
                    pieces.push(std::mem::take(&mut current));
                }
                current = part.iter().collect();
                current_len = part.len();
            }
            continue;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{LlmError, MockLlmClient};

    #[test]
    fn llm_translator_returns_trimmed_text() {
        let llm = Arc::new(MockLlmClient::new("  <text>I have a headache</text> \n"));
        let translator = LlmTranslator::new(llm.clone());
        let out = translator.translate("J'ai mal à la tête", "fr", "en").unwrap();
        assert_eq!(out, "I have a headache");
        assert!(llm.calls()[0].contains("from French to English"));
    }

    #[test]
    fn empty_translation_is_an_error() {
        let translator = LlmTranslator::new(Arc::new(MockLlmClient::new("   ")));
        assert!(matches!(
            translator.translate("hola", "es", "en"),
            Err(LanguageError::EmptyTranslation)
        ));
    }

    #[test]
    fn backend_errors_propagate() {
        let translator =
            LlmTranslator::new(Arc::new(MockLlmClient::failing(LlmError::Timeout(30))));
        assert!(matches!(
            translator.translate("hola", "es", "en"),
            Err(LanguageError::Backend(LlmError::Timeout(30)))
        ));
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("one\ntwo", 100), vec!["one\ntwo".to_string()]);
        assert!(chunk_text("", 100).is_empty());
    }

    #[test]
    fn chunks_respect_limit() {
        let line = "word ".repeat(50);
        let text = format!("{line}\n{line}\n{line}");
        let chunks = chunk_text(&text, 120);
        assert!(chunks.len() > 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 120));
        let words: usize = chunks.iter().map(|c| c.split_whitespace().count()).sum();
        assert_eq!(words, 150);
    }

    #[test]
    fn oversized_word_is_hard_split() {
        let word = "x".repeat(25);
        let chunks = chunk_text(&word, 10);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![10, 10, 5]);
    }
}
