pub mod detect;
pub mod translate;

pub use detect::{detect, Detection, UNDETERMINED};
pub use translate::{chunk_text, LlmTranslator, Translator, MAX_CHUNK_CHARS};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::models::Degradation;
use crate::pipeline::llm::LlmError;

#[derive(Error, Debug)]
pub enum LanguageError {
    #[error("Translation backend failed: {0}")]
    Backend(#[from] LlmError),

    #[error("Translation backend returned empty text")]
    EmptyTranslation,

    #[error("No translation backend configured")]
    Unavailable,
}

impl LanguageError {
    /// Only transient backend failures are worth a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LanguageError::Backend(e) => e.is_retryable(),
            LanguageError::EmptyTranslation | LanguageError::Unavailable => false,
        }
    }
}

/// Languages with reliable detection and translation, with display names.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("nl", "Dutch"),
    ("tr", "Turkish"),
    ("pl", "Polish"),
    ("ru", "Russian"),
    ("uk", "Ukrainian"),
    ("bg", "Bulgarian"),
    ("el", "Greek"),
    ("ar", "Arabic"),
    ("fa", "Persian"),
    ("ur", "Urdu"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("mr", "Marathi"),
    ("bn", "Bengali"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("gu", "Gujarati"),
    ("th", "Thai"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("vi", "Vietnamese"),
];

pub fn display_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn is_supported(code: &str) -> bool {
    display_name(code).is_some()
}

/// Text ready for extraction, plus what happened on the way there.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalText {
    pub text: String,
    /// `None` when detection confidence was below the threshold.
    pub detected_language: Option<String>,
    pub confidence: f32,
    pub translation_applied: bool,
    pub degradations: Vec<Degradation>,
}

/// Detects input language and brings text into the canonical working language.
///
/// Both failure modes are fail-open: a low-confidence guess passes the text
/// through as canonical, and a translation that still fails after one retry
/// passes the untranslated text through.
pub struct LanguageService {
    canonical: String,
    confidence_threshold: f32,
    retry_backoff: Duration,
    translator: Option<Arc<dyn Translator>>,
}

impl LanguageService {
    pub fn new(
        canonical: &str,
        confidence_threshold: f32,
        retry_backoff: Duration,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        Self {
            canonical: canonical.to_string(),
            confidence_threshold,
            retry_backoff,
            translator,
        }
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn detect(&self, text: &str) -> Detection {
        detect(text)
    }

    /// Translate `text`, chunked. A chunk that fails transiently is retried
    /// once after the backoff; permanent failures surface immediately.
    pub fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, LanguageError> {
        if from == to || text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let translator = self.translator.as_ref().ok_or(LanguageError::Unavailable)?;

        let mut translated = Vec::new();
        for chunk in chunk_text(text, MAX_CHUNK_CHARS) {
            let out = match translator.translate(&chunk, from, to) {
                Ok(out) => out,
                Err(first) if first.is_retryable() => {
                    tracing::debug!(error = %first, "Translation failed, retrying once");
                    std::thread::sleep(self.retry_backoff);
                    translator.translate(&chunk, from, to)?
                }
                Err(e) => return Err(e),
            };
            translated.push(out);
        }
        Ok(translated.join("\n"))
    }

    /// Detect, then translate into the canonical language when needed.
    pub fn to_canonical(&self, text: &str) -> CanonicalText {
        let detection = self.detect(text);
        if detection.confidence < self.confidence_threshold {
            let mut degradations = Vec::new();
            if !text.trim().is_empty() {
                tracing::info!(
                    guess = %detection.language,
                    confidence = detection.confidence,
                    "Language detection below threshold, assuming canonical"
                );
                degradations.push(Degradation::DetectionLowConfidence);
            }
            return CanonicalText {
                text: text.to_string(),
                detected_language: None,
                confidence: detection.confidence,
                translation_applied: false,
                degradations,
            };
        }

        let mut result = self.translate_from(text, &detection.language);
        result.detected_language = Some(detection.language);
        result.confidence = detection.confidence;
        result
    }

    /// Translate text already known to be in `language` (e.g. a follow-up
    /// answer in the session's detected language).
    pub fn translate_from(&self, text: &str, language: &str) -> CanonicalText {
        let mut result = CanonicalText {
            text: text.to_string(),
            detected_language: Some(language.to_string()),
            confidence: 1.0,
            translation_applied: false,
            degradations: Vec::new(),
        };
        if language == self.canonical || text.trim().is_empty() {
            return result;
        }

        match self.translate(text, language, &self.canonical) {
            Ok(translated) => {
                result.text = translated;
                result.translation_applied = true;
            }
            Err(e) => {
                tracing::warn!(
                    from = %language,
                    to = %self.canonical,
                    error = %e,
                    "Translation unavailable, continuing with untranslated text"
                );
                result.degradations.push(Degradation::TranslationUnavailable);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::MockLlmClient;

    const FRENCH: &str = "J'ai très mal à la tête depuis trois jours, avec de la fièvre";

    fn service(llm: MockLlmClient) -> (LanguageService, Arc<MockLlmClient>) {
        let llm = Arc::new(llm);
        let translator: Arc<dyn Translator> = Arc::new(LlmTranslator::new(llm.clone()));
        (
            LanguageService::new("en", 0.5, Duration::ZERO, Some(translator)),
            llm,
        )
    }

    #[test]
    fn canonical_language_is_not_translated() {
        let (svc, llm) = service(MockLlmClient::new("unused"));
        let out = svc.to_canonical("I have had a severe headache for three days, worse in the morning");
        assert_eq!(out.detected_language.as_deref(), Some("en"));
        assert!(!out.translation_applied);
        assert!(out.degradations.is_empty());
        assert!(llm.calls().is_empty());
    }

    #[test]
    fn foreign_text_is_translated() {
        let (svc, _) = service(MockLlmClient::new("I have a bad headache for three days, with fever"));
        let out = svc.to_canonical(FRENCH);
        assert_eq!(out.detected_language.as_deref(), Some("fr"));
        assert!(out.translation_applied);
        assert_eq!(out.text, "I have a bad headache for three days, with fever");
    }

    #[test]
    fn translation_is_retried_once() {
        let (svc, llm) = service(MockLlmClient::scripted(vec![
            Err(LlmError::Backend { status: 429, body: "slow down".into() }),
            Ok("translated".into()),
        ]));
        let out = svc.to_canonical(FRENCH);
        assert!(out.translation_applied);
        assert_eq!(out.text, "translated");
        assert_eq!(llm.calls().len(), 2);
    }

    #[test]
    fn persistent_translation_failure_passes_through() {
        let (svc, llm) = service(MockLlmClient::failing(LlmError::Connection("x".into())));
        let out = svc.to_canonical(FRENCH);
        assert!(!out.translation_applied);
        assert_eq!(out.text, FRENCH);
        assert_eq!(out.detected_language.as_deref(), Some("fr"));
        assert_eq!(out.degradations, vec![Degradation::TranslationUnavailable]);
        assert_eq!(llm.calls().len(), 2);
    }

    #[test]
    fn rejected_request_is_not_retried() {
        let (svc, llm) = service(MockLlmClient::failing(LlmError::Backend {
            status: 400,
            body: "bad request".into(),
        }));
        let out = svc.to_canonical(FRENCH);
        assert!(!out.translation_applied);
        assert_eq!(out.degradations, vec![Degradation::TranslationUnavailable]);
        assert_eq!(llm.calls().len(), 1);
    }

    #[test]
    fn empty_translation_is_not_retried() {
        let (svc, llm) = service(MockLlmClient::new("   "));
        let err = svc.translate("bonjour", "fr", "en").unwrap_err();
        assert!(matches!(err, LanguageError::EmptyTranslation));
        assert_eq!(llm.calls().len(), 1);
    }

    #[test]
    fn low_confidence_assumes_canonical() {
        let (svc, llm) = service(MockLlmClient::new("unused"));
        let out = svc.to_canonical("toux");
        assert_eq!(out.detected_language, None);
        assert_eq!(out.text, "toux");
        assert_eq!(out.degradations, vec![Degradation::DetectionLowConfidence]);
        assert!(llm.calls().is_empty());
    }

    #[test]
    fn empty_text_has_no_degradation() {
        let (svc, _) = service(MockLlmClient::new("unused"));
        let out = svc.to_canonical("");
        assert!(out.degradations.is_empty());
        assert_eq!(out.text, "");
    }

    #[test]
    fn missing_translator_degrades() {
        let svc = LanguageService::new("en", 0.5, Duration::ZERO, None);
        let out = svc.to_canonical(FRENCH);
        assert!(!out.translation_applied);
        assert_eq!(out.degradations, vec![Degradation::TranslationUnavailable]);
    }

    #[test]
    fn long_text_is_translated_in_chunks() {
        let (svc, llm) = service(MockLlmClient::new("chunk"));
        let text = "mot ".repeat(3_000);
        let out = svc.translate(&text, "fr", "en").unwrap();
        assert_eq!(llm.calls().len(), 3);
        assert_eq!(out, "chunk\nchunk\nchunk");
    }

    #[test]
    fn language_table() {
        assert_eq!(display_name("ar"), Some("Arabic"));
        assert!(is_supported("vi"));
        assert!(!is_supported("xx"));
    }
}
