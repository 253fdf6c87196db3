//! Script- and keyword-based language detection.
//!
//! Non-Latin scripts identify the language (or a small family, disambiguated
//! by marker letters) directly. Latin text is scored against per-language
//! indicator words and marker diacritics. Confidence is scaled down for text
//! shorter than the script's minimum reliable length.

use serde::{Deserialize, Serialize};

/// Code reported when no letters are present at all.
pub const UNDETERMINED: &str = "und";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub language: String,
    pub confidence: f32,
}

impl Detection {
    fn new(language: &str, confidence: f32) -> Self {
        Self {
            language: language.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Devanagari,
    Bengali,
    Gujarati,
    Tamil,
    Telugu,
    Thai,
    Hangul,
    Kana,
    Han,
}

impl Script {
    const ALL: [Script; 14] = [
        Script::Latin,
        Script::Cyrillic,
        Script::Greek,
        Script::Arabic,
        Script::Hebrew,
        Script::Devanagari,
        Script::Bengali,
        Script::Gujarati,
        Script::Tamil,
        Script::Telugu,
        Script::Thai,
        Script::Hangul,
        Script::Kana,
        Script::Han,
    ];

    fn of(c: char) -> Option<Script> {
        match c as u32 {
            0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F | 0x1E00..=0x1EFF => {
                Some(Script::Latin)
            }
            0x0370..=0x03FF => Some(Script::Greek),
            0x0400..=0x04FF => Some(Script::Cyrillic),
            0x0590..=0x05FF => Some(Script::Hebrew),
            0x0600..=0x06FF | 0x0750..=0x077F | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF => {
                Some(Script::Arabic)
            }
            0x0900..=0x097F => Some(Script::Devanagari),
            0x0980..=0x09FF => Some(Script::Bengali),
            0x0A80..=0x0AFF => Some(Script::Gujarati),
            0x0B80..=0x0BFF => Some(Script::Tamil),
            0x0C00..=0x0C7F => Some(Script::Telugu),
            0x0E00..=0x0E7F => Some(Script::Thai),
            0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF => Some(Script::Hangul),
            0x3040..=0x30FF => Some(Script::Kana),
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => Some(Script::Han),
            _ => None,
        }
    }

    /// Letters needed before detection is trusted at full confidence.
    fn min_chars(self) -> usize {
        match self {
            Script::Latin => 30,
            Script::Cyrillic | Script::Greek => 20,
            Script::Arabic
            | Script::Hebrew
            | Script::Devanagari
            | Script::Bengali
            | Script::Gujarati
            | Script::Tamil
            | Script::Telugu
            | Script::Thai => 15,
            Script::Hangul | Script::Kana | Script::Han => 10,
        }
    }
}

// ─── Latin indicator tables ───

const LATIN_INDICATORS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "have", "has", "had", "been", "with", "for", "my", "is", "it", "this",
            "that", "since", "days", "pain", "feel", "worse", "when", "of", "i", "am",
        ],
    ),
    (
        "es",
        &[
            "el", "los", "las", "y", "tengo", "desde", "hace", "dolor", "con", "por", "muy", "mi",
            "días", "cabeza", "me", "duele", "una", "es",
        ],
    ),
    (
        "fr",
        &[
            "le", "les", "et", "j'ai", "depuis", "avec", "pour", "très", "mal", "mon", "ma",
            "jours", "tête", "une", "est", "je", "douleur", "des",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ich", "habe", "seit", "mit", "sehr", "mein", "meine",
            "tagen", "kopfschmerzen", "schmerzen", "ist", "nicht", "ein", "eine",
        ],
    ),
    (
        "it",
        &[
            "il", "gli", "della", "ho", "da", "giorni", "mal", "molto", "mio", "mia", "con",
            "sono", "dolore", "testa", "non", "che",
        ],
    ),
    (
        "pt",
        &[
            "os", "eu", "tenho", "há", "desde", "dor", "com", "muito", "meu", "minha", "dias",
            "cabeça", "não", "uma", "estou",
        ],
    ),
    (
        "nl",
        &[
            "de", "het", "een", "ik", "heb", "sinds", "met", "erg", "mijn", "dagen", "hoofdpijn",
            "pijn", "niet", "en", "is",
        ],
    ),
    (
        "tr",
        &["ve", "bir", "bu", "çok", "gündür", "ağrı", "ağrısı", "var", "benim", "başım", "değil"],
    ),
    (
        "pl",
        &["i", "nie", "mam", "od", "się", "bardzo", "ból", "głowy", "dni", "jest", "mnie"],
    ),
    (
        "vi",
        &["tôi", "bị", "đau", "ngày", "và", "không", "rất", "của", "đầu", "có"],
    ),
];

/// Letters that strongly mark one Latin-script language.
const LATIN_MARKERS: &[(&str, &[char])] = &[
    ("tr", &['ğ', 'ş', 'ı', 'İ']),
    ("pl", &['ą', 'ę', 'ł', 'ś', 'ź', 'ż', 'ń']),
    ("vi", &['ơ', 'ư', 'đ', 'ạ', 'ả', 'ấ', 'ầ', 'ẩ', 'ậ', 'ệ', 'ộ', 'ố', 'ờ']),
    ("de", &['ß', 'ä', 'ö']),
    ("pt", &['ã', 'õ']),
    ("es", &['ñ', '¿', '¡']),
    ("fr", &['è', 'ê', 'ç', 'œ']),
];

const MARKER_WEIGHT: u32 = 2;

/// Detect the language of `text`.
pub fn detect(text: &str) -> Detection {
    let mut counts = [0usize; Script::ALL.len()];
    for c in text.chars() {
        if let Some(script) = Script::of(c) {
            counts[script as usize] += 1;
        }
    }

    let total: usize = counts.iter().sum();
    if total == 0 {
        return Detection::new(UNDETERMINED, 0.0);
    }

    // Kana outranks Han: Japanese text mixes both.
    let kana = counts[Script::Kana as usize];
    let (dominant_idx, dominant_count) = if kana > 0 {
        (Script::Kana as usize, kana + counts[Script::Han as usize])
    } else {
        counts
            .iter()
            .enumerate()
            .max_by_key(|(i, c)| (**c, std::cmp::Reverse(*i)))
            .map(|(i, c)| (i, *c))
            .unwrap_or((0, 0))
    };
    let script = Script::ALL[dominant_idx];

    let share = dominant_count as f32 / total as f32;
    let length_factor = (dominant_count as f32 / script.min_chars() as f32).min(1.0);

    let (language, certainty) = match script {
        Script::Latin => detect_latin(text),
        Script::Cyrillic => (detect_cyrillic(text), 1.0),
        Script::Arabic => (detect_arabic_script(text), 1.0),
        Script::Greek => ("el", 1.0),
        Script::Hebrew => ("he", 1.0),
        Script::Devanagari => ("hi", 1.0),
        Script::Bengali => ("bn", 1.0),
        Script::Gujarati => ("gu", 1.0),
        Script::Tamil => ("ta", 1.0),
        Script::Telugu => ("te", 1.0),
        Script::Thai => ("th", 1.0),
        Script::Hangul => ("ko", 1.0),
        Script::Kana => ("ja", 1.0),
        Script::Han => ("zh", 1.0),
    };

    Detection::new(language, share * length_factor * certainty)
}

fn detect_arabic_script(text: &str) -> &'static str {
    if text.chars().any(|c| matches!(c, 'ٹ' | 'ڈ' | 'ڑ' | 'ں' | 'ے')) {
        "ur"
    } else if text.chars().any(|c| matches!(c, 'پ' | 'چ' | 'ژ' | 'گ')) {
        "fa"
    } else {
        "ar"
    }
}

fn detect_cyrillic(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.chars().any(|c| matches!(c, 'і' | 'ї' | 'є' | 'ґ')) {
        "uk"
    } else if lower.contains('ъ') && !lower.chars().any(|c| matches!(c, 'ы' | 'э')) {
        "bg"
    } else {
        "ru"
    }
}

/// Score Latin text. Returns the best language and a margin-based certainty.
fn detect_latin(text: &str) -> (&'static str, f32) {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphabetic() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();

    let mut scores: Vec<(&'static str, u32)> = LATIN_INDICATORS
        .iter()
        .map(|(lang, indicators)| {
            let hits = words.iter().filter(|w| indicators.contains(w)).count() as u32;
            (*lang, hits)
        })
        .collect();

    for (lang, markers) in LATIN_MARKERS {
        let hits = lower.chars().filter(|c| markers.contains(c)).count() as u32;
        if let Some(entry) = scores.iter_mut().find(|(l, _)| l == lang) {
            entry.1 += hits * MARKER_WEIGHT;
        }
    }

    // Stable: ties resolve to table order.
    scores.sort_by(|a, b| b.1.cmp(&a.1));
    let best = scores[0];
    let second = scores.get(1).map(|s| s.1).unwrap_or(0);

    if best.1 == 0 {
        return ("en", 0.3);
    }
    (best.0, best.1 as f32 / (best.1 + second) as f32)
}
