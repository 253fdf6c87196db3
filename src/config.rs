use std::path::PathBuf;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{RecordKey, MIN_SALT_LENGTH};
use crate::models::{ExtractionStrategy, SummaryStrategy};

pub const APP_NAME: &str = "symptom-intake";

const ENV_PREFIX: &str = "INTAKE_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("No encryption key configured (set INTAKE_ENCRYPTION_KEY or INTAKE_ENCRYPTION_PASSPHRASE with INTAKE_ENCRYPTION_SALT)")]
    MissingKey,

    #[error("Invalid encryption key material: {0}")]
    InvalidKey(String),
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "symptom_intake=info"
}

/// Per-user data directory, e.g. `~/.local/share/symptom-intake`.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME))
}

/// Every tunable of the pipeline. Resolved once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub canonical_language: String,
    /// Detections below this confidence are treated as unknown.
    pub detection_threshold: f32,
    pub translation_backoff_ms: u64,
    pub extraction_strategy: ExtractionStrategy,
    pub summary_strategy: SummaryStrategy,
    pub ollama_url: String,
    pub model: String,
    pub backend_timeout_secs: u64,
    /// Records freeze once completeness reaches this fraction.
    pub completeness_threshold: f32,
    pub max_rounds: u32,
    pub max_questions_per_round: usize,
    pub database_path: Option<PathBuf>,
    pub report_font_path: Option<PathBuf>,
    /// Extra fonts tried after the primary, before installed script fonts.
    pub report_fallback_fonts: Vec<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            canonical_language: "en".to_string(),
            detection_threshold: 0.5,
            translation_backoff_ms: 500,
            extraction_strategy: ExtractionStrategy::Model,
            summary_strategy: SummaryStrategy::Model,
            ollama_url: "http://localhost:11434".to_string(),
            model: "medgemma:4b".to_string(),
            backend_timeout_secs: 30,
            completeness_threshold: 0.85,
            max_rounds: 3,
            max_questions_per_round: 8,
            database_path: app_data_dir().map(|d| d.join("records.db")),
            report_font_path: None,
            report_fallback_fonts: Vec::new(),
        }
    }
}

impl IntakeConfig {
    /// Load `.env` if present, then read `INTAKE_*` variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("CANONICAL_LANGUAGE") {
            config.canonical_language = v.to_lowercase();
        }
        if let Some(v) = get("DETECTION_THRESHOLD") {
            config.detection_threshold = parse_fraction("DETECTION_THRESHOLD", &v)?;
        }
        if let Some(v) = get("TRANSLATION_BACKOFF_MS") {
            config.translation_backoff_ms = parse_number("TRANSLATION_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("EXTRACTION_STRATEGY") {
            config.extraction_strategy = match v.to_lowercase().as_str() {
                "model" => ExtractionStrategy::Model,
                "deterministic" => ExtractionStrategy::Deterministic,
                _ => return Err(invalid("EXTRACTION_STRATEGY", &v)),
            };
        }
        if let Some(v) = get("SUMMARY_STRATEGY") {
            config.summary_strategy = match v.to_lowercase().as_str() {
                "model" => SummaryStrategy::Model,
                "template" => SummaryStrategy::Template,
                _ => return Err(invalid("SUMMARY_STRATEGY", &v)),
            };
        }
        if let Some(v) = get("OLLAMA_URL") {
            config.ollama_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("MODEL") {
            config.model = v;
        }
        if let Some(v) = get("BACKEND_TIMEOUT_SECS") {
            config.backend_timeout_secs = parse_number("BACKEND_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("COMPLETENESS_THRESHOLD") {
            config.completeness_threshold = parse_fraction("COMPLETENESS_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MAX_ROUNDS") {
            config.max_rounds = parse_number("MAX_ROUNDS", &v)?;
        }
        if let Some(v) = get("MAX_QUESTIONS_PER_ROUND") {
            config.max_questions_per_round = parse_number("MAX_QUESTIONS_PER_ROUND", &v)?;
        }
        if let Some(v) = get("DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("REPORT_FONT_PATH") {
            config.report_font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("REPORT_FALLBACK_FONTS") {
            config.report_fallback_fonts = std::env::split_paths(&v).collect();
        }

        Ok(config)
    }
}

/// Process-wide record key from the environment.
pub fn load_record_key() -> Result<RecordKey, ConfigError> {
    dotenvy::dotenv().ok();
    record_key_from_lookup(|name| std::env::var(name).ok())
}

pub fn record_key_from_lookup<F>(lookup: F) -> Result<RecordKey, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(encoded) = lookup("INTAKE_ENCRYPTION_KEY").filter(|v| !v.trim().is_empty()) {
        return RecordKey::from_base64(encoded.trim())
            .map_err(|e| ConfigError::InvalidKey(e.to_string()));
    }
    let passphrase = lookup("INTAKE_ENCRYPTION_PASSPHRASE").filter(|v| !v.is_empty());
    let salt = lookup("INTAKE_ENCRYPTION_SALT").filter(|v| !v.trim().is_empty());
    match (passphrase, salt) {
        (Some(passphrase), Some(salt)) => {
            let salt = BASE64
                .decode(salt.trim())
                .map_err(|_| ConfigError::InvalidKey("salt is not valid base64".into()))?;
            if salt.len() < MIN_SALT_LENGTH {
                return Err(ConfigError::InvalidKey(format!(
                    "salt must be at least {MIN_SALT_LENGTH} bytes"
                )));
            }
            Ok(RecordKey::derive(&passphrase, &salt))
        }
        _ => Err(ConfigError::MissingKey),
    }
}

fn invalid(suffix: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: format!("{ENV_PREFIX}{suffix}"),
        value: value.to_string(),
    }
}

fn parse_number<T: FromStr>(suffix: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(suffix, value))
}

fn parse_fraction(suffix: &str, value: &str) -> Result<f32, ConfigError> {
    let v: f32 = parse_number(suffix, value)?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(invalid(suffix, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = IntakeConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config, IntakeConfig::default());
        assert_eq!(config.canonical_language, "en");
        assert!((config.completeness_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.max_rounds, 3);
    }

    #[test]
    fn variables_override_defaults() {
        let config = IntakeConfig::from_lookup(env(&[
            ("INTAKE_EXTRACTION_STRATEGY", "deterministic"),
            ("INTAKE_SUMMARY_STRATEGY", "Template"),
            ("INTAKE_MAX_ROUNDS", "5"),
            ("INTAKE_OLLAMA_URL", "http://gpu-box:11434/"),
            ("INTAKE_DATABASE_PATH", "/tmp/intake.db"),
            ("INTAKE_REPORT_FALLBACK_FONTS", "/fonts/a.ttf:/fonts/b.ttf"),
        ]))
        .unwrap();
        assert_eq!(config.extraction_strategy, ExtractionStrategy::Deterministic);
        assert_eq!(config.summary_strategy, SummaryStrategy::Template);
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.ollama_url, "http://gpu-box:11434");
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/intake.db")));
        #[cfg(unix)]
        assert_eq!(
            config.report_fallback_fonts,
            vec![PathBuf::from("/fonts/a.ttf"), PathBuf::from("/fonts/b.ttf")]
        );
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = IntakeConfig::from_lookup(env(&[("INTAKE_MAX_ROUNDS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "INTAKE_MAX_ROUNDS"));
        assert!(IntakeConfig::from_lookup(env(&[("INTAKE_COMPLETENESS_THRESHOLD", "1.5")])).is_err());
        assert!(IntakeConfig::from_lookup(env(&[("INTAKE_EXTRACTION_STRATEGY", "magic")])).is_err());
    }

    #[test]
    fn key_from_base64() {
        let encoded = BASE64.encode([7u8; 32]);
        let key = record_key_from_lookup(env(&[("INTAKE_ENCRYPTION_KEY", encoded.as_str())])).unwrap();
        assert_eq!(key.key_id(), RecordKey::from_bytes([7u8; 32]).key_id());
    }

    #[test]
    fn missing_key_is_an_error() {
        assert!(matches!(record_key_from_lookup(env(&[])), Err(ConfigError::MissingKey)));
        let only_pass = env(&[("INTAKE_ENCRYPTION_PASSPHRASE", "secret")]);
        assert!(matches!(record_key_from_lookup(only_pass), Err(ConfigError::MissingKey)));
    }

    #[test]
    fn short_salt_is_rejected() {
        let salt = BASE64.encode([1u8; 4]);
        let err = record_key_from_lookup(env(&[
            ("INTAKE_ENCRYPTION_PASSPHRASE", "secret"),
            ("INTAKE_ENCRYPTION_SALT", salt.as_str()),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey(_)));
    }

    #[test]
    fn log_filter_targets_crate() {
        assert_eq!(default_log_filter(), "symptom_intake=info");
    }
}
