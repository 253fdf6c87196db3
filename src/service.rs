//! Intake facade: the five operations exposed to the surrounding application.
//!
//! Sessions are independent. The session table lock is held only long enough
//! to find a session; each round then runs under that session's own lock, so
//! a slow backend call in one session never blocks another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::IntakeConfig;
use crate::crypto::{
    decrypt_deserializable, decrypt_record, encrypt_record, encrypt_serializable, CryptoError,
    RecordKey,
};
use crate::models::{
    AttributeName, Audience, ClinicalSummary, EncryptedRecord, FollowUpQuestion, SymptomRecord,
};
use crate::pipeline::extraction::deterministic::{extract_attributes, leading_clause};
use crate::pipeline::extraction::ExtractionEngine;
use crate::pipeline::followup::{FollowUpPlanner, StopReason};
use crate::pipeline::knowledge::{KnowledgeBase, KnowledgeBaseError};
use crate::pipeline::language::{LanguageService, LlmTranslator, Translator};
use crate::pipeline::llm::{LlmClient, OllamaClient};
use crate::pipeline::sanitize::{sanitize_intake_text, MAX_INPUT_LENGTH};
use crate::pipeline::summary::SummaryGenerator;
use crate::render::{RenderError, RenderedReport, ReportRenderer};
use crate::store::{RecordStore, SqliteRecordStore, StoreError};

/// Longest accepted follow-up answer, in characters.
const MAX_ANSWER_LENGTH: usize = 1_000;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Unknown intake session: {0}")]
    UnknownSession(Uuid),

    #[error("Intake session {0} is frozen and no longer accepts answers")]
    SessionFrozen(Uuid),

    #[error("No symptom in session {session_id} matches {target}")]
    UnknownSymptom { session_id: Uuid, target: String },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record unreadable: {0}")]
    RecordUnreadable(#[from] CryptoError),

    #[error("Record store error: {0}")]
    Store(StoreError),

    #[error("Report rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error("Session lock poisoned")]
    Poisoned,
}

impl From<StoreError> for IntakeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::RecordNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// What a caller sees after each round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeSnapshot {
    pub record: SymptomRecord,
    pub questions: Vec<FollowUpQuestion>,
}

impl IntakeSnapshot {
    fn of(record: &SymptomRecord) -> Self {
        Self {
            record: record.clone(),
            questions: record.metadata.open_questions.clone(),
        }
    }
}

type SessionSlot = Arc<Mutex<SymptomRecord>>;

pub struct IntakeService {
    language: LanguageService,
    engine: ExtractionEngine,
    planner: FollowUpPlanner,
    summaries: SummaryGenerator,
    renderer: ReportRenderer,
    key: RecordKey,
    store: Arc<dyn RecordStore>,
    sessions: Mutex<HashMap<Uuid, SessionSlot>>,
}

impl IntakeService {
    /// Wire every component from explicit parts. `llm` is used for translation
    /// and for whichever strategies the config selects as `model`.
    pub fn new(
        config: &IntakeConfig,
        kb: Arc<KnowledgeBase>,
        llm: Option<Arc<dyn LlmClient>>,
        renderer: ReportRenderer,
        key: RecordKey,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let translator = llm
            .clone()
            .map(|llm| Arc::new(LlmTranslator::new(llm)) as Arc<dyn Translator>);
        Self {
            language: LanguageService::new(
                &config.canonical_language,
                config.detection_threshold,
                Duration::from_millis(config.translation_backoff_ms),
                translator,
            ),
            engine: ExtractionEngine::for_strategy(
                config.extraction_strategy,
                kb.clone(),
                llm.clone(),
            ),
            planner: FollowUpPlanner::new(
                kb.clone(),
                config.completeness_threshold,
                config.max_rounds,
                config.max_questions_per_round,
            ),
            summaries: SummaryGenerator::for_strategy(config.summary_strategy, kb, llm),
            renderer,
            key,
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Build the production stack: builtin knowledge base, Ollama backend,
    /// SQLite store at the configured path, discovered report font.
    pub fn from_config(config: &IntakeConfig, key: RecordKey) -> Result<Self, IntakeError> {
        let kb = Arc::new(KnowledgeBase::builtin()?);
        let client = OllamaClient::new(&config.ollama_url, &config.model, config.backend_timeout_secs);
        let llm = match client {
            Ok(client) => Some(Arc::new(client) as Arc<dyn LlmClient>),
            Err(e) => {
                tracing::warn!(error = %e, "Model backend client unavailable, deterministic strategies only");
                None
            }
        };
        let store: Arc<dyn RecordStore> = match &config.database_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
                }
                Arc::new(SqliteRecordStore::open(path)?)
            }
            None => Arc::new(SqliteRecordStore::open_in_memory()?),
        };
        let renderer = ReportRenderer::discover(
            config.report_font_path.as_deref(),
            &config.report_fallback_fonts,
        )?;
        Ok(Self::new(config, kb, llm, renderer, key, store))
    }

    fn session(&self, session_id: Uuid) -> Result<SessionSlot, IntakeError> {
        let slot = self
            .sessions
            .lock()
            .map_err(|_| IntakeError::Poisoned)?
            .get(&session_id)
            .cloned();
        match slot {
            Some(slot) => Ok(slot),
            None if self.is_persisted(session_id)? => Err(IntakeError::SessionFrozen(session_id)),
            None => Err(IntakeError::UnknownSession(session_id)),
        }
    }

    /// A session whose record reached the store is closed for good.
    fn is_persisted(&self, session_id: Uuid) -> Result<bool, IntakeError> {
        Ok(!self
            .store
            .records_for_session(&session_id.to_string())?
            .is_empty())
    }

    /// Current state of an open session.
    pub fn snapshot(&self, session_id: Uuid) -> Result<IntakeSnapshot, IntakeError> {
        let slot = self.session(session_id)?;
        let record = slot.lock().map_err(|_| IntakeError::Poisoned)?;
        Ok(IntakeSnapshot::of(&record))
    }

    pub fn general_questions(&self) -> &'static [&'static str] {
        self.planner.general_questions()
    }

    /// First intake round. Creates the session on first call; later calls
    /// merge further free text into the same record. A session id that
    /// already has a persisted record is rejected as frozen.
    pub fn submit_intake(&self, text: &str, session_id: Uuid) -> Result<IntakeSnapshot, IntakeError> {
        let span = tracing::info_span!("intake", session_id = %session_id);
        let _enter = span.enter();

        let slot = {
            let mut sessions = self.sessions.lock().map_err(|_| IntakeError::Poisoned)?;
            match sessions.get(&session_id) {
                Some(slot) => slot.clone(),
                None => {
                    if self.is_persisted(session_id)? {
                        tracing::warn!("Intake submitted for a session that was already persisted");
                        return Err(IntakeError::SessionFrozen(session_id));
                    }
                    let slot = Arc::new(Mutex::new(SymptomRecord::empty(
                        session_id,
                        self.engine.configured_strategy(),
                    )));
                    sessions.insert(session_id, slot.clone());
                    slot
                }
            }
        };
        let mut record = slot.lock().map_err(|_| IntakeError::Poisoned)?;
        if record.is_frozen() {
            return Err(IntakeError::SessionFrozen(session_id));
        }

        let sanitized = sanitize_intake_text(text, MAX_INPUT_LENGTH);
        if sanitized.was_modified {
            tracing::debug!("Intake text was sanitized");
        }
        let canonical = self.language.to_canonical(&sanitized.text);
        let outcome = self.engine.extract(&canonical.text);

        {
            let meta = &mut record.metadata;
            if meta.detected_language.is_none() {
                meta.detected_language = canonical.detected_language.clone();
                meta.language_confidence = canonical.confidence;
            }
            meta.translation_applied |= canonical.translation_applied;
            for d in &canonical.degradations {
                meta.note(*d);
            }
        }
        outcome.apply_to(&mut record);
        self.advance(&mut record);

        tracing::info!(
            symptoms = record.symptoms.len(),
            completeness = record.metadata.completeness,
            strategy = ?record.metadata.extraction_strategy,
            degraded = record.metadata.extraction_degraded,
            questions = record.metadata.open_questions.len(),
            "Intake processed"
        );
        Ok(IntakeSnapshot::of(&record))
    }

    /// Answer one open question. `symptom_id` may be omitted, in which case the
    /// first open question for `attribute` is answered.
    ///
    /// The answer goes through extraction like intake text: it only fills
    /// attributes that are still unknown, and symptoms it mentions for the
    /// first time join the record.
    pub fn submit_answer(
        &self,
        session_id: Uuid,
        symptom_id: Option<&str>,
        attribute: AttributeName,
        value: &str,
    ) -> Result<IntakeSnapshot, IntakeError> {
        let span = tracing::info_span!("answer", session_id = %session_id, attribute = %attribute);
        let _enter = span.enter();

        let slot = self.session(session_id)?;
        let mut record = slot.lock().map_err(|_| IntakeError::Poisoned)?;
        if record.is_frozen() {
            return Err(IntakeError::SessionFrozen(session_id));
        }
        let target = resolve_target(&record, symptom_id, attribute).ok_or_else(|| {
            IntakeError::UnknownSymptom {
                session_id,
                target: format!("{}/{attribute}", symptom_id.unwrap_or("*")),
            }
        })?;

        let sanitized = sanitize_intake_text(value, MAX_ANSWER_LENGTH);
        let canonical = match record.metadata.detected_language.clone() {
            Some(language) => self.language.translate_from(&sanitized.text, &language),
            None => self.language.translate_from(&sanitized.text, self.language.canonical()),
        };
        record.metadata.translation_applied |= canonical.translation_applied;
        for d in &canonical.degradations {
            record.metadata.note(*d);
        }

        let answer = canonical.text.trim();
        if !answer.is_empty() {
            self.merge_answer(&mut record, &target, attribute, answer);
        }
        record.refresh_completeness();
        record
            .metadata
            .open_questions
            .retain(|q| !(q.symptom_id == target && q.attribute == attribute));

        if record.metadata.open_questions.is_empty() {
            record.metadata.rounds_completed += 1;
            self.advance(&mut record);
        } else if self.planner.stop_reason(&record) == Some(StopReason::Complete) {
            self.advance(&mut record);
        }

        tracing::info!(
            completeness = record.metadata.completeness,
            rounds = record.metadata.rounds_completed,
            questions = record.metadata.open_questions.len(),
            frozen = record.is_frozen(),
            "Answer merged"
        );
        Ok(IntakeSnapshot::of(&record))
    }

    fn merge_answer(
        &self,
        record: &mut SymptomRecord,
        target: &str,
        attribute: AttributeName,
        answer: &str,
    ) {
        let mut outcome = self.engine.extract(answer);
        let mentioned = outcome
            .symptoms
            .iter()
            .position(|s| s.id == target)
            .map(|i| outcome.symptoms.remove(i));
        let reply = leading_clause(answer);

        if let Some(symptom) = record.symptom_mut(target) {
            let expected: Vec<AttributeName> = symptom.attributes.expected().collect();
            let mut found = extract_attributes(reply.as_deref().unwrap_or(answer), &expected);
            if let Some(mentioned) = &mentioned {
                found.merge_from(&mentioned.attributes);
            }
            found.fill_if_unknown(attribute, reply.as_deref());
            symptom.attributes.merge_from(&found);
        }
        if !outcome.symptoms.is_empty() {
            tracing::debug!(added = outcome.symptoms.len(), "Answer mentioned further symptoms");
        }
        outcome.apply_to(record);
    }

    /// Plan the next round, or freeze when the planner says to stop.
    fn advance(&self, record: &mut SymptomRecord) {
        match self.planner.stop_reason(record) {
            Some(reason @ (StopReason::Complete | StopReason::RoundsExhausted)) => {
                tracing::info!(reason = ?reason, "Freezing intake record");
                record.freeze();
            }
            Some(StopReason::Frozen) | Some(StopReason::NothingToAsk) => {
                record.metadata.open_questions.clear();
            }
            None => {
                record.metadata.open_questions = self.planner.plan(record);
            }
        }
    }

    /// Freeze the session's record, encrypt it and hand it to the store.
    /// The session is closed; the stored record is the source of truth.
    pub fn freeze_and_encrypt(
        &self,
        session_id: Uuid,
    ) -> Result<(String, EncryptedRecord), IntakeError> {
        let span = tracing::info_span!("freeze", session_id = %session_id);
        let _enter = span.enter();

        let slot = self.session(session_id)?;
        let encrypted = {
            let mut record = slot.lock().map_err(|_| IntakeError::Poisoned)?;
            record.freeze();
            record.refresh_completeness();
            encrypt_record(&record, &self.key)?
        };
        let record_id = self.store.save(&encrypted)?;
        self.sessions
            .lock()
            .map_err(|_| IntakeError::Poisoned)?
            .remove(&session_id);

        tracing::info!(record_id = %record_id, symptoms = encrypted.symptom_count(), "Record persisted");
        Ok((record_id, encrypted))
    }

    fn load_record(&self, record_id: &str) -> Result<SymptomRecord, IntakeError> {
        let encrypted = self.store.load(record_id)?;
        decrypt_record(&encrypted, &self.key).map_err(|e| {
            tracing::warn!(record_id = %record_id, error = %e, "Stored record is unreadable");
            IntakeError::RecordUnreadable(e)
        })
    }

    /// Generate a fresh summary and write it to the record's slot for
    /// `audience`, replacing the previous one.
    pub fn get_summary(
        &self,
        record_id: &str,
        audience: Audience,
    ) -> Result<ClinicalSummary, IntakeError> {
        let record = self.load_record(record_id)?;
        let summary = self.summaries.summarize(&record, audience);
        let encrypted = encrypt_serializable(&summary, &self.key)?;
        self.store.put_summary(record_id, audience, &encrypted)?;
        tracing::info!(
            record_id = %record_id,
            audience = audience.as_str(),
            strategy = ?summary.strategy,
            fell_back = summary.fell_back,
            "Summary generated"
        );
        Ok(summary)
    }

    /// Clinician report. Uses the stored doctor summary when there is one,
    /// otherwise generates and stores it first.
    pub fn get_report(&self, record_id: &str) -> Result<RenderedReport, IntakeError> {
        let record = self.load_record(record_id)?;
        let summary = match self.store.get_summary(record_id, Audience::Doctor)? {
            Some(stored) => decrypt_deserializable::<ClinicalSummary>(&stored, &self.key)?,
            None => self.get_summary(record_id, Audience::Doctor)?,
        };
        let report = self.renderer.render(&record, &summary)?;
        tracing::info!(
            record_id = %record_id,
            pages = report.pages,
            substitutions = report.substitutions,
            "Report rendered"
        );
        Ok(report)
    }
}

/// Symptom an answer applies to.
fn resolve_target(
    record: &SymptomRecord,
    symptom_id: Option<&str>,
    attribute: AttributeName,
) -> Option<String> {
    match symptom_id {
        Some(id) => record.symptom(id).map(|s| s.id.clone()),
        None => record
            .metadata
            .open_questions
            .iter()
            .find(|q| q.attribute == attribute)
            .map(|q| q.symptom_id.clone())
            .or_else(|| {
                record
                    .symptoms
                    .iter()
                    .find(|s| {
                        s.attributes.expected().any(|a| a == attribute)
                            && !s.attributes.is_known(attribute)
                    })
                    .map(|s| s.id.clone())
            }),
    }
}
