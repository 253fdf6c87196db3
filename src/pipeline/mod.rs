pub mod extraction;
pub mod followup;
pub mod knowledge;
pub mod language;
pub mod llm;
pub mod sanitize;
pub mod summary;
