//! Report rendering: a pure line plan (`layout`) drawn to PDF (`pdf`).
//! Arabic-script shaping lives in `shape`; font coverage, font fallback and
//! right-to-left ordering in `glyph`.

pub mod glyph;
pub mod layout;
pub mod pdf;
pub mod shape;

pub use glyph::{FontChain, FontCoverage, TextRun};
pub use layout::{plan_report, LayoutPlan, PlannedLine};
pub use pdf::{RenderedReport, ReportRenderer};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Cannot load report font {path}: {reason}")]
    Font { path: String, reason: String },

    #[error("PDF generation failed: {0}")]
    Pdf(String),
}
