//! Report line plan: what goes where, independent of the PDF backend.
//!
//! Planning is pure. The same record, summary and font chain always produce
//! the same plan, which is what the PDF step draws. Each line is wrapped in
//! logical order, then shaped, reordered for display and split into font runs.

use unicode_segmentation::UnicodeSegmentation;

use crate::models::{Audience, AttributeName, ClinicalSummary, ExtractionStrategy, SymptomRecord};

use super::glyph::{is_rtl_paragraph, visual_order, FontChain, TextRun};
use super::shape::shape_arabic;

pub const REPORT_TITLE: &str = "PATIENT HEALTH ASSESSMENT REPORT";

pub const DISCLAIMER: &str = "This report is generated from patient-reported information and \
automated processing. It is not a diagnosis. All findings must be reviewed by a qualified \
healthcare professional.";

pub const UNKNOWN_CELL: &str = "N/A";

// A4 portrait, millimetres
pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_LEFT_MM: f32 = 20.0;
const MARGIN_RIGHT_MM: f32 = 20.0;
const TOP_MM: f32 = 280.0;
const BOTTOM_MM: f32 = 20.0;

const BODY_WRAP_CHARS: usize = 90;
const SMALL_WRAP_CHARS: usize = 110;

/// Table columns: header, x offset, wrap width in characters.
const SYMPTOM_COLUMNS: [(&str, f32, usize); 5] = [
    ("Symptom", 20.0, 16),
    ("Duration", 55.0, 16),
    ("Severity", 90.0, 14),
    ("Frequency", 120.0, 16),
    ("Triggers", 155.0, 16),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Heading,
    Body,
    TableHeader,
    TableCell,
    Small,
}

impl LineStyle {
    pub fn font_size(self) -> f32 {
        match self {
            Self::Title => 14.0,
            Self::Heading => 11.0,
            Self::Body | Self::TableHeader => 9.5,
            Self::TableCell => 9.0,
            Self::Small => 7.5,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, Self::Title | Self::Heading | Self::TableHeader)
    }

    fn line_height(self) -> f32 {
        match self {
            Self::Title => 10.0,
            Self::Heading => 7.0,
            Self::Body | Self::TableHeader | Self::TableCell => 4.8,
            Self::Small => 3.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLine {
    /// Zero-based page index.
    pub page: usize,
    pub x_mm: f32,
    pub y_mm: f32,
    /// Text in visual (drawing) order, fallback glyphs included.
    pub text: String,
    /// `text` split by the font that draws each part.
    pub runs: Vec<TextRun>,
    pub style: LineStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub title: String,
    pub pages: usize,
    pub lines: Vec<PlannedLine>,
    /// Characters replaced by the fallback glyph.
    pub substitutions: usize,
}

struct Planner<'a> {
    fonts: &'a FontChain,
    lines: Vec<PlannedLine>,
    page: usize,
    y: f32,
    substitutions: usize,
}

impl<'a> Planner<'a> {
    fn new(fonts: &'a FontChain) -> Self {
        Self {
            fonts,
            lines: Vec::new(),
            page: 0,
            y: TOP_MM,
            substitutions: 0,
        }
    }

    /// Shape, reorder and split one logical line into font runs.
    fn prepare(&mut self, line: &str) -> (String, Vec<TextRun>) {
        let visual = visual_order(&shape_arabic(line));
        let (runs, n) = self.fonts.segment(&visual);
        self.substitutions += n;
        let text = runs.iter().map(|r| r.text.as_str()).collect();
        (text, runs)
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < BOTTOM_MM {
            self.page += 1;
            self.y = TOP_MM;
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// Place one line at `x`, or right-aligned when its paragraph runs right-to-left.
    fn place(&mut self, x: f32, line: &str, style: LineStyle) {
        let (text, runs) = self.prepare(line);
        let x = if is_rtl_paragraph(line) {
            right_aligned_x(&text, style)
        } else {
            x
        };
        self.lines.push(PlannedLine {
            page: self.page,
            x_mm: x,
            y_mm: self.y,
            text,
            runs,
            style,
        });
    }

    /// Wrap and place a paragraph at `x`.
    fn paragraph(&mut self, x: f32, text: &str, style: LineStyle, wrap: usize) {
        for line in wrap_text(text, wrap) {
            self.ensure_room(style.line_height());
            self.place(x, &line, style);
            self.y -= style.line_height();
        }
    }

    fn heading(&mut self, text: &str) {
        self.ensure_room(LineStyle::Heading.line_height() + LineStyle::Body.line_height() * 2.0);
        self.gap(3.0);
        self.paragraph(MARGIN_LEFT_MM, text, LineStyle::Heading, BODY_WRAP_CHARS);
    }

    /// One table row; cells wrap independently and the row is as tall as its tallest cell.
    fn row(&mut self, cells: &[String], style: LineStyle) {
        let wrapped: Vec<Vec<String>> = cells
            .iter()
            .zip(SYMPTOM_COLUMNS.iter())
            .map(|(cell, (_, _, width))| wrap_text(cell, *width))
            .collect();
        let height = wrapped.iter().map(Vec::len).max().unwrap_or(1);
        self.ensure_room(style.line_height() * height as f32);

        let top = self.y;
        for (cell_lines, (_, x, _)) in wrapped.into_iter().zip(SYMPTOM_COLUMNS.iter()) {
            self.y = top;
            for line in cell_lines {
                // Cells stay in their column even when right-to-left.
                let (text, runs) = self.prepare(&line);
                self.lines.push(PlannedLine {
                    page: self.page,
                    x_mm: *x,
                    y_mm: self.y,
                    text,
                    runs,
                    style,
                });
                self.y -= style.line_height();
            }
        }
        self.y = top - style.line_height() * height as f32 - 1.0;
    }

    fn finish(self) -> LayoutPlan {
        LayoutPlan {
            title: REPORT_TITLE.to_string(),
            pages: self.page + 1,
            lines: self.lines,
            substitutions: self.substitutions,
        }
    }
}

/// Estimated x for right-aligned text. Average glyph advance is taken as half
/// the font size.
fn right_aligned_x(text: &str, style: LineStyle) -> f32 {
    let pt_to_mm = 0.3528;
    let width = text.graphemes(true).count() as f32 * style.font_size() * 0.5 * pt_to_mm;
    (PAGE_WIDTH_MM - MARGIN_RIGHT_MM - width).max(MARGIN_LEFT_MM)
}

/// Plan the report for `record` and `summary`.
pub fn plan_report(
    record: &SymptomRecord,
    summary: &ClinicalSummary,
    fonts: &FontChain,
) -> LayoutPlan {
    let mut p = Planner::new(fonts);
    let meta = &record.metadata;

    p.paragraph(MARGIN_LEFT_MM, REPORT_TITLE, LineStyle::Title, BODY_WRAP_CHARS);
    p.paragraph(
        MARGIN_LEFT_MM,
        &format!("Generated: {}", summary.generated_at.format("%Y-%m-%d %H:%M UTC")),
        LineStyle::Body,
        BODY_WRAP_CHARS,
    );

    // ─── Intake details ───
    p.heading("INTAKE DETAILS");
    let language = meta.detected_language.as_deref().unwrap_or("unknown");
    let details = [
        format!("Session: {}", meta.session_id),
        format!(
            "Language: {}   Translation applied: {}",
            language,
            yes_no(meta.translation_applied)
        ),
        format!(
            "Completeness: {:.0}%   Follow-up rounds: {}",
            meta.completeness * 100.0,
            meta.rounds_completed
        ),
        format!(
            "Extraction: {}{}",
            match meta.extraction_strategy {
                ExtractionStrategy::Model => "model",
                ExtractionStrategy::Deterministic => "keyword matching",
            },
            if meta.extraction_degraded { " (fallback)" } else { "" }
        ),
    ];
    for line in &details {
        p.paragraph(MARGIN_LEFT_MM, line, LineStyle::Body, BODY_WRAP_CHARS);
    }

    // ─── Symptoms ───
    p.heading("REPORTED SYMPTOMS");
    if record.symptoms.is_empty() {
        p.paragraph(MARGIN_LEFT_MM, "No symptoms reported.", LineStyle::Body, BODY_WRAP_CHARS);
    } else {
        let header: Vec<String> = SYMPTOM_COLUMNS.iter().map(|(h, _, _)| h.to_string()).collect();
        p.row(&header, LineStyle::TableHeader);
        for symptom in &record.symptoms {
            let cell = |a: AttributeName| {
                symptom.attributes.get(a).unwrap_or(UNKNOWN_CELL).to_string()
            };
            let cells = [
                symptom.display_name.clone(),
                cell(AttributeName::Duration),
                cell(AttributeName::Severity),
                cell(AttributeName::Frequency),
                cell(AttributeName::Triggers),
            ];
            p.row(&cells, LineStyle::TableCell);
        }
    }

    // ─── Summary ───
    p.heading("CLINICAL SUMMARY");
    p.paragraph(MARGIN_LEFT_MM, &summary.content.narrative, LineStyle::Body, BODY_WRAP_CHARS);

    if summary.audience == Audience::Doctor {
        let content = &summary.content;
        if !content.differential.is_empty() {
            p.heading("DIFFERENTIAL CONSIDERATIONS");
            for entry in &content.differential {
                let line = if entry.supporting_evidence.is_empty() {
                    format!("- {} ({})", entry.condition, entry.confidence.label())
                } else {
                    format!(
                        "- {} ({}): {}",
                        entry.condition,
                        entry.confidence.label(),
                        entry.supporting_evidence
                    )
                };
                p.paragraph(MARGIN_LEFT_MM + 3.0, &line, LineStyle::Body, BODY_WRAP_CHARS);
            }
        }
        if !content.red_flags.is_empty() {
            p.heading("RED FLAGS");
            for flag in &content.red_flags {
                p.paragraph(MARGIN_LEFT_MM + 3.0, &format!("! {flag}"), LineStyle::Body, BODY_WRAP_CHARS);
            }
        }
        if !content.investigations.is_empty() {
            p.heading("RECOMMENDED INVESTIGATIONS");
            for item in &content.investigations {
                p.paragraph(MARGIN_LEFT_MM + 3.0, &format!("- {item}"), LineStyle::Body, BODY_WRAP_CHARS);
            }
        }
    }

    p.gap(6.0);
    p.paragraph(MARGIN_LEFT_MM, DISCLAIMER, LineStyle::Small, SMALL_WRAP_CHARS);

    p.finish()
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// Word-wrap by grapheme count. Words longer than a line are hard-split
/// between grapheme clusters, never inside one.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let graphemes: Vec<&str> = word.graphemes(true).collect();
            for piece in graphemes.chunks(max_chars.max(1)) {
                let piece_len = piece.len();
                if current_len > 0 && current_len + 1 + piece_len > max_chars {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(piece.iter().copied());
                current_len += piece_len;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConfidenceTier, DifferentialEntry, SummaryContent, SummaryStrategy, Symptom, SymptomSource,
    };
    use crate::render::glyph::FontCoverage;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn record() -> SymptomRecord {
        let mut record = SymptomRecord::empty(Uuid::nil(), ExtractionStrategy::Deterministic);
        record.merge_symptom(
            Symptom::new("headache", "Headache", &AttributeName::PRIORITY, SymptomSource::KeywordMatched)
                .with_attribute(AttributeName::Severity, "severe")
                .with_attribute(AttributeName::Duration, "three days"),
        );
        record.refresh_completeness();
        record
    }

    fn summary(audience: Audience, narrative: &str) -> ClinicalSummary {
        ClinicalSummary {
            audience,
            content: SummaryContent {
                narrative: narrative.to_string(),
                differential: vec![DifferentialEntry {
                    condition: "Migraine".into(),
                    supporting_evidence: "Reported headache".into(),
                    confidence: ConfidenceTier::Low,
                }],
                red_flags: vec!["Early-morning headache".into()],
                investigations: vec!["Blood pressure".into()],
            },
            strategy: SummaryStrategy::Template,
            fell_back: false,
            generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    fn latin1() -> FontChain {
        FontChain::new(FontCoverage::latin1())
    }

    fn latin_and_arabic() -> FontChain {
        FontChain::new(FontCoverage::from_ranges(
            vec![0x0020..=0x024F, 0x0600..=0x06FF, 0xFE70..=0xFEFF],
            '?',
        ))
    }

    fn texts(plan: &LayoutPlan) -> Vec<&str> {
        plan.lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn plan_has_sections_and_unknown_cells() {
        let plan = plan_report(&record(), &summary(Audience::Doctor, "Severe headache."), &latin1());
        let t = texts(&plan);
        assert_eq!(t[0], REPORT_TITLE);
        assert!(t.contains(&"Generated: 2026-03-01 09:30 UTC"));
        assert!(t.contains(&"REPORTED SYMPTOMS"));
        assert!(t.contains(&"three days"));
        assert_eq!(t.iter().filter(|s| **s == UNKNOWN_CELL).count(), 2);
        assert!(t.contains(&"RED FLAGS"));
        assert!(t.contains(&"- Migraine (low): Reported headache"));
        assert_eq!(plan.substitutions, 0);
        assert_eq!(plan.pages, 1);
    }

    #[test]
    fn patient_plan_omits_clinical_sections() {
        let plan = plan_report(&record(), &summary(Audience::Patient, "You reported a headache."), &latin1());
        let t = texts(&plan);
        assert!(!t.contains(&"RED FLAGS"));
        assert!(!t.contains(&"DIFFERENTIAL CONSIDERATIONS"));
    }

    #[test]
    fn planning_is_deterministic() {
        let r = record();
        let s = summary(Audience::Doctor, "Severe headache.");
        assert_eq!(
            plan_report(&r, &s, &latin_and_arabic()),
            plan_report(&r, &s, &latin_and_arabic())
        );
    }

    #[test]
    fn unsupported_glyphs_are_counted_not_dropped() {
        let plan = plan_report(&record(), &summary(Audience::Patient, "头痛 three days"), &latin1());
        assert_eq!(plan.substitutions, 2);
        assert!(texts(&plan).contains(&"?? three days"));
    }

    #[test]
    fn rtl_lines_are_shaped_reordered_and_right_aligned() {
        let plan = plan_report(&record(), &summary(Audience::Patient, "صداع"), &latin_and_arabic());
        // ain, alef, dal final, sad initial: presentation forms in drawing order
        let line = plan
            .lines
            .iter()
            .find(|l| l.text == "\u{FEC9}\u{FE8D}\u{FEAA}\u{FEBB}")
            .unwrap();
        assert!(line.x_mm > MARGIN_LEFT_MM);
        assert_eq!(plan.substitutions, 0);
    }

    #[test]
    fn lines_carry_font_runs() {
        let mut fonts = latin1();
        fonts.push(FontCoverage::from_ranges(vec![0x0900..=0x097F], '?'));
        let plan = plan_report(&record(), &summary(Audience::Patient, "Pain सिरदर्द"), &fonts);
        let line = plan.lines.iter().find(|l| l.text == "Pain सिरदर्द").unwrap();
        assert_eq!(line.runs.len(), 2);
        assert_eq!(line.runs[1], TextRun { font: 1, text: "सिरदर्द".into() });
        assert_eq!(plan.substitutions, 0);
    }

    #[test]
    fn long_narrative_paginates() {
        let narrative = "word ".repeat(5_000);
        let plan = plan_report(&record(), &summary(Audience::Patient, &narrative), &latin1());
        assert!(plan.pages > 1);
        assert!(plan.lines.iter().all(|l| l.y_mm >= BOTTOM_MM));
        assert_eq!(plan.lines.last().unwrap().page, plan.pages - 1);
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");
        assert_eq!(wrap_text("", 10), vec![String::new()]);
        assert_eq!(wrap_text("ééééé", 2), vec!["éé", "éé", "é"]);
    }

    #[test]
    fn wrap_text_never_splits_a_cluster() {
        // e + combining acute, three times
        let decomposed = "e\u{301}e\u{301}e\u{301}";
        assert_eq!(wrap_text(decomposed, 2), vec!["e\u{301}e\u{301}", "e\u{301}"]);
        // Devanagari consonant + vowel sign stay together
        let lines = wrap_text("सिसिसि", 1);
        assert_eq!(lines, vec!["सि", "सि", "सि"]);
    }
}
