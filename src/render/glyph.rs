//! Glyph coverage, per-cluster font selection and right-to-left line ordering.

use std::ops::RangeInclusive;

use ttf_parser::{Face, FaceParsingError};
use unicode_bidi::BidiInfo;
use unicode_segmentation::UnicodeSegmentation;

/// Visible replacement for characters no report font can draw.
pub const REPLACEMENT_GLYPH: char = '\u{FFFD}';

/// Unicode code points a font can draw, plus the glyph used for everything else.
///
/// Ranges are kept sorted and disjoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FontCoverage {
    ranges: Vec<RangeInclusive<u32>>,
    fallback: char,
}

impl FontCoverage {
    /// The PDF base-14 fonts (WinAnsi encoding): Latin-1 only.
    pub fn latin1() -> Self {
        Self::from_ranges(vec![0x0020..=0x007E, 0x00A0..=0x00FF], '?')
    }

    pub fn from_ranges(mut ranges: Vec<RangeInclusive<u32>>, fallback: char) -> Self {
        ranges.sort_by_key(|r| *r.start());
        let mut merged: Vec<RangeInclusive<u32>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if *range.start() <= last.end().saturating_add(1) => {
                    if range.end() > last.end() {
                        *last = *last.start()..=*range.end();
                    }
                }
                _ => merged.push(range),
            }
        }
        Self {
            ranges: merged,
            fallback,
        }
    }

    /// Coverage read from the Unicode cmap subtables of a TrueType font.
    pub fn from_font_bytes(bytes: &[u8]) -> Result<Self, FaceParsingError> {
        Ok(Self::from_face(&Face::parse(bytes, 0)?))
    }

    /// Only code points mapped to a real glyph count; `.notdef` does not.
    pub fn from_face(face: &Face<'_>) -> Self {
        let mut codepoints: Vec<u32> = Vec::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    if subtable.glyph_index(cp).is_some_and(|g| g.0 != 0) {
                        codepoints.push(cp);
                    }
                });
            }
        }
        codepoints.sort_unstable();
        codepoints.dedup();

        let mut ranges: Vec<RangeInclusive<u32>> = Vec::new();
        for cp in codepoints {
            match ranges.last_mut() {
                Some(last) if *last.end() + 1 == cp => *last = *last.start()..=cp,
                _ => ranges.push(cp..=cp),
            }
        }
        let mut coverage = Self::from_ranges(ranges, '?');
        if coverage.supports(REPLACEMENT_GLYPH) {
            coverage.fallback = REPLACEMENT_GLYPH;
        }
        coverage
    }

    pub fn supports(&self, c: char) -> bool {
        let cp = c as u32;
        let idx = self.ranges.partition_point(|r| *r.end() < cp);
        self.ranges.get(idx).is_some_and(|r| r.contains(&cp))
    }

    pub fn fallback(&self) -> char {
        self.fallback
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// A stretch of a line drawn with one font of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    /// Index into the chain; 0 is the primary font.
    pub font: usize,
    pub text: String,
}

/// Primary font followed by script fallbacks, tried in order.
#[derive(Debug, Clone, PartialEq)]
pub struct FontChain {
    fonts: Vec<FontCoverage>,
}

impl FontChain {
    pub fn new(primary: FontCoverage) -> Self {
        Self {
            fonts: vec![primary],
        }
    }

    pub fn push(&mut self, fallback: FontCoverage) {
        self.fonts.push(fallback);
    }

    pub fn fonts(&self) -> &[FontCoverage] {
        &self.fonts
    }

    /// First font that can draw every character of `cluster`.
    pub fn font_for(&self, cluster: &str) -> Option<usize> {
        self.fonts
            .iter()
            .position(|font| cluster.chars().all(|c| font.supports(c)))
    }

    /// Split a visual-order line into font runs.
    ///
    /// Selection works per grapheme cluster so a base letter and its marks
    /// always share a font. A cluster no font covers becomes one fallback
    /// glyph in the primary font. Whitespace stays in the current run when
    /// that font has a space. Zero-width joiners, already consumed by
    /// shaping, are not drawn.
    /// Returns the runs and the number of fallback glyphs.
    pub fn segment(&self, line: &str) -> (Vec<TextRun>, usize) {
        let mut runs: Vec<TextRun> = Vec::new();
        let mut substitutions = 0;

        for grapheme in line.graphemes(true) {
            let (font, text) = if grapheme.chars().all(char::is_whitespace) {
                let font = match runs.last() {
                    Some(run) if self.fonts[run.font].supports(' ') => run.font,
                    _ => 0,
                };
                (font, " ".to_string())
            } else {
                let drawable: String = grapheme
                    .chars()
                    .filter(|c| !c.is_control() && !matches!(c, '\u{200C}' | '\u{200D}'))
                    .collect();
                if drawable.is_empty() {
                    continue;
                }
                match self.font_for(&drawable) {
                    Some(font) => (font, drawable),
                    None => {
                        substitutions += 1;
                        (0, self.fonts[0].fallback().to_string())
                    }
                }
            };
            match runs.last_mut() {
                Some(run) if run.font == font => run.text.push_str(&text),
                _ => runs.push(TextRun { font, text }),
            }
        }
        (runs, substitutions)
    }
}

/// True when the line's paragraph direction is right-to-left, i.e. its first
/// strong character is Hebrew or Arabic script.
pub fn is_rtl_paragraph(line: &str) -> bool {
    BidiInfo::new(line, None)
        .paragraphs
        .first()
        .is_some_and(|p| p.level.is_rtl())
}

fn mirror(c: char) -> char {
    match c {
        '(' => ')',
        ')' => '(',
        '[' => ']',
        ']' => '[',
        '{' => '}',
        '}' => '{',
        '<' => '>',
        '>' => '<',
        '«' => '»',
        '»' => '«',
        other => other,
    }
}

/// Reorder one line from logical to visual order for left-to-right drawing.
///
/// Levels come from the Unicode Bidirectional Algorithm. Right-to-left runs
/// are reversed grapheme by grapheme, so marks stay after their base, with
/// brackets mirrored. Lines with no right-to-left text are returned unchanged.
pub fn visual_order(line: &str) -> String {
    let bidi = BidiInfo::new(line, None);
    if !bidi.has_rtl() {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    for para in &bidi.paragraphs {
        let (levels, runs) = bidi.visual_runs(para, para.range.clone());
        for run in runs {
            let text = &line[run.clone()];
            if levels[run.start].is_rtl() {
                for grapheme in text.graphemes(true).rev() {
                    let mut chars = grapheme.chars();
                    if let Some(first) = chars.next() {
                        out.push(mirror(first));
                        out.extend(chars);
                    }
                }
            } else {
                out.push_str(text);
            }
        }
    }
    out
}
