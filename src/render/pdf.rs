use std::collections::BTreeSet;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

use printpdf::*;
use sha2::{Digest, Sha256};

use super::glyph::{FontChain, FontCoverage};
use super::layout::{plan_report, LayoutPlan, LineStyle, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use super::RenderError;
use crate::models::{ClinicalSummary, SymptomRecord};

/// Locations searched for DejaVu Sans when no font is configured.
const DEJAVU_SEARCH_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/local/share/fonts/DejaVuSans.ttf",
    "/Library/Fonts/DejaVuSans.ttf",
    "C:\\Windows\\Fonts\\DejaVuSans.ttf",
];

/// Directories searched for script fallback fonts.
const FALLBACK_FONT_DIRS: &[&str] = &[
    "/usr/share/fonts/truetype/noto",
    "/usr/share/fonts/noto",
    "/usr/share/fonts/google-noto",
    "/usr/share/fonts/truetype/lohit-devanagari",
    "/usr/share/fonts/truetype/lohit-bengali",
    "/usr/share/fonts/truetype/droid",
    "/usr/share/fonts/truetype/nanum",
    "/usr/share/fonts/TTF",
    "/usr/local/share/fonts",
    "/Library/Fonts",
    "C:\\Windows\\Fonts",
];

/// Fallback font files per script, in preference order. The first file found
/// for a script is used. Collections (`.ttc`) and CFF fonts cannot be embedded
/// and are not listed.
const SCRIPT_FONTS: &[(&str, &[&str])] = &[
    ("devanagari", &["NotoSansDevanagari-Regular.ttf", "Lohit-Devanagari.ttf"]),
    ("bengali", &["NotoSansBengali-Regular.ttf", "Lohit-Bengali.ttf"]),
    ("gujarati", &["NotoSansGujarati-Regular.ttf"]),
    ("tamil", &["NotoSansTamil-Regular.ttf"]),
    ("telugu", &["NotoSansTelugu-Regular.ttf"]),
    ("thai", &["NotoSansThai-Regular.ttf"]),
    ("arabic", &["NotoNaskhArabic-Regular.ttf", "NotoSansArabic-Regular.ttf"]),
    ("hebrew", &["NotoSansHebrew-Regular.ttf"]),
    ("cjk", &["DroidSansFallbackFull.ttf", "DroidSansFallback.ttf"]),
    ("korean", &["NanumGothic.ttf"]),
];

#[derive(Debug, Clone)]
enum FontSource {
    Builtin,
    /// TrueType bytes, read once at construction.
    External { path: PathBuf, bytes: Vec<u8> },
}

impl FontSource {
    /// Read and validate a TrueType font, returning its cmap coverage.
    fn load(path: &Path) -> Result<(Self, FontCoverage), RenderError> {
        let font_error = |reason: String| RenderError::Font {
            path: path.display().to_string(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| font_error(e.to_string()))?;
        let coverage = {
            let face = ttf_parser::Face::parse(&bytes, 0).map_err(|e| font_error(e.to_string()))?;
            if face.tables().glyf.is_none() {
                return Err(font_error("no TrueType outlines (glyf table)".into()));
            }
            FontCoverage::from_face(&face)
        };
        if coverage.is_empty() {
            return Err(font_error("no Unicode character map".into()));
        }
        Ok((
            Self::External {
                path: path.to_path_buf(),
                bytes,
            },
            coverage,
        ))
    }
}

/// A rendered report.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub pages: usize,
    /// Grapheme clusters drawn as the fallback glyph.
    pub substitutions: usize,
}

/// Renders records to PDF. Holds only fonts; safe to share across threads.
///
/// Fonts form a chain: the primary font first, then script fallbacks. Each
/// grapheme cluster is drawn with the first font whose character map covers it.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    sources: Vec<FontSource>,
    chain: FontChain,
}

impl ReportRenderer {
    /// Base-14 Helvetica. Latin-1 only; everything else becomes `?`.
    pub fn builtin() -> Self {
        Self {
            sources: vec![FontSource::Builtin],
            chain: FontChain::new(FontCoverage::latin1()),
        }
    }

    /// A TrueType font as the only font. Coverage comes from its character map.
    pub fn with_font_file(path: &Path) -> Result<Self, RenderError> {
        let (source, coverage) = FontSource::load(path)?;
        Ok(Self {
            sources: vec![source],
            chain: FontChain::new(coverage),
        })
    }

    /// Append a fallback font, tried after every font already in the chain.
    pub fn with_fallback_font(mut self, path: &Path) -> Result<Self, RenderError> {
        let (source, coverage) = FontSource::load(path)?;
        self.sources.push(source);
        self.chain.push(coverage);
        Ok(self)
    }

    /// Primary font: the configured one, else the first DejaVu Sans found, else
    /// builtin Helvetica. Then the extra fonts given, then one installed
    /// fallback font per script.
    pub fn discover(configured: Option<&Path>, extra: &[PathBuf]) -> Result<Self, RenderError> {
        let mut renderer = match configured {
            Some(path) => Self::with_font_file(path)?,
            None => Self::discover_primary(),
        };
        for path in extra {
            renderer = renderer.with_fallback_font(path)?;
        }
        for (script, files) in SCRIPT_FONTS {
            let candidates = files
                .iter()
                .flat_map(|file| FALLBACK_FONT_DIRS.iter().map(move |dir| Path::new(dir).join(file)))
                .filter(|path| path.is_file());
            for path in candidates {
                match FontSource::load(&path) {
                    Ok((source, coverage)) => {
                        tracing::debug!(script = %script, path = %path.display(), "Using fallback report font");
                        renderer.sources.push(source);
                        renderer.chain.push(coverage);
                        break;
                    }
                    Err(e) => tracing::warn!(script = %script, error = %e, "Skipping fallback report font"),
                }
            }
        }
        tracing::info!(fonts = renderer.sources.len(), "Report fonts resolved");
        Ok(renderer)
    }

    fn discover_primary() -> Self {
        for candidate in DEJAVU_SEARCH_PATHS {
            let path = Path::new(candidate);
            if path.is_file() {
                match Self::with_font_file(path) {
                    Ok(renderer) => return renderer,
                    Err(e) => tracing::warn!(error = %e, "Skipping unreadable report font"),
                }
            }
        }
        tracing::info!("No Unicode report font found, using builtin Helvetica");
        Self::builtin()
    }

    pub fn fonts(&self) -> &FontChain {
        &self.chain
    }

    /// Paths of the external fonts in chain order.
    pub fn font_paths(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter_map(|s| match s {
                FontSource::Builtin => None,
                FontSource::External { path, .. } => Some(path.as_path()),
            })
            .collect()
    }

    /// Line plan for a report; what `render` draws.
    pub fn plan(&self, record: &SymptomRecord, summary: &ClinicalSummary) -> LayoutPlan {
        plan_report(record, summary, &self.chain)
    }

    pub fn render(
        &self,
        record: &SymptomRecord,
        summary: &ClinicalSummary,
    ) -> Result<RenderedReport, RenderError> {
        let plan = self.plan(record, summary);
        let bytes = self.emit(&plan, record, summary)?;
        if plan.substitutions > 0 {
            tracing::debug!(
                substitutions = plan.substitutions,
                "Report contains glyphs outside font coverage"
            );
        }
        Ok(RenderedReport {
            bytes,
            pages: plan.pages,
            substitutions: plan.substitutions,
        })
    }

    fn emit(
        &self,
        plan: &LayoutPlan,
        record: &SymptomRecord,
        summary: &ClinicalSummary,
    ) -> Result<Vec<u8>, RenderError> {
        let timestamp = time::OffsetDateTime::from_unix_timestamp(summary.generated_at.timestamp())
            .map_err(|e| RenderError::Pdf(e.to_string()))?;

        let (doc, page1, layer1) =
            PdfDocument::new(&plan.title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        let doc = doc
            .with_creation_date(timestamp)
            .with_mod_date(timestamp)
            .with_metadata_date(timestamp)
            .with_document_id(document_id(record, summary));

        // Embed only the fonts this plan draws with; the primary always (footer).
        let used: BTreeSet<usize> = std::iter::once(0)
            .chain(plan.lines.iter().flat_map(|l| l.runs.iter().map(|r| r.font)))
            .collect();
        let mut regular: Vec<Option<IndirectFontRef>> = vec![None; self.sources.len()];
        let mut bold = None;
        for &index in &used {
            let Some(source) = self.sources.get(index) else {
                return Err(RenderError::Pdf(format!("run uses missing font {index}")));
            };
            let font = match source {
                FontSource::Builtin => {
                    bold = Some(
                        doc.add_builtin_font(BuiltinFont::HelveticaBold)
                            .map_err(|e| RenderError::Pdf(format!("PDF font error: {e}")))?,
                    );
                    doc.add_builtin_font(BuiltinFont::Helvetica)
                }
                FontSource::External { bytes, .. } => {
                    doc.add_external_font(Cursor::new(bytes.as_slice()))
                }
            }
            .map_err(|e| RenderError::Pdf(format!("PDF font error: {e}")))?;
            regular[index] = Some(font);
        }
        let face = |index: usize, style: LineStyle| -> Result<IndirectFontRef, RenderError> {
            match (index, &bold) {
                (0, Some(bold)) if style.is_bold() => Ok(bold.clone()),
                _ => regular
                    .get(index)
                    .and_then(Option::as_ref)
                    .cloned()
                    .ok_or_else(|| RenderError::Pdf(format!("font {index} not embedded"))),
            }
        };

        let mut layers = vec![doc.get_page(page1).get_layer(layer1)];
        for i in 1..plan.pages {
            let (page, layer) = doc.add_page(
                Mm(PAGE_WIDTH_MM),
                Mm(PAGE_HEIGHT_MM),
                format!("Page {}", i + 1),
            );
            layers.push(doc.get_page(page).get_layer(layer));
        }

        for line in &plan.lines {
            let Some(layer) = layers.get(line.page) else {
                return Err(RenderError::Pdf(format!("line planned on missing page {}", line.page)));
            };
            if line.runs.is_empty() {
                continue;
            }
            let size = line.style.font_size();
            layer.begin_text_section();
            layer.set_text_cursor(Mm(line.x_mm), Mm(line.y_mm));
            for run in &line.runs {
                let font = face(run.font, line.style)?;
                layer.set_font(&font, size);
                layer.write_text(run.text.as_str(), &font);
            }
            layer.end_text_section();
        }

        // Page footer
        let footer_font = face(0, LineStyle::Small)?;
        for (i, layer) in layers.iter().enumerate() {
            let footer = format!("Page {} of {}", i + 1, plan.pages);
            layer.use_text(&footer, LineStyle::Small.font_size(), Mm(PAGE_WIDTH_MM - 45.0), Mm(10.0), &footer_font);
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| RenderError::Pdf(format!("PDF save error: {e}")))?;
        buf.into_inner()
            .map_err(|e| RenderError::Pdf(format!("PDF buffer error: {e}")))
    }
}

/// Stable document id derived from the inputs.
fn document_id(record: &SymptomRecord, summary: &ClinicalSummary) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.metadata.session_id.as_bytes());
    hasher.update(summary.audience.as_str().as_bytes());
    hasher.update(summary.generated_at.timestamp().to_be_bytes());
    hasher.update(summary.content.narrative.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect()
}
