//! Native-text edit engine
//!
//! Edits glyphs that are part of the page's original content stream, as
//! opposed to adding annotations. Lines are reconstructed from raw
//! per-character boxes, one line is editable at a time, and a commit
//! covers the old glyphs with a background-colored rectangle before
//! inserting the replacement text. A full content-stream rewrite is
//! deliberately avoided because it shifts unrelated text elsewhere on
//! the page.

use std::collections::HashMap;
use std::sync::Arc;

use vellum_engine::{
    Document, EngineError, PdfPoint, PdfRect, RawLine, RgbColor, TextInsertSpec,
};

use crate::fonts::{resolve_replacement_font, FontCatalog};

/// Gap threshold for reconstructing spaces, as a fraction of the line's
/// average glyph width. Empirical; tune rather than derive.
pub const SPACE_GAP_RATIO: f32 = 0.35;

/// Vertical tolerance when matching duplicate lines, in points.
const DUP_BAND_TOLERANCE: f32 = 3.0;

/// One recognized, editable line of page text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// Text with spaces reconstructed from inter-glyph gaps.
    pub text: String,
    pub bbox: PdfRect,
    pub font_name: String,
    pub font_size: f32,
    pub color: RgbColor,
    /// Baseline origin of the first span.
    pub origin: PdfPoint,
    /// x of the first visible glyph. Preferred over `origin.x` for
    /// re-insertion: the span origin includes font-specific left bearing
    /// that misaligns replacement text set in a different face.
    pub first_char_x: Option<f32>,
}

/// Errors surfaced by a text-edit commit.
#[derive(Debug, thiserror::Error)]
pub enum TextEditError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("no line under the given point")]
    NoLine,
}

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Document changed; the page needs re-rendering.
    Committed { page: u16 },
    /// Nothing to do (no session, unchanged or blank text).
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct EditSession {
    pub page: u16,
    pub line: TextLine,
    /// The text being edited; starts as the line's reconstructed text.
    pub text: String,
}

/// State machine: Idle → Editing(one line) → commit/cancel → Idle.
pub struct TextEditEngine {
    catalog: Arc<FontCatalog>,
    lines_cache: HashMap<u16, Vec<TextLine>>,
    extracted_fonts: HashMap<String, Vec<u8>>,
    session: Option<EditSession>,
}

impl TextEditEngine {
    pub fn new(catalog: Arc<FontCatalog>) -> Self {
        Self {
            catalog,
            lines_cache: HashMap::new(),
            extracted_fonts: HashMap::new(),
            session: None,
        }
    }

    /// Recognized lines for a page, lazily built and cached until the
    /// page is edited.
    pub fn lines(&mut self, doc: &Document, page: u16) -> Result<&[TextLine], TextEditError> {
        if !self.lines_cache.contains_key(&page) {
            let raw = doc.char_layout(page)?;
            self.lines_cache.insert(page, build_lines(&raw));
        }
        Ok(self.lines_cache.get(&page).unwrap())
    }

    /// The line under a document-space point, for hover highlighting.
    pub fn line_at(
        &mut self,
        doc: &Document,
        page: u16,
        point: PdfPoint,
    ) -> Result<Option<TextLine>, TextEditError> {
        let lines = self.lines(doc, page)?;
        Ok(lines.iter().find(|l| l.bbox.contains(point)).cloned())
    }

    /// Begin editing the line under `point`.
    ///
    /// An already-open session is committed first; only one line is
    /// editable at a time.
    pub fn begin_edit(
        &mut self,
        doc: &mut Document,
        page: u16,
        point: PdfPoint,
    ) -> Result<TextLine, TextEditError> {
        if self.session.is_some() {
            self.commit(doc)?;
        }
        let line = self.line_at(doc, page, point)?.ok_or(TextEditError::NoLine)?;
        self.session = Some(EditSession { page, line: line.clone(), text: line.text.clone() });
        Ok(line)
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Update the in-progress edit text (driven by the host's editor).
    pub fn set_session_text(&mut self, text: impl Into<String>) {
        if let Some(session) = &mut self.session {
            session.text = text.into();
        }
    }

    /// Discard the edit without touching the document.
    pub fn cancel(&mut self) {
        self.session = None;
    }

    /// Commit the open edit: cover the old glyphs with the sampled
    /// background color and insert the replacement text at the recorded
    /// baseline.
    ///
    /// The session is consumed either way. On error the document keeps
    /// whatever state the failed step left (a failure before the cover
    /// leaves everything intact; between cover and insert, a blank
    /// rectangle, an accepted edge case).
    pub fn commit(&mut self, doc: &mut Document) -> Result<CommitOutcome, TextEditError> {
        let Some(session) = self.session.take() else {
            return Ok(CommitOutcome::Unchanged);
        };
        let EditSession { page, line, text } = session;
        if text == line.text || text.trim().is_empty() {
            return Ok(CommitOutcome::Unchanged);
        }

        let background = sample_background(doc, page, line.bbox);
        doc.draw_rect(page, line.bbox.expanded(1.0), background)?;

        let resolved = resolve_replacement_font(
            doc,
            &line.font_name,
            &text,
            &self.catalog,
            &mut self.extracted_fonts,
        );
        let insert_x = line.first_char_x.unwrap_or(line.origin.x);
        doc.insert_text(
            page,
            PdfPoint::new(insert_x, line.origin.y),
            &text,
            &TextInsertSpec {
                font_name: resolved.name,
                font_file: resolved.file,
                font_size: line.font_size,
                color: line.color,
            },
        )?;

        self.invalidate_page(page);
        Ok(CommitOutcome::Committed { page })
    }

    /// Drop the cached lines for a page (after any edit to it).
    pub fn invalidate_page(&mut self, page: u16) {
        self.lines_cache.remove(&page);
    }

    pub fn invalidate_all(&mut self) {
        self.lines_cache.clear();
    }
}

/// Sample the page background just above a line's bounding box.
///
/// A 1-pt-tall strip above the text avoids sampling the glyphs
/// themselves; near the page edge the strip is moved just inside the top
/// of the box instead. Defaults to white whenever sampling fails.
fn sample_background(doc: &Document, page: u16, bbox: PdfRect) -> RgbColor {
    let cx = (bbox.x0 + bbox.x1) / 2.0;
    let strip = if bbox.y0 >= 2.0 {
        PdfRect::new(cx - 1.0, bbox.y0 - 2.0, cx + 1.0, bbox.y0 - 0.5)
    } else {
        PdfRect::new(cx - 1.0, bbox.y0 + 0.5, cx + 1.0, bbox.y0 + 2.0)
    };

    match doc.render_page(page, 1.0, Some(strip)) {
        Ok(img) if img.width() > 0 && img.height() > 0 => {
            let px = img.get_pixel(0, 0).0;
            RgbColor::new(
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            )
        }
        Ok(_) => RgbColor::WHITE,
        Err(err) => {
            tracing::debug!(page, %err, "background sampling failed, defaulting to white");
            RgbColor::WHITE
        }
    }
}

/// Build editable lines from raw layout: reconstruct spacing, then drop
/// overlapping duplicates.
fn build_lines(raw: &[RawLine]) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    for raw_line in raw {
        let Some(first_span) = raw_line.spans.first() else {
            continue;
        };
        let text = reconstruct_text(raw_line);
        if text.is_empty() {
            continue;
        }
        let first_char_x = raw_line
            .spans
            .iter()
            .flat_map(|s| s.chars.iter())
            .find(|c| !c.ch.is_whitespace())
            .map(|c| c.bbox.x0);

        lines.push(TextLine {
            text,
            bbox: raw_line.bbox,
            font_name: first_span.font_name.clone(),
            font_size: first_span.font_size,
            color: first_span.color,
            origin: first_span.origin,
            first_char_x,
        });
    }
    dedup_lines(lines)
}

/// Reconstruct a line's text from glyph positions.
///
/// The format stores absolute glyph positions, not word boundaries: a
/// space is inserted wherever the gap between the trailing edge of one
/// glyph and the leading edge of the next exceeds
/// [`SPACE_GAP_RATIO`] × the line's average glyph width. Any
/// over-threshold gap yields exactly one space regardless of magnitude.
fn reconstruct_text(line: &RawLine) -> String {
    let chars: Vec<_> = line.spans.iter().flat_map(|s| s.chars.iter()).collect();
    if chars.is_empty() {
        return String::new();
    }

    let widths: Vec<f32> = chars
        .iter()
        .map(|c| c.bbox.width())
        .filter(|w| *w > 0.0)
        .collect();
    let avg_width = if widths.is_empty() {
        5.0
    } else {
        widths.iter().sum::<f32>() / widths.len() as f32
    };
    let threshold = avg_width * SPACE_GAP_RATIO;

    let mut out = String::new();
    let mut prev_x1: Option<f32> = None;
    for cb in chars {
        if let Some(prev) = prev_x1 {
            if cb.bbox.x0 - prev > threshold {
                out.push(' ');
            }
        }
        out.push(cb.ch);
        prev_x1 = Some(cb.bbox.x1);
    }
    out.trim().to_string()
}

/// Remove overlapping duplicate lines, keeping the later (topmost) one.
///
/// Covering a line and re-inserting text leaves the original glyphs in
/// the content stream underneath the cover rectangle; extraction then
/// reports both the old and the new run at the same position. The
/// later-drawn line wins.
fn dedup_lines(lines: Vec<TextLine>) -> Vec<TextLine> {
    let mut keep = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let covered_later = lines.iter().skip(i + 1).any(|later| {
            (line.bbox.y0 - later.bbox.y0).abs() < DUP_BAND_TOLERANCE
                && (line.bbox.y1 - later.bbox.y1).abs() < DUP_BAND_TOLERANCE
                && line.bbox.x0 < later.bbox.x1
                && later.bbox.x0 < line.bbox.x1
        });
        if !covered_later {
            keep.push(line.clone());
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_engine::{CharBox, RawSpan};

    fn catalog() -> Arc<FontCatalog> {
        let catalog = FontCatalog::new(vec![]);
        catalog.ensure_loaded();
        Arc::new(catalog)
    }

    fn char_box(ch: char, x0: f32, x1: f32) -> CharBox {
        CharBox { ch, bbox: PdfRect::new(x0, 90.0, x1, 100.0) }
    }

    fn line_from_chars(chars: Vec<CharBox>) -> RawLine {
        let span = RawSpan {
            chars,
            font_name: "Helvetica".into(),
            font_size: 10.0,
            color: RgbColor::BLACK,
            origin: PdfPoint::new(0.0, 98.0),
        };
        RawLine::from_spans(vec![span]).unwrap()
    }

    #[test]
    fn small_gaps_do_not_become_spaces() {
        // Average glyph width 10 → threshold 3.5; a gap of 3 stays
        // below it.
        let line = line_from_chars(vec![char_box('H', 0.0, 10.0), char_box('i', 13.0, 23.0)]);
        assert_eq!(reconstruct_text(&line), "Hi");
    }

    #[test]
    fn gaps_above_threshold_become_single_spaces() {
        // avg width 10 → threshold 3.5; gap of 5 inserts exactly one
        // space; a much larger gap still inserts exactly one.
        let line = line_from_chars(vec![
            char_box('H', 0.0, 10.0),
            char_box('w', 15.0, 25.0),
            char_box('!', 80.0, 90.0),
        ]);
        assert_eq!(reconstruct_text(&line), "H w !");
    }

    #[test]
    fn duplicate_lines_keep_the_later_one() {
        let old = TextLine {
            text: "old".into(),
            bbox: PdfRect::new(10.0, 100.0, 80.0, 112.0),
            font_name: "Helvetica".into(),
            font_size: 12.0,
            color: RgbColor::BLACK,
            origin: PdfPoint::new(10.0, 110.0),
            first_char_x: Some(10.0),
        };
        // Same vertical band; horizontal range a superset.
        let new = TextLine {
            text: "replacement".into(),
            bbox: PdfRect::new(8.0, 101.0, 120.0, 113.0),
            ..old.clone()
        };
        let other = TextLine {
            text: "elsewhere".into(),
            bbox: PdfRect::new(10.0, 300.0, 80.0, 312.0),
            ..old.clone()
        };

        let deduped = dedup_lines(vec![old, new.clone(), other.clone()]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].text, "replacement");
        assert_eq!(deduped[1].text, "elsewhere");
    }

    fn seeded_doc() -> Document {
        let mut doc = Document::create(&[(612.0, 792.0)]);
        doc.insert_text(
            0,
            PdfPoint::new(72.0, 100.0),
            "hello world",
            &TextInsertSpec {
                font_name: "Helvetica".into(),
                font_file: None,
                font_size: 12.0,
                color: RgbColor::BLACK,
            },
        )
        .unwrap();
        doc
    }

    #[test]
    fn lines_are_extracted_and_cached() {
        let doc = seeded_doc();
        let mut engine = TextEditEngine::new(catalog());
        let lines = engine.lines(&doc, 0).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "hello world");
        assert_eq!(lines[0].first_char_x, Some(72.0));
    }

    #[test]
    fn hover_finds_line_under_point() {
        let doc = seeded_doc();
        let mut engine = TextEditEngine::new(catalog());
        let hit = engine
            .line_at(&doc, 0, PdfPoint::new(80.0, 95.0))
            .unwrap();
        assert!(hit.is_some());
        let miss = engine
            .line_at(&doc, 0, PdfPoint::new(400.0, 400.0))
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn commit_rewrites_line_and_covers_old_glyphs() {
        let mut doc = seeded_doc();
        let mut engine = TextEditEngine::new(catalog());
        engine
            .begin_edit(&mut doc, 0, PdfPoint::new(80.0, 95.0))
            .unwrap();
        engine.set_session_text("goodbye world");
        let outcome = engine.commit(&mut doc).unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { page: 0 });
        assert!(!engine.has_session());

        // The replacement run is drawn later, so dedup keeps it.
        let lines = engine.lines(&doc, 0).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "goodbye world");
    }

    #[test]
    fn unchanged_or_blank_text_commits_nothing() {
        let mut doc = seeded_doc();
        let mut engine = TextEditEngine::new(catalog());

        engine
            .begin_edit(&mut doc, 0, PdfPoint::new(80.0, 95.0))
            .unwrap();
        assert_eq!(engine.commit(&mut doc).unwrap(), CommitOutcome::Unchanged);

        engine
            .begin_edit(&mut doc, 0, PdfPoint::new(80.0, 95.0))
            .unwrap();
        engine.set_session_text("   ");
        assert_eq!(engine.commit(&mut doc).unwrap(), CommitOutcome::Unchanged);

        // Document still holds the original text.
        let lines = engine.lines(&doc, 0).unwrap();
        assert_eq!(lines[0].text, "hello world");
    }

    #[test]
    fn begin_edit_commits_open_session_first() {
        let mut doc = seeded_doc();
        let mut engine = TextEditEngine::new(catalog());
        engine
            .begin_edit(&mut doc, 0, PdfPoint::new(80.0, 95.0))
            .unwrap();
        engine.set_session_text("first edit");

        // Re-entering starts a new session; the pending one lands in the
        // document before the new line is resolved.
        let line = engine
            .begin_edit(&mut doc, 0, PdfPoint::new(80.0, 95.0))
            .unwrap();
        assert_eq!(line.text, "first edit");
    }

    #[test]
    fn cancel_discards_without_mutating() {
        let mut doc = seeded_doc();
        let mut engine = TextEditEngine::new(catalog());
        engine
            .begin_edit(&mut doc, 0, PdfPoint::new(80.0, 95.0))
            .unwrap();
        engine.set_session_text("never committed");
        engine.cancel();
        assert_eq!(engine.commit(&mut doc).unwrap(), CommitOutcome::Unchanged);
        let lines = engine.lines(&doc, 0).unwrap();
        assert_eq!(lines[0].text, "hello world");
    }

    #[test]
    fn background_sampling_defaults_to_white_on_blank_page() {
        let doc = Document::create(&[(612.0, 792.0)]);
        let bg = sample_background(&doc, 0, PdfRect::new(100.0, 100.0, 200.0, 112.0));
        assert_eq!(bg, RgbColor::WHITE);
    }

    #[test]
    fn background_sampling_picks_up_colored_fill() {
        let mut doc = Document::create(&[(612.0, 792.0)]);
        doc.draw_rect(
            0,
            PdfRect::new(0.0, 0.0, 612.0, 400.0),
            RgbColor::new(1.0, 0.0, 0.0),
        )
        .unwrap();
        let bg = sample_background(&doc, 0, PdfRect::new(100.0, 100.0, 200.0, 112.0));
        assert!(bg.r > 0.9 && bg.g < 0.1 && bg.b < 0.1);
    }

    #[test]
    fn sampling_near_page_top_stays_in_bounds() {
        let doc = Document::create(&[(612.0, 792.0)]);
        // bbox starts at y=1: the strip above would leave the page.
        let bg = sample_background(&doc, 0, PdfRect::new(100.0, 1.0, 200.0, 13.0));
        assert_eq!(bg, RgbColor::WHITE);
    }
}
