//! Raw character-layout types
//!
//! The engine reports page text as lines of spans of per-character boxes,
//! in content-stream drawing order. Word boundaries are *not*
//! reconstructed here; the PDF format stores absolute glyph positions,
//! and deriving spacing from inter-glyph gaps is the text-edit engine's
//! concern.

use crate::{PdfPoint, PdfRect, RgbColor};

/// A single glyph with its bounding box in top-left document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharBox {
    pub ch: char,
    pub bbox: PdfRect,
}

/// A run of glyphs sharing font, size and color.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpan {
    pub chars: Vec<CharBox>,
    pub font_name: String,
    pub font_size: f32,
    pub color: RgbColor,
    /// Text-space origin of the run (baseline start).
    pub origin: PdfPoint,
}

impl RawSpan {
    pub fn bbox(&self) -> Option<PdfRect> {
        let first = self.chars.first()?;
        let mut r = first.bbox;
        for cb in &self.chars[1..] {
            r.x0 = r.x0.min(cb.bbox.x0);
            r.y0 = r.y0.min(cb.bbox.y0);
            r.x1 = r.x1.max(cb.bbox.x1);
            r.y1 = r.y1.max(cb.bbox.y1);
        }
        Some(r)
    }
}

/// One extracted line: consecutive spans sharing a baseline.
///
/// Lines are returned in drawing order, so text drawn later in the
/// content stream (e.g. a prior edit's replacement run) appears after
/// the glyphs it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub spans: Vec<RawSpan>,
    pub bbox: PdfRect,
}

impl RawLine {
    pub fn from_spans(spans: Vec<RawSpan>) -> Option<Self> {
        let mut bbox: Option<PdfRect> = None;
        for span in &spans {
            let Some(sb) = span.bbox() else { continue };
            bbox = Some(match bbox {
                None => sb,
                Some(b) => PdfRect::new(
                    b.x0.min(sb.x0),
                    b.y0.min(sb.y0),
                    b.x1.max(sb.x1),
                    b.y1.max(sb.y1),
                ),
            });
        }
        bbox.map(|bbox| Self { spans, bbox })
    }

    /// Baseline y of the first span, in document space.
    pub fn baseline(&self) -> f32 {
        self.spans.first().map(|s| s.origin.y).unwrap_or(self.bbox.y1)
    }
}
