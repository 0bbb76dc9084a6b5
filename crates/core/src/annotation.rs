//! FreeText annotation mutation engine
//!
//! Creation, update, move/resize and deletion of FreeText annotations.
//! Several engine properties are only settable at creation time, so
//! "update" and "resize with re-wrap" delete the old annotation and
//! create a replacement. Identity is therefore weak: every mutation
//! returns the new [`AnnotationRef`] and callers must replace any held
//! reference with it immediately.
//!
//! The raw (unwrapped) text of every annotation this engine touches is
//! kept in a registry keyed by annotation id, so a later resize can
//! re-wrap from the original text instead of the last wrapped form.

use std::collections::HashMap;

use vellum_engine::{
    text_width, AnnotationId, AnnotationRef, Document, EngineError, FreeTextSpec, PdfPoint,
    PdfRect,
};

use crate::fonts::free_text_font;
use crate::style::FreeTextStyle;
use crate::wrap::char_wrap;

/// Errors surfaced by annotation mutations.
///
/// Mutations are applied atomically per operation: on error the document
/// is left as it was and the attempted change is abandoned.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("empty annotation text")]
    EmptyText,
}

/// Stateful mutation engine: document operations plus the raw-text
/// registry.
#[derive(Default)]
pub struct AnnotationEngine {
    raw_text: HashMap<AnnotationId, String>,
}

impl AnnotationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rectangle sized to fit the styled text, centered at `center`.
    ///
    /// Width tracks the longest line (≈ 0.6 em per character), height
    /// allows 1.6 em per line plus padding.
    fn content_rect(style: &FreeTextStyle, center: PdfPoint, min_width: f32) -> PdfRect {
        let lines: Vec<&str> = style.text.split('\n').collect();
        let line_count = lines.len().max(1);
        let max_len = lines.iter().map(|l| l.chars().count()).max().unwrap_or(1);
        let width = (max_len as f32 * style.font_size * 0.6).max(min_width);
        let height = style.font_size * 1.6 * line_count as f32 + 10.0;
        PdfRect::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            center.x + width / 2.0,
            center.y + height / 2.0,
        )
    }

    fn create_at(
        &mut self,
        doc: &mut Document,
        page: u16,
        center: PdfPoint,
        style: &FreeTextStyle,
        min_width: f32,
    ) -> Result<AnnotationRef, MutationError> {
        if style.text.is_empty() {
            return Err(MutationError::EmptyText);
        }
        let rect = Self::content_rect(style, center, min_width);
        let spec = FreeTextSpec {
            text: style.text.clone(),
            font_name: free_text_font(&style.text, &style.font_name),
            font_size: style.font_size,
            color: style.rgb(),
        };
        let created = doc.add_free_text(page, rect, &spec)?;
        self.raw_text.insert(created.id, style.text.clone());
        Ok(created)
    }

    /// Create a text annotation centered at a clicked point.
    pub fn create_at_point(
        &mut self,
        doc: &mut Document,
        page: u16,
        point: PdfPoint,
        style: &FreeTextStyle,
    ) -> Result<AnnotationRef, MutationError> {
        self.create_at(doc, page, point, style, 60.0)
    }

    /// Create a text annotation centered on the page.
    pub fn create_at_page_center(
        &mut self,
        doc: &mut Document,
        page: u16,
        style: &FreeTextStyle,
    ) -> Result<AnnotationRef, MutationError> {
        let size = doc.page_size(page)?;
        let center = PdfPoint::new(size.width / 2.0, size.height / 2.0);
        self.create_at(doc, page, center, style, 80.0)
    }

    /// Replace an annotation's text/style, preserving its rectangle.
    ///
    /// Returns the replacement ref; the old id is dead after this call.
    pub fn update(
        &mut self,
        doc: &mut Document,
        annot: &AnnotationRef,
        style: &FreeTextStyle,
    ) -> Result<AnnotationRef, MutationError> {
        if style.text.is_empty() {
            return Err(MutationError::EmptyText);
        }
        let spec = FreeTextSpec {
            text: style.text.clone(),
            font_name: free_text_font(&style.text, &style.font_name),
            font_size: style.font_size,
            color: style.rgb(),
        };
        doc.delete_annotation(annot.page, annot.id)?;
        self.raw_text.remove(&annot.id);
        let created = doc.add_free_text(annot.page, annot.rect, &spec)?;
        self.raw_text.insert(created.id, style.text.clone());
        Ok(created)
    }

    /// Finish a resize: delete the annotation and recreate it with the
    /// raw text re-wrapped at character granularity to the new width.
    pub fn resize_with_rewrap(
        &mut self,
        doc: &mut Document,
        annot: &AnnotationRef,
        new_rect: PdfRect,
    ) -> Result<AnnotationRef, MutationError> {
        let raw = self
            .raw_text
            .get(&annot.id)
            .cloned()
            .unwrap_or_else(|| annot.text.clone());
        let wrapped = char_wrap(&raw, new_rect.width(), annot.font_size);

        doc.delete_annotation(annot.page, annot.id)?;
        self.raw_text.remove(&annot.id);

        let spec = FreeTextSpec {
            text: wrapped,
            font_name: free_text_font(&raw, &annot.font_name),
            font_size: annot.font_size,
            color: annot.color,
        };
        let created = doc.add_free_text(annot.page, new_rect, &spec)?;
        self.raw_text.insert(created.id, raw);
        Ok(created)
    }

    /// Persist a plain move (no text change).
    pub fn move_annotation(
        &mut self,
        doc: &mut Document,
        page: u16,
        id: AnnotationId,
        rect: PdfRect,
    ) -> Result<(), MutationError> {
        doc.set_annotation_rect(page, id, rect)?;
        Ok(())
    }

    /// Delete an annotation and drop its registry entry.
    pub fn delete(
        &mut self,
        doc: &mut Document,
        page: u16,
        id: AnnotationId,
    ) -> Result<(), MutationError> {
        doc.delete_annotation(page, id)?;
        self.raw_text.remove(&id);
        Ok(())
    }

    /// Raw (unwrapped) text for an annotation, when known.
    pub fn raw_text(&self, id: AnnotationId) -> Option<&str> {
        self.raw_text.get(&id).map(String::as_str)
    }

    /// Record the raw text for an annotation (inline edit commit).
    pub fn set_raw_text(&mut self, id: AnnotationId, text: String) {
        self.raw_text.insert(id, text);
    }

    /// Preview of the wrapped text during an interactive resize, without
    /// touching the document.
    pub fn wrap_preview(&self, annot: &AnnotationRef, width: f32) -> String {
        let raw = self
            .raw_text
            .get(&annot.id)
            .map(String::as_str)
            .unwrap_or(&annot.text);
        char_wrap(raw, width, annot.font_size)
    }

    /// Width in points of the longest line of `text` at `font_size`.
    pub fn widest_line(text: &str, font_size: f32) -> f32 {
        text.split('\n')
            .map(|line| text_width(line, font_size))
            .fold(0.0, f32::max)
    }
}
