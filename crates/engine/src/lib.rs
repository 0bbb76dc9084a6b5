//! PDF document engine boundary
//!
//! Provides the document handle types the rest of the workspace is built
//! against: a live, mutable [`Document`] owned by the UI thread and a
//! read-only, thread-affine [`RenderDocument`] for background
//! rasterization.
//!
//! The backend is `lopdf`: page dictionaries, FreeText annotation objects
//! and content streams are real PDF objects that survive a
//! serialize/reopen round trip. Rasterization replays the operator subset
//! this engine writes (filled rectangles, greeked text runs, images) onto
//! a white page: enough for background-color sampling, cover-and-redraw
//! and preview imagery, with full-fidelity page rasterization left to an
//! external toolkit.
//!
//! All coordinates exposed by this crate are top-left document space
//! (x right, y down, units in points); the PDF file's bottom-left
//! convention is flipped at the object boundary.

mod document;
mod metrics;
mod raster;
mod render;
mod text;

pub use document::{AnnotationId, AnnotationRef, Document, FreeTextSpec, TextInsertSpec};
pub use metrics::{glyph_advance, text_width};
pub use render::{RenderDocument, RenderSource};
pub use text::{CharBox, RawLine, RawSpan};

pub type RgbaImage = image::RgbaImage;

/// Page dimensions in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Axis-aligned rectangle in top-left document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PdfRect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn contains(&self, p: PdfPoint) -> bool {
        p.x >= self.x0 && p.x <= self.x1 && p.y >= self.y0 && p.y <= self.y1
    }

    /// Grow the rectangle by `d` on every side.
    pub fn expanded(&self, d: f32) -> Self {
        Self::new(self.x0 - d, self.y0 - d, self.x1 + d, self.y1 + d)
    }

    /// Translate by (dx, dy).
    pub fn shifted(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    pub fn center(&self) -> PdfPoint {
        PdfPoint::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }
}

/// Point in top-left document space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfPoint {
    pub x: f32,
    pub y: f32,
}

impl PdfPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Normalized RGB color (components in 0.0..=1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: RgbColor = RgbColor { r: 1.0, g: 1.0, b: 1.0 };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.b.clamp(0.0, 1.0) * 255.0).round() as u8,
            255,
        ]
    }
}

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u16, page_count: u16 },

    #[error("annotation {0} not found")]
    AnnotationNotFound(AnnotationId),

    #[error("malformed content stream: {0}")]
    MalformedContent(String),

    #[error("render error: {0}")]
    Render(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
