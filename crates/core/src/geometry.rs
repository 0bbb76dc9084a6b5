//! Coordinate transforms between document space and screen space
//!
//! Document space is top-left page-local points; screen space is pixels
//! after zoom and per-page offset. Pure functions; zoom never reaches
//! zero (clamped to [0.1, 8.0] by the zoom controller), so the inverse
//! transforms cannot divide by zero.

use vellum_engine::{PdfPoint, PdfRect};

/// Point in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: ScreenPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Rectangle in screen pixels (origin at top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning two corner points, normalized.
    pub fn from_points(a: ScreenPoint, b: ScreenPoint) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self::new(x, y, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, p: ScreenPoint) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn expanded(&self, d: f32) -> Self {
        Self::new(self.x - d, self.y - d, self.width + 2.0 * d, self.height + 2.0 * d)
    }

    /// The four corners in hit-test order: TL, TR, BR, BL.
    pub fn corners(&self) -> [ScreenPoint; 4] {
        [
            ScreenPoint::new(self.x, self.y),
            ScreenPoint::new(self.right(), self.y),
            ScreenPoint::new(self.right(), self.bottom()),
            ScreenPoint::new(self.x, self.bottom()),
        ]
    }
}

/// Map a document-space rectangle to screen space.
pub fn to_screen(rect: PdfRect, offset_x: f32, offset_y: f32, zoom: f32) -> ScreenRect {
    ScreenRect::new(
        rect.x0 * zoom + offset_x,
        rect.y0 * zoom + offset_y,
        rect.width() * zoom,
        rect.height() * zoom,
    )
}

/// Map a screen point back into document space.
pub fn point_to_document(p: ScreenPoint, offset_x: f32, offset_y: f32, zoom: f32) -> PdfPoint {
    PdfPoint::new((p.x - offset_x) / zoom, (p.y - offset_y) / zoom)
}

/// Map a screen rectangle back into document space.
pub fn rect_to_document(r: ScreenRect, offset_x: f32, offset_y: f32, zoom: f32) -> PdfRect {
    PdfRect::new(
        (r.x - offset_x) / zoom,
        (r.y - offset_y) / zoom,
        (r.right() - offset_x) / zoom,
        (r.bottom() - offset_y) / zoom,
    )
}
