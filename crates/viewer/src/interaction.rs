//! Hit-testing and drag/resize interaction
//!
//! Pure geometry: which annotation or stamp is under a point (corner
//! handles first, then bodies, topmost stamps winning), and the rect
//! math for live move/resize. Mode and drag *state* live on the view;
//! the functions here have no side effects.

use vellum_core::geometry::{to_screen, ScreenPoint};
use vellum_core::stamp::{StampId, StampStore};
use vellum_engine::{AnnotationRef, Document, PdfPoint, PdfRect};

use crate::layout::PageLayout;

/// Corner handle diameter in screen pixels; also the hit radius.
pub const HANDLE_SIZE: f32 = 8.0;

/// Minimum annotation width at zoom 1, in document units (divided by the
/// current zoom so the on-screen minimum stays constant).
const MIN_WIDTH: f32 = 20.0;
const MIN_HEIGHT: f32 = 10.0;

/// Top-level interaction mode. At most one is active; entering any
/// non-Normal mode first runs the previous mode's cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    TextPlacement,
    Crop,
    TextEdit,
}

/// Resize handle, in hit-test order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    /// Document-space position of the opposite corner, the fixed anchor
    /// while this corner is dragged.
    pub fn opposite_anchor(&self, rect: PdfRect) -> PdfPoint {
        match self {
            Corner::TopLeft => PdfPoint::new(rect.x1, rect.y1),
            Corner::TopRight => PdfPoint::new(rect.x0, rect.y1),
            Corner::BottomRight => PdfPoint::new(rect.x0, rect.y0),
            Corner::BottomLeft => PdfPoint::new(rect.x1, rect.y0),
        }
    }
}

/// What the cursor should look like, for the host to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorHint {
    Arrow,
    Crosshair,
    IBeam,
    OpenHand,
    /// TL/BR handles (NW-SE diagonal).
    ResizeMain,
    /// TR/BL handles (NE-SW diagonal).
    ResizeAlt,
}

impl CursorHint {
    pub fn for_corner(corner: Corner) -> Self {
        match corner {
            Corner::TopLeft | Corner::BottomRight => CursorHint::ResizeMain,
            Corner::TopRight | Corner::BottomLeft => CursorHint::ResizeAlt,
        }
    }
}

/// What was hit.
#[derive(Debug, Clone)]
pub enum HitTarget {
    Annotation(AnnotationRef),
    Stamp(StampId),
}

#[derive(Debug, Clone)]
pub struct HitResult {
    pub target: HitTarget,
    pub page: u16,
    /// `None` means the body was hit (plain move).
    pub corner: Option<Corner>,
}

/// Find the annotation or stamp under a screen point.
///
/// Restricted to the page under the point ±1 for O(1) behavior on large
/// documents. For each candidate the four corner handles are tested
/// first (first match wins), then the body. Overlay stamps are checked
/// after native annotations, in reverse insertion order, so the topmost
/// drawn stamp wins body hits.
pub fn hit_test(
    doc: &Document,
    stamps: &StampStore,
    layout: &PageLayout,
    zoom: f32,
    widget_width: f32,
    point: ScreenPoint,
) -> Option<HitResult> {
    if layout.is_empty() {
        return None;
    }
    let center_page = layout.page_at_y(point.y);
    let check_start = center_page.saturating_sub(1);
    let check_end = (center_page + 2).min(layout.page_count());

    for page in check_start..check_end {
        let px = layout.page_x_offset(page, widget_width);
        let py = layout.offset(page);
        let Ok(annotations) = doc.annotations(page as u16) else {
            continue;
        };
        for annot in annotations {
            let sr = to_screen(annot.rect, px, py, zoom);
            for (corner, corner_point) in Corner::ALL.iter().zip(sr.corners()) {
                if point.distance_to(corner_point) < HANDLE_SIZE {
                    return Some(HitResult {
                        target: HitTarget::Annotation(annot),
                        page: page as u16,
                        corner: Some(*corner),
                    });
                }
            }
            if sr.contains(point) {
                return Some(HitResult {
                    target: HitTarget::Annotation(annot),
                    page: page as u16,
                    corner: None,
                });
            }
        }
    }

    for stamp in stamps.iter().rev() {
        let page = stamp.page as usize;
        if page < check_start || page >= check_end {
            continue;
        }
        let px = layout.page_x_offset(page, widget_width);
        let py = layout.offset(page);
        let sr = to_screen(stamp.rect(), px, py, zoom);
        for (corner, corner_point) in Corner::ALL.iter().zip(sr.corners()) {
            if point.distance_to(corner_point) < HANDLE_SIZE {
                return Some(HitResult {
                    target: HitTarget::Stamp(stamp.id),
                    page: stamp.page,
                    corner: Some(*corner),
                });
            }
        }
        if sr.contains(point) {
            return Some(HitResult {
                target: HitTarget::Stamp(stamp.id),
                page: stamp.page,
                corner: None,
            });
        }
    }
    None
}

/// Aspect-ratio-preserving stamp resize.
///
/// The larger of the width/height drag deltas (normalized by the aspect
/// ratio) drives the new size, anchored at the corner opposite the one
/// being dragged.
pub fn resize_stamp_rect(orig: PdfRect, anchor: PdfPoint, drag: PdfPoint, zoom: f32) -> PdfRect {
    let (orig_w, orig_h) = (orig.width(), orig.height());
    if orig_w <= 0.0 || orig_h <= 0.0 {
        return orig;
    }
    let aspect = orig_w / orig_h;
    let dx = (drag.x - anchor.x).abs();
    let dy = (drag.y - anchor.y).abs();

    let (new_w, new_h) = if dx / aspect > dy {
        let w = dx.max(MIN_WIDTH / zoom);
        (w, w / aspect)
    } else {
        let h = dy.max(MIN_WIDTH / zoom);
        (h * aspect, h)
    };

    let x0 = if drag.x < anchor.x { anchor.x - new_w } else { anchor.x };
    let y0 = if drag.y < anchor.y { anchor.y - new_h } else { anchor.y };
    PdfRect::new(x0, y0, x0 + new_w, y0 + new_h)
}

/// Free resize for annotations, with minimum dimensions so the box
/// cannot degenerate.
pub fn resize_free_rect(anchor: PdfPoint, drag: PdfPoint, zoom: f32) -> PdfRect {
    let x0 = anchor.x.min(drag.x);
    let y0 = anchor.y.min(drag.y);
    let x1 = anchor.x.max(drag.x);
    let y1 = anchor.y.max(drag.y);
    let w = (x1 - x0).max(MIN_WIDTH / zoom);
    let h = (y1 - y0).max(MIN_HEIGHT / zoom);
    PdfRect::new(x0, y0, x0 + w, y0 + h)
}

/// Live drag/resize bookkeeping, created on mouse-down over a hit
/// target and discarded on mouse-up.
#[derive(Debug, Clone)]
pub struct DragState {
    pub target: HitTarget,
    pub page: u16,
    /// Document-space point where the drag started.
    pub start: PdfPoint,
    /// Rectangle at drag start.
    pub orig_rect: PdfRect,
    /// Live rectangle, updated on every mouse-move.
    pub current_rect: PdfRect,
    /// Resize handle, or `None` for a body move.
    pub corner: Option<Corner>,
    /// Fixed anchor for resizes (opposite corner).
    pub anchor: PdfPoint,
    /// Raw unwrapped text captured at drag start for FreeText resize
    /// previews, so wrap recomputation never queries the document
    /// mid-drag.
    pub raw_text: Option<String>,
    /// Whether any mouse-move actually changed the rect.
    pub moved: bool,
}

impl DragState {
    pub fn begin(hit: &HitResult, start: PdfPoint, orig_rect: PdfRect) -> Self {
        let corner = hit.corner;
        let anchor = corner
            .map(|c| c.opposite_anchor(orig_rect))
            .unwrap_or(PdfPoint::new(orig_rect.x0, orig_rect.y0));
        Self {
            target: hit.target.clone(),
            page: hit.page,
            start,
            orig_rect,
            current_rect: orig_rect,
            corner,
            anchor,
            raw_text: None,
            moved: false,
        }
    }

    pub fn is_resize(&self) -> bool {
        self.corner.is_some()
    }

    /// Update the live rect for a pointer at `point` (document space).
    pub fn update(&mut self, point: PdfPoint, zoom: f32) {
        let next = if self.is_resize() {
            match self.target {
                HitTarget::Stamp(_) => resize_stamp_rect(self.orig_rect, self.anchor, point, zoom),
                HitTarget::Annotation(_) => resize_free_rect(self.anchor, point, zoom),
            }
        } else {
            let dx = point.x - self.start.x;
            let dy = point.y - self.start.y;
            self.orig_rect.shifted(dx, dy)
        };
        if next != self.current_rect {
            self.current_rect = next;
            self.moved = true;
        }
    }
}
