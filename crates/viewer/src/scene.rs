//! Paint plan
//!
//! The view produces a [`Scene`] per frame instead of painting directly:
//! positioned page quads with whatever imagery the cache could offer,
//! plus overlays (stamps, selection marks, search highlights, text-edit
//! hover, crop rubber band, drag preview). The host walks the scene and
//! draws with its toolkit of choice.

use std::path::PathBuf;
use std::sync::Arc;

use vellum_core::geometry::{ScreenPoint, ScreenRect};
use vellum_core::stamp::StampId;
use vellum_engine::RgbaImage;

/// Where a page quad's pixels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageImagery {
    /// Final render at the exact key; drawn 1:1.
    Exact,
    /// Final render that must be stretched to the quad (visual zoom in
    /// progress, or dimensions drifted).
    Stretched,
    /// Low-resolution preview, stretched.
    Preview,
    /// Nearest other zoom level, stretched (interactive zoom only).
    Fallback,
    /// Nothing cached yet: draw a plain white placeholder with no
    /// "loading" text, which would flash worse than a quiet blank page.
    Placeholder,
}

/// One page to draw.
#[derive(Debug, Clone)]
pub struct PageQuad {
    pub page: u16,
    pub rect: ScreenRect,
    pub image: Option<Arc<RgbaImage>>,
    pub imagery: PageImagery,
}

/// An overlay stamp to draw above its page.
#[derive(Debug, Clone)]
pub struct StampQuad {
    pub id: StampId,
    pub rect: ScreenRect,
    pub image_path: PathBuf,
    pub selected: bool,
}

/// Selection adornments: dashed border plus four corner handle discs.
#[derive(Debug, Clone)]
pub struct SelectionMarks {
    pub rect: ScreenRect,
    pub handles: [ScreenPoint; 4],
}

/// A search match highlight.
#[derive(Debug, Clone)]
pub struct HighlightQuad {
    pub rect: ScreenRect,
    /// The match the user is currently stepped to.
    pub current: bool,
}

/// Live drag feedback: cover the original position, draw the moving
/// rect (with re-wrapped text for FreeText resizes).
#[derive(Debug, Clone)]
pub struct DragPreview {
    pub cover: ScreenRect,
    pub rect: ScreenRect,
    pub wrapped_text: Option<String>,
}

/// Everything the host needs to draw one frame.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub pages: Vec<PageQuad>,
    pub stamps: Vec<StampQuad>,
    pub selection: Option<SelectionMarks>,
    pub search: Vec<HighlightQuad>,
    pub text_edit_hover: Option<ScreenRect>,
    pub crop_band: Option<ScreenRect>,
    pub drag: Option<DragPreview>,
}

impl Scene {
    pub fn page(&self, page: u16) -> Option<&PageQuad> {
        self.pages.iter().find(|q| q.page == page)
    }
}
