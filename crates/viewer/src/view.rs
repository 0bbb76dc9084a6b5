//! The PDF view facade
//!
//! Owns the live document, layout, zoom controller, render cache and
//! pipeline, interaction state and the mutation engines, and exposes the
//! host-facing API: feed it input events and a ~60 Hz tick, drain
//! [`ViewerEvent`]s, and draw the [`Scene`] it builds each frame.
//!
//! Threading: everything here runs on the owning (UI) thread. The only
//! background work is rasterization, which operates on copied
//! [`RenderSource`] data and reports back through the pipeline's
//! channel; results are applied in [`PdfView::pump_renders`] on this
//! thread, so no state is shared across threads.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use vellum_cache::{Lookup, PageImageCache, RenderKey};
use vellum_core::geometry::{point_to_document, rect_to_document, to_screen, ScreenPoint, ScreenRect};
use vellum_core::stamp::{StampId, StampStore};
use vellum_core::style::FreeTextStyle;
use vellum_core::text_edit::{CommitOutcome, TextEditEngine, TextLine};
use vellum_core::{char_wrap, AnnotationEngine, FontCatalog};
use vellum_engine::{AnnotationRef, Document, PdfPoint, PdfRect, RenderSource};
use vellum_scheduler::WorkerPoolConfig;

use crate::interaction::{
    hit_test, CursorHint, DragState, HitResult, HitTarget, Mode,
};
use crate::layout::PageLayout;
use crate::pipeline::RenderPipeline;
use crate::scene::{
    DragPreview, HighlightQuad, PageImagery, PageQuad, Scene, SelectionMarks, StampQuad,
};
use crate::zoom::{ZoomController, ZoomTick};

/// Pages ahead of the current one pre-rendered while scrolling.
const PRERENDER_LOOKAHEAD: u16 = 10;

/// Pages behind the current one pre-rendered while scrolling.
const PRERENDER_LOOKBEHIND: u16 = 4;

/// Minimum crop rectangle size in screen pixels; smaller drags are
/// discarded silently.
const MIN_CROP_SIZE: f32 = 10.0;

/// Host-managed viewport state, in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scroll_y: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 800.0, height: 600.0, scroll_y: 0.0 }
    }
}

/// Wheel input, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WheelDelta {
    /// Precision-touchpad pixel delta.
    Pixels(f32),
    /// Classic wheel angle delta (multiples of ±120).
    Angle(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// Notifications for the host, drained with [`PdfView::take_events`].
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    PageChanged(u16),
    ZoomChanged(f32),
    DocumentModified,
    /// Right-click edit request on a FreeText annotation (host opens its
    /// edit dialog and calls [`PdfView::update_free_text`]).
    AnnotationEditRequested { annotation: AnnotationRef, page: u16 },
    TextPlaced,
}

/// Callback fired when a crop rectangle is selected.
pub type CropCallback = Box<dyn FnMut(u16, PdfRect) + Send>;

#[derive(Debug, Clone)]
enum Selection {
    Annotation(AnnotationRef),
    Stamp(StampId),
}

/// The interactive PDF view core.
pub struct PdfView {
    doc: Option<Document>,
    file_path: Option<PathBuf>,
    snapshot: Option<Arc<Vec<u8>>>,

    layout: PageLayout,
    zoom: ZoomController,
    cache: PageImageCache,
    pipeline: RenderPipeline,

    annotations: AnnotationEngine,
    stamps: StampStore,
    text_edit: TextEditEngine,

    mode: Mode,
    selection: Option<Selection>,
    drag: Option<DragState>,
    pending_style: Option<FreeTextStyle>,
    crop_callback: Option<CropCallback>,
    crop_drag: Option<(ScreenPoint, ScreenPoint)>,
    hover_line: Option<(u16, TextLine)>,

    search: Vec<(u16, PdfRect)>,
    search_current: Option<usize>,

    viewport: Viewport,
    current_page: u16,
    events: VecDeque<ViewerEvent>,
}

impl PdfView {
    pub fn new(catalog: Arc<FontCatalog>) -> Self {
        Self::with_pipeline(catalog, 1.0, WorkerPoolConfig::default())
    }

    /// Configure display pixel ratio and worker pool explicitly.
    pub fn with_pipeline(
        catalog: Arc<FontCatalog>,
        device_pixel_ratio: f32,
        pool: WorkerPoolConfig,
    ) -> Self {
        Self {
            doc: None,
            file_path: None,
            snapshot: None,
            layout: PageLayout::new(),
            zoom: ZoomController::new(),
            cache: PageImageCache::new(),
            pipeline: RenderPipeline::new(device_pixel_ratio, pool),
            annotations: AnnotationEngine::new(),
            stamps: StampStore::new(),
            text_edit: TextEditEngine::new(catalog),
            mode: Mode::Normal,
            selection: None,
            drag: None,
            pending_style: None,
            crop_callback: None,
            crop_drag: None,
            hover_line: None,
            search: Vec::new(),
            search_current: None,
            viewport: Viewport::default(),
            current_page: 0,
            events: VecDeque::new(),
        }
    }

    // ── Document ─────────────────────────────────────────────────────

    /// Install a document. `keep_snapshot` carries unsaved modifications
    /// into background rendering immediately; without it, renders come
    /// from the file path until the first mutation. A document with no
    /// backing path is always snapshotted.
    pub fn set_document(
        &mut self,
        mut doc: Document,
        path: Option<PathBuf>,
        keep_snapshot: bool,
    ) {
        self.snapshot = if keep_snapshot || path.is_none() {
            match doc.serialize() {
                Ok(bytes) => Some(Arc::new(bytes)),
                Err(err) => {
                    tracing::warn!(%err, "snapshot failed on document install");
                    None
                }
            }
        } else {
            None
        };

        self.layout.recompute(doc.page_sizes(), self.zoom.committed());
        self.pipeline.set_current_zoom(self.zoom.committed());
        self.doc = Some(doc);
        self.file_path = path;

        self.cache.clear();
        self.cache.clear_pending();
        self.selection = None;
        self.drag = None;
        self.stamps = StampStore::new();
        self.search.clear();
        self.search_current = None;
        self.text_edit.invalidate_all();
        self.current_page = 0;
    }

    pub fn document(&self) -> Option<&Document> {
        self.doc.as_ref()
    }

    pub fn page_count(&self) -> u16 {
        self.doc.as_ref().map(|d| d.page_count()).unwrap_or(0)
    }

    fn render_source(&self) -> Option<RenderSource> {
        if let Some(snapshot) = &self.snapshot {
            return Some(RenderSource::Snapshot(snapshot.clone()));
        }
        self.file_path.clone().map(RenderSource::Path)
    }

    /// Refresh the snapshot after a document mutation, invalidate the
    /// affected page (or everything) and notify the host.
    fn mark_modified(&mut self, page: Option<u16>) {
        if let Some(doc) = self.doc.as_mut() {
            match doc.serialize() {
                Ok(bytes) => self.snapshot = Some(Arc::new(bytes)),
                Err(err) => tracing::warn!(%err, "snapshot failed after mutation"),
            }
        }
        match page {
            Some(p) => {
                self.cache.invalidate_page(p);
                self.text_edit.invalidate_page(p);
            }
            None => {
                self.cache.clear();
                self.text_edit.invalidate_all();
            }
        }
        self.events.push_back(ViewerEvent::DocumentModified);
    }

    // ── Viewport & navigation ────────────────────────────────────────

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    /// Host scrollbar moved.
    pub fn on_scroll(&mut self, scroll_y: f32) {
        self.viewport.scroll_y = scroll_y.max(0.0);
        let visible = self.visible_page();
        if visible != self.current_page {
            self.current_page = visible;
            self.events.push_back(ViewerEvent::PageChanged(visible));
        }
        self.prerender_near(visible);
    }

    pub fn scroll_to_page(&mut self, page: u16) {
        if (page as usize) < self.layout.page_count() {
            self.on_scroll(self.layout.y_for_page(page as usize));
        }
    }

    /// Page currently at the viewport center.
    pub fn visible_page(&self) -> u16 {
        self.layout
            .page_at_y(self.viewport.scroll_y + self.viewport.height / 2.0) as u16
    }

    /// Total content size at the committed zoom, for host scrollbars.
    pub fn content_size(&self) -> (f32, f32) {
        (
            self.layout.max_width().max(self.viewport.width),
            self.layout.total_height(),
        )
    }

    /// Queue renders for pages about to scroll into view.
    fn prerender_near(&mut self, center: u16) {
        let Some(source) = self.render_source() else { return };
        let zoom = self.zoom.committed();
        let start = center.saturating_sub(PRERENDER_LOOKBEHIND);
        let end = (center + PRERENDER_LOOKAHEAD + 1).min(self.layout.page_count() as u16);
        for page in start..end {
            let key = RenderKey::new(page, zoom);
            if !self.cache.contains_high(&key) && self.cache.begin_pending(key) {
                self.pipeline.schedule(source.clone(), key);
            }
        }
    }

    // ── Zoom ─────────────────────────────────────────────────────────

    pub fn zoom(&self) -> f32 {
        self.zoom.committed()
    }

    /// Absolute zoom request (toolbar buttons, percentage input).
    pub fn set_zoom(&mut self, zoom: f32, now: Instant) {
        self.zoom
            .request_zoom(zoom, self.viewport.scroll_y, self.viewport.height, now);
    }

    /// Wheel input; returns false when the modifier is not held so the
    /// host can route the event to scrolling instead.
    pub fn wheel(
        &mut self,
        delta: WheelDelta,
        modifier_held: bool,
        cursor_viewport_y: f32,
        now: Instant,
    ) -> bool {
        if !modifier_held {
            return false;
        }
        let (pixels, angle) = match delta {
            WheelDelta::Pixels(py) => (py, 0.0),
            WheelDelta::Angle(ay) => (0.0, ay),
        };
        self.zoom.wheel_zoom(
            pixels,
            angle,
            cursor_viewport_y,
            self.viewport.scroll_y,
            self.viewport.height,
            now,
        );
        true
    }

    /// Advance animations; call at ~60 Hz. Returns true when a repaint
    /// is needed. After a commit the host should re-read `viewport()`
    /// for the corrected scroll position and refresh scrollbar ranges
    /// from `content_size()`.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.zoom.tick(now) {
            ZoomTick::Quiet => false,
            ZoomTick::Repaint => true,
            ZoomTick::Committed { zoom, scroll } => {
                if let Some(doc) = &self.doc {
                    self.layout.recompute(doc.page_sizes(), zoom);
                }
                self.viewport.scroll_y = scroll;
                self.cache.clear_pending();
                self.pipeline.set_current_zoom(zoom);
                self.events.push_back(ViewerEvent::ZoomChanged(zoom));
                let visible = self.visible_page();
                if visible != self.current_page {
                    self.current_page = visible;
                    self.events.push_back(ViewerEvent::PageChanged(visible));
                }
                true
            }
        }
    }

    /// Apply finished background renders. Returns true when any were
    /// cached (repaint needed). Stale results, keyed at a zoom that is
    /// no longer committed, are discarded here; dropping them is
    /// mandatory, not an optimization.
    pub fn pump_renders(&mut self) -> bool {
        let current = RenderKey::new(0, self.zoom.committed()).zoom_millis;
        let mut applied = false;
        for delivery in self.pipeline.drain() {
            if delivery.key.zoom_millis != current {
                tracing::debug!(
                    page = delivery.key.page,
                    stale = delivery.key.zoom_millis,
                    "discarding stale render"
                );
                continue;
            }
            let image = Arc::new(delivery.image);
            if delivery.high_res {
                self.cache.insert_high(delivery.key, image);
            } else {
                self.cache.insert_low(delivery.key, image);
            }
            applied = true;
        }
        applied
    }

    /// Whether the cache holds a final render of `page` at the committed
    /// zoom.
    pub fn has_final_render(&self, page: u16) -> bool {
        self.cache
            .contains_high(&RenderKey::new(page, self.zoom.committed()))
    }

    pub fn cache_stats(&self) -> vellum_cache::CacheStats {
        self.cache.stats()
    }

    // ── Modes ────────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Leave the active mode, running its cleanup (a pending inline text
    /// edit is committed, not dropped).
    pub fn exit_current_mode(&mut self) {
        match self.mode {
            Mode::Normal => return,
            Mode::TextEdit => {
                self.commit_text_edit();
                self.hover_line = None;
                self.text_edit.invalidate_all();
            }
            Mode::TextPlacement => {
                self.pending_style = None;
            }
            Mode::Crop => {
                self.crop_drag = None;
                self.crop_callback = None;
            }
        }
        self.mode = Mode::Normal;
    }

    /// Arm text placement: the next left click creates an annotation
    /// with this style.
    pub fn enter_text_placement_mode(&mut self, style: FreeTextStyle) {
        self.exit_current_mode();
        self.clear_selection();
        self.pending_style = Some(style);
        self.mode = Mode::TextPlacement;
    }

    pub fn enter_crop_mode(&mut self, callback: CropCallback) {
        self.exit_current_mode();
        self.clear_selection();
        self.crop_callback = Some(callback);
        self.mode = Mode::Crop;
    }

    pub fn enter_text_edit_mode(&mut self) {
        self.exit_current_mode();
        self.clear_selection();
        self.text_edit.invalidate_all();
        self.mode = Mode::TextEdit;
    }

    fn clear_selection(&mut self) {
        self.selection = None;
        self.stamps.select(None);
    }

    // ── Mouse input ──────────────────────────────────────────────────

    pub fn mouse_down(&mut self, point: ScreenPoint, button: MouseButton) {
        match self.mode {
            Mode::TextPlacement => {
                if button == MouseButton::Left {
                    self.place_text_at(point);
                }
            }
            Mode::Crop => {
                if button == MouseButton::Left {
                    self.crop_drag = Some((point, point));
                }
            }
            Mode::TextEdit => {
                if button == MouseButton::Left {
                    self.text_edit_click(point);
                }
            }
            Mode::Normal => match button {
                MouseButton::Right => {
                    // Select for the host's context menu.
                    let _ = self.context_menu_target(point);
                }
                MouseButton::Left => self.begin_drag(point),
            },
        }
    }

    pub fn mouse_move(&mut self, point: ScreenPoint) -> CursorHint {
        match self.mode {
            Mode::TextPlacement => CursorHint::Crosshair,
            Mode::Crop => {
                if let Some((_, current)) = &mut self.crop_drag {
                    *current = point;
                }
                CursorHint::Crosshair
            }
            Mode::TextEdit => self.text_edit_hover(point),
            Mode::Normal => {
                if self.drag.is_some() {
                    self.update_drag(point);
                    return CursorHint::OpenHand;
                }
                match self.hit_at(point) {
                    Some(hit) => match hit.corner {
                        Some(corner) => CursorHint::for_corner(corner),
                        None => CursorHint::OpenHand,
                    },
                    None => CursorHint::Arrow,
                }
            }
        }
    }

    pub fn mouse_up(&mut self, point: ScreenPoint) {
        if self.mode == Mode::Crop {
            self.finish_crop(point);
            return;
        }
        self.finish_drag();
    }

    /// Double click on a FreeText body asks the host to open its editor.
    pub fn double_click(&mut self, point: ScreenPoint) {
        if self.mode != Mode::Normal {
            return;
        }
        if let Some(hit) = self.hit_at(point) {
            if hit.corner.is_none() {
                if let HitTarget::Annotation(annotation) = hit.target {
                    let page = hit.page;
                    self.events
                        .push_back(ViewerEvent::AnnotationEditRequested { annotation, page });
                }
            }
        }
    }

    /// Hit-test and select for a context menu; the host decides what to
    /// show for the returned target.
    pub fn context_menu_target(&mut self, point: ScreenPoint) -> Option<HitResult> {
        let hit = self.hit_at(point)?;
        match &hit.target {
            HitTarget::Annotation(a) => {
                self.selection = Some(Selection::Annotation(a.clone()));
                self.stamps.select(None);
            }
            HitTarget::Stamp(id) => {
                self.selection = Some(Selection::Stamp(*id));
                self.stamps.select(Some(*id));
            }
        }
        Some(hit)
    }

    fn hit_at(&self, point: ScreenPoint) -> Option<HitResult> {
        let doc = self.doc.as_ref()?;
        hit_test(
            doc,
            &self.stamps,
            &self.layout,
            self.zoom.committed(),
            self.viewport.width,
            point,
        )
    }

    fn page_origin(&self, page: u16) -> (f32, f32) {
        (
            self.layout.page_x_offset(page as usize, self.viewport.width),
            self.layout.offset(page as usize),
        )
    }

    fn to_doc_point(&self, point: ScreenPoint, page: u16) -> PdfPoint {
        let (px, py) = self.page_origin(page);
        point_to_document(point, px, py, self.zoom.committed())
    }

    fn begin_drag(&mut self, point: ScreenPoint) {
        let Some(hit) = self.hit_at(point) else {
            self.clear_selection();
            return;
        };

        let orig_rect = match &hit.target {
            HitTarget::Annotation(a) => {
                self.selection = Some(Selection::Annotation(a.clone()));
                self.stamps.select(None);
                a.rect
            }
            HitTarget::Stamp(id) => {
                self.selection = Some(Selection::Stamp(*id));
                self.stamps.select(Some(*id));
                match self.stamps.get(*id) {
                    Some(stamp) => stamp.rect(),
                    None => return,
                }
            }
        };

        let start = self.to_doc_point(point, hit.page);
        let mut drag = DragState::begin(&hit, start, orig_rect);
        if let HitTarget::Annotation(a) = &hit.target {
            // Capture the unwrapped text once so live resize previews
            // never query the document mid-drag.
            drag.raw_text = Some(
                self.annotations
                    .raw_text(a.id)
                    .map(str::to_string)
                    .unwrap_or_else(|| a.text.clone()),
            );
        }
        self.drag = Some(drag);
    }

    fn update_drag(&mut self, point: ScreenPoint) {
        let zoom = self.zoom.committed();
        let Some(drag) = &mut self.drag else { return };
        let (px, py) = (
            self.layout.page_x_offset(drag.page as usize, self.viewport.width),
            self.layout.offset(drag.page as usize),
        );
        let doc_point = point_to_document(point, px, py, zoom);
        drag.update(doc_point, zoom);

        // Stamps live only in memory; their store rect follows the drag.
        if let HitTarget::Stamp(id) = &drag.target {
            if let Some(stamp) = self.stamps.get_mut(*id) {
                stamp.set_rect(drag.current_rect);
            }
        }
    }

    fn finish_drag(&mut self) {
        let Some(drag) = self.drag.take() else { return };
        if !drag.moved {
            return;
        }

        match &drag.target {
            HitTarget::Stamp(_) => {
                // Rect already updated in the store; nothing touches the
                // document until burn-in.
                self.events.push_back(ViewerEvent::DocumentModified);
            }
            HitTarget::Annotation(annot) => {
                let annot = annot.clone();
                let Some(doc) = self.doc.as_mut() else { return };
                let result = if drag.is_resize() {
                    // Character-level re-wrap into the new width; the
                    // annotation is recreated, so adopt the new ref.
                    self.annotations
                        .resize_with_rewrap(doc, &annot, drag.current_rect)
                        .map(Selection::Annotation)
                } else {
                    self.annotations
                        .move_annotation(doc, drag.page, annot.id, drag.current_rect)
                        .map(|()| {
                            Selection::Annotation(AnnotationRef {
                                rect: drag.current_rect,
                                ..annot.clone()
                            })
                        })
                };
                match result {
                    Ok(selection) => {
                        self.selection = Some(selection);
                        self.mark_modified(Some(drag.page));
                    }
                    Err(err) => {
                        // Abandon the change; prior state stays intact.
                        tracing::warn!(%err, "annotation mutation failed");
                    }
                }
            }
        }
    }

    fn finish_crop(&mut self, point: ScreenPoint) {
        let Some((start, _)) = self.crop_drag.take() else {
            return;
        };
        let band = ScreenRect::from_points(start, point);
        let mut callback = self.crop_callback.take();
        self.mode = Mode::Normal;

        if band.width > MIN_CROP_SIZE && band.height > MIN_CROP_SIZE {
            let center_y = band.y + band.height / 2.0;
            let page = self.layout.page_at_y(center_y) as u16;
            let (px, py) = self.page_origin(page);
            let rect = rect_to_document(band, px, py, self.zoom.committed());
            if let Some(cb) = callback.as_mut() {
                cb(page, rect);
            }
        }
        // Sub-threshold drags return to Normal without firing.
    }

    // ── Text placement ───────────────────────────────────────────────

    fn place_text_at(&mut self, point: ScreenPoint) {
        let Some(style) = self.pending_style.clone() else { return };
        if self.layout.is_empty() {
            return;
        }
        let page = self.layout.page_at_y(point.y) as u16;
        let (px, py) = self.page_origin(page);
        let page_rect = ScreenRect::new(
            px,
            py,
            self.layout.width(page as usize),
            self.layout.height(page as usize),
        );
        if !page_rect.contains(point) {
            return;
        }

        let doc_point = self.to_doc_point(point, page);
        let Some(doc) = self.doc.as_mut() else { return };
        match self.annotations.create_at_point(doc, page, doc_point, &style) {
            Ok(created) => {
                self.selection = Some(Selection::Annotation(created));
                self.pending_style = None;
                self.mode = Mode::Normal;
                self.mark_modified(Some(page));
                self.events.push_back(ViewerEvent::TextPlaced);
            }
            Err(err) => {
                tracing::warn!(%err, "text placement failed");
            }
        }
    }

    /// Create a text annotation at the center of a page (toolbar path).
    pub fn add_text_at_page_center(&mut self, page: u16, style: &FreeTextStyle) {
        let Some(doc) = self.doc.as_mut() else { return };
        match self.annotations.create_at_page_center(doc, page, style) {
            Ok(created) => {
                self.selection = Some(Selection::Annotation(created));
                self.mark_modified(Some(page));
            }
            Err(err) => tracing::warn!(%err, "center text placement failed"),
        }
    }

    /// Replace an annotation's text/style (edit dialog flow). Returns
    /// the replacement ref; the passed-in ref is dead afterwards.
    pub fn update_free_text(
        &mut self,
        annot: &AnnotationRef,
        style: &FreeTextStyle,
    ) -> Option<AnnotationRef> {
        let doc = self.doc.as_mut()?;
        match self.annotations.update(doc, annot, style) {
            Ok(new_ref) => {
                self.selection = Some(Selection::Annotation(new_ref.clone()));
                self.mark_modified(Some(annot.page));
                Some(new_ref)
            }
            Err(err) => {
                tracing::warn!(%err, "annotation update failed");
                None
            }
        }
    }

    /// Raw (unwrapped) text of an annotation for inline editing.
    pub fn annotation_raw_text(&self, annot: &AnnotationRef) -> String {
        self.annotations
            .raw_text(annot.id)
            .map(str::to_string)
            .unwrap_or_else(|| annot.text.clone())
    }

    pub fn delete_annotation(&mut self, page: u16, annot: &AnnotationRef) {
        let Some(doc) = self.doc.as_mut() else { return };
        match self.annotations.delete(doc, page, annot.id) {
            Ok(()) => {
                if matches!(&self.selection, Some(Selection::Annotation(a)) if a.id == annot.id) {
                    self.selection = None;
                }
                self.mark_modified(Some(page));
            }
            Err(err) => tracing::warn!(%err, "annotation delete failed"),
        }
    }

    // ── Stamps ───────────────────────────────────────────────────────

    /// Place an overlay stamp; in-memory until [`Self::burn_overlay_stamps`].
    pub fn place_stamp_on_page(
        &mut self,
        page: u16,
        image_path: &Path,
        at: Option<ScreenPoint>,
    ) -> Option<StampId> {
        let doc = self.doc.as_ref()?;
        let doc_point = at.map(|p| self.to_doc_point(p, page));
        match self.stamps.place(doc, page, image_path, doc_point) {
            Ok(id) => {
                self.events.push_back(ViewerEvent::DocumentModified);
                Some(id)
            }
            Err(err) => {
                tracing::warn!(%err, "stamp placement failed");
                None
            }
        }
    }

    pub fn delete_stamp(&mut self, id: StampId) {
        if self.stamps.remove(id) {
            if matches!(self.selection, Some(Selection::Stamp(s)) if s == id) {
                self.selection = None;
            }
            self.events.push_back(ViewerEvent::DocumentModified);
        }
    }

    /// Write all overlay stamps into the document and clear them.
    pub fn burn_overlay_stamps(&mut self) {
        let Some(doc) = self.doc.as_mut() else { return };
        let touched = self.stamps.burn_into(doc);
        if !touched.is_empty() {
            self.cache.clear();
            self.mark_modified(None);
        }
    }

    pub fn overlay_stamps(&self) -> &StampStore {
        &self.stamps
    }

    // ── Native text edit ─────────────────────────────────────────────

    fn text_edit_click(&mut self, point: ScreenPoint) {
        // Commit any open line first; only one edit at a time.
        self.commit_text_edit();
        if self.layout.is_empty() {
            return;
        }
        let page = self.layout.page_at_y(point.y) as u16;
        let doc_point = self.to_doc_point(point, page);
        let Some(doc) = self.doc.as_mut() else { return };
        if let Err(err) = self.text_edit.begin_edit(doc, page, doc_point) {
            tracing::debug!(%err, "no editable line at click point");
        }
    }

    fn text_edit_hover(&mut self, point: ScreenPoint) -> CursorHint {
        if self.layout.is_empty() {
            return CursorHint::Arrow;
        }
        let page = self.layout.page_at_y(point.y) as u16;
        let doc_point = self.to_doc_point(point, page);
        let Some(doc) = self.doc.as_ref() else {
            return CursorHint::Arrow;
        };
        match self.text_edit.line_at(doc, page, doc_point) {
            Ok(Some(line)) => {
                self.hover_line = Some((page, line));
                CursorHint::IBeam
            }
            _ => {
                self.hover_line = None;
                CursorHint::Arrow
            }
        }
    }

    /// The line currently being edited, if any.
    pub fn text_edit_session(&self) -> Option<(u16, &TextLine, &str)> {
        self.text_edit
            .session()
            .map(|s| (s.page, &s.line, s.text.as_str()))
    }

    /// Host editor widget pushed new text for the open edit.
    pub fn set_text_edit_text(&mut self, text: impl Into<String>) {
        self.text_edit.set_session_text(text);
    }

    /// Commit the open inline edit into the page.
    pub fn commit_text_edit(&mut self) {
        let Some(doc) = self.doc.as_mut() else { return };
        match self.text_edit.commit(doc) {
            Ok(CommitOutcome::Committed { page }) => self.mark_modified(Some(page)),
            Ok(CommitOutcome::Unchanged) => {}
            Err(err) => {
                // The line is left unedited; the attempt is not retried.
                tracing::warn!(%err, "text edit commit failed");
            }
        }
    }

    pub fn cancel_text_edit(&mut self) {
        self.text_edit.cancel();
    }

    // ── Search ───────────────────────────────────────────────────────

    pub fn set_search_highlights(&mut self, rects: Vec<(u16, PdfRect)>, current: Option<usize>) {
        self.search = rects;
        self.search_current = current;
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
        self.search_current = None;
    }

    /// Force a full cache clear (external structural edits).
    pub fn invalidate_all_pages(&mut self) {
        self.cache.clear();
        self.cache.clear_pending();
    }

    pub fn take_events(&mut self) -> Vec<ViewerEvent> {
        self.events.drain(..).collect()
    }

    // ── Scene ────────────────────────────────────────────────────────

    /// Build the paint plan for the current frame, scheduling background
    /// renders for anything missing from the cache.
    pub fn build_scene(&mut self) -> Scene {
        let mut scene = Scene::default();
        if self.doc.is_none() || self.layout.is_empty() {
            return scene;
        }
        let source = self.render_source();
        let zoom = self.zoom.committed();
        let interactive = self.zoom.is_interactive();
        let scale = self.zoom.visual_scale();

        // During a gesture pages scale around the anchor (cursor or
        // viewport center) purely at paint time.
        let anchor = self.zoom.anchor().unwrap_or(self.viewport.height / 2.0);
        let view_cy = self.viewport.scroll_y + anchor;
        let view_cx = self.viewport.width / 2.0;

        let range = self
            .layout
            .visible_range(self.viewport.scroll_y, self.viewport.height);

        for page_idx in range {
            let page = page_idx as u16;
            let offset = self.layout.offset(page_idx);
            let x_offset = self.layout.page_x_offset(page_idx, self.viewport.width);
            let page_y = view_cy + (offset - view_cy) * scale;
            let page_x = view_cx + (x_offset - view_cx) * scale;
            let page_h = self.layout.height(page_idx) * scale;
            let page_w = self.layout.width(page_idx) * scale;

            // Strictly offscreen pages are skipped even inside the
            // buffered range.
            if page_y + page_h < self.viewport.scroll_y - 100.0
                || page_y > self.viewport.scroll_y + self.viewport.height + 100.0
            {
                continue;
            }

            let key = RenderKey::new(page, zoom);
            let lookup = self.cache.lookup(key, interactive);
            if !lookup.is_exact() {
                if let Some(source) = &source {
                    if self.cache.begin_pending(key) {
                        self.pipeline.schedule(source.clone(), key);
                    }
                }
            }

            let (image, imagery) = match lookup {
                Lookup::Exact(img) => {
                    let imagery = if scale != 1.0 { PageImagery::Stretched } else { PageImagery::Exact };
                    (Some(img), imagery)
                }
                Lookup::Preview(img) => (Some(img), PageImagery::Preview),
                Lookup::Fallback(img) => (Some(img), PageImagery::Fallback),
                Lookup::Miss => (None, PageImagery::Placeholder),
            };
            scene.pages.push(PageQuad {
                page,
                rect: ScreenRect::new(page_x, page_y, page_w, page_h),
                image,
                imagery,
            });

            // Overlay stamps on this page, in insertion (z) order.
            for stamp in self.stamps.iter().filter(|s| s.page == page) {
                scene.stamps.push(StampQuad {
                    id: stamp.id,
                    rect: to_screen(stamp.rect(), page_x, page_y, zoom),
                    image_path: stamp.path.clone(),
                    selected: stamp.selected,
                });
            }

            // Drag feedback: cover the original spot, draw the live rect.
            if let Some(drag) = &self.drag {
                if drag.page == page && drag.moved {
                    let wrapped_text = match (&drag.target, &drag.raw_text) {
                        (HitTarget::Annotation(a), Some(raw)) if drag.is_resize() => Some(
                            char_wrap(raw, drag.current_rect.width(), a.font_size),
                        ),
                        _ => None,
                    };
                    scene.drag = Some(DragPreview {
                        cover: to_screen(drag.orig_rect, page_x, page_y, zoom).expanded(2.0),
                        rect: to_screen(drag.current_rect, page_x, page_y, zoom),
                        wrapped_text,
                    });
                }
            }

            // Selection adornments.
            match &self.selection {
                Some(Selection::Annotation(a)) if a.page == page => {
                    let sr = to_screen(a.rect, page_x, page_y, zoom);
                    scene.selection = Some(SelectionMarks {
                        rect: sr.expanded(2.0),
                        handles: sr.corners(),
                    });
                }
                Some(Selection::Stamp(id)) => {
                    if let Some(stamp) = self.stamps.get(*id) {
                        if stamp.page == page {
                            let sr = to_screen(stamp.rect(), page_x, page_y, zoom);
                            scene.selection = Some(SelectionMarks {
                                rect: sr.expanded(2.0),
                                handles: sr.corners(),
                            });
                        }
                    }
                }
                _ => {}
            }

            for (i, (pg, rect)) in self.search.iter().enumerate() {
                if *pg == page {
                    scene.search.push(HighlightQuad {
                        rect: to_screen(*rect, page_x, page_y, zoom),
                        current: self.search_current == Some(i),
                    });
                }
            }

            if self.mode == Mode::TextEdit {
                if let Some((hover_page, line)) = &self.hover_line {
                    if *hover_page == page {
                        scene.text_edit_hover =
                            Some(to_screen(line.bbox, page_x, page_y, zoom));
                    }
                }
            }
        }

        if self.mode == Mode::Crop {
            if let Some((start, current)) = self.crop_drag {
                scene.crop_band = Some(ScreenRect::from_points(start, current));
            }
        }

        scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PageImagery;
    use std::sync::Mutex;
    use std::time::Duration;
    use vellum_engine::{RgbColor, TextInsertSpec};

    fn catalog() -> Arc<FontCatalog> {
        let catalog = FontCatalog::new(vec![]);
        catalog.ensure_loaded();
        Arc::new(catalog)
    }

    fn view_with_pages(pages: usize) -> PdfView {
        let mut view = PdfView::with_pipeline(
            catalog(),
            1.0,
            WorkerPoolConfig::new(2).with_poll_interval(Duration::from_millis(1)),
        );
        view.set_viewport_size(800.0, 600.0);
        let doc = Document::create(&vec![(612.0, 792.0); pages]);
        view.set_document(doc, None, false);
        view
    }

    fn pump_until(view: &mut PdfView, mut done: impl FnMut(&PdfView) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            view.pump_renders();
            if done(view) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("background renders did not arrive in time");
    }

    /// Drive ticks with synthetic time until the zoom commits.
    fn commit_zoom(view: &mut PdfView, start: Instant) -> f32 {
        let mut now = start;
        for _ in 0..400 {
            now += Duration::from_millis(16);
            view.tick(now);
            for event in view.take_events() {
                if let ViewerEvent::ZoomChanged(zoom) = event {
                    return zoom;
                }
            }
        }
        panic!("zoom never committed");
    }

    #[test]
    fn scene_starts_with_placeholders_then_gets_renders() {
        let mut view = view_with_pages(3);
        let scene = view.build_scene();
        assert!(!scene.pages.is_empty());
        assert_eq!(scene.pages[0].imagery, PageImagery::Placeholder);

        // Page 0 sits below the top gap, horizontally centered.
        let quad = scene.page(0).unwrap();
        assert_eq!(quad.rect.y, crate::layout::PAGE_GAP);
        assert_eq!(quad.rect.x, (800.0 - 612.0) / 2.0);

        pump_until(&mut view, |v| v.has_final_render(0));
        let scene = view.build_scene();
        assert_eq!(scene.page(0).unwrap().imagery, PageImagery::Exact);
        assert!(scene.page(0).unwrap().image.is_some());
    }

    #[test]
    fn wheel_without_modifier_is_not_handled() {
        let mut view = view_with_pages(1);
        assert!(!view.wheel(WheelDelta::Angle(120.0), false, 300.0, Instant::now()));
        assert_eq!(view.zoom(), 1.0);
    }

    #[test]
    fn five_wheel_ticks_commit_near_1_403() {
        let mut view = view_with_pages(3);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(view.wheel(WheelDelta::Angle(120.0), true, 300.0, now));
        }
        let zoom = commit_zoom(&mut view, now);
        assert!((zoom - 1.403).abs() < 1e-3, "committed {zoom}");
        assert_eq!(view.zoom(), zoom);

        // Layout rescaled and a high-res render for the new key arrives.
        let _ = view.build_scene();
        pump_until(&mut view, |v| v.has_final_render(0));
    }

    #[test]
    fn zoom_commit_invalidates_renders_of_old_zoom() {
        let mut view = view_with_pages(1);
        let _ = view.build_scene();
        pump_until(&mut view, |v| v.has_final_render(0));

        let now = Instant::now();
        view.wheel(WheelDelta::Angle(120.0), true, 300.0, now);
        let _ = commit_zoom(&mut view, now);
        // The old zoom's final render no longer satisfies the new key.
        assert!(!view.has_final_render(0));
        let _ = view.build_scene();
        pump_until(&mut view, |v| v.has_final_render(0));
    }

    #[test]
    fn text_placement_creates_annotation_and_returns_to_normal() {
        let mut view = view_with_pages(1);
        view.enter_text_placement_mode(FreeTextStyle::new("note", "helv", 14.0));
        assert_eq!(view.mode(), Mode::TextPlacement);

        // Click the middle of page 0: x offset 94, y offset 16.
        view.mouse_down(ScreenPoint::new(400.0, 412.0), MouseButton::Left);
        assert_eq!(view.mode(), Mode::Normal);

        let annots = view.document().unwrap().annotations(0).unwrap();
        assert_eq!(annots.len(), 1);
        assert_eq!(annots[0].text, "note");
        let center = annots[0].rect.center();
        assert!((center.x - 306.0).abs() < 1.0);
        assert!((center.y - 396.0).abs() < 1.0);

        let events = view.take_events();
        assert!(events.iter().any(|e| matches!(e, ViewerEvent::DocumentModified)));
        assert!(events.iter().any(|e| matches!(e, ViewerEvent::TextPlaced)));
    }

    #[test]
    fn clicks_outside_the_page_do_not_place_text() {
        let mut view = view_with_pages(1);
        view.enter_text_placement_mode(FreeTextStyle::new("note", "helv", 14.0));
        view.mouse_down(ScreenPoint::new(5.0, 5.0), MouseButton::Left);
        assert_eq!(view.mode(), Mode::TextPlacement);
        assert!(view.document().unwrap().annotations(0).unwrap().is_empty());
    }

    #[test]
    fn drag_moves_annotation_in_document() {
        let mut view = view_with_pages(1);
        view.add_text_at_page_center(0, &FreeTextStyle::new("drag me", "helv", 14.0));
        let before = view.document().unwrap().annotations(0).unwrap()[0].rect;
        view.take_events();

        // Body of the annotation: page center on screen.
        view.mouse_down(ScreenPoint::new(400.0, 412.0), MouseButton::Left);
        view.mouse_move(ScreenPoint::new(430.0, 452.0));
        view.mouse_up(ScreenPoint::new(430.0, 452.0));

        let after = view.document().unwrap().annotations(0).unwrap()[0].rect;
        assert!((after.x0 - (before.x0 + 30.0)).abs() < 0.5);
        assert!((after.y0 - (before.y0 + 40.0)).abs() < 0.5);
        assert!((after.width() - before.width()).abs() < 0.5);
        assert!(view
            .take_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::DocumentModified)));
    }

    #[test]
    fn click_without_movement_mutates_nothing() {
        let mut view = view_with_pages(1);
        view.add_text_at_page_center(0, &FreeTextStyle::new("still", "helv", 14.0));
        let before = view.document().unwrap().annotations(0).unwrap()[0].rect;
        view.take_events();

        view.mouse_down(ScreenPoint::new(400.0, 412.0), MouseButton::Left);
        view.mouse_up(ScreenPoint::new(400.0, 412.0));

        let after = view.document().unwrap().annotations(0).unwrap()[0].rect;
        assert_eq!(after, before);
        assert!(view.take_events().is_empty());
    }

    #[test]
    fn resize_recreates_annotation_with_rewrapped_text() {
        let mut view = view_with_pages(1);
        view.add_text_at_page_center(
            0,
            &FreeTextStyle::new("abcdefghijklmnopqrstuvwxyz", "helv", 14.0),
        );
        let original = view.document().unwrap().annotations(0).unwrap()[0].clone();
        assert!(!original.text.contains('\n'));

        // Grab the bottom-right handle and drag it sharply left to
        // narrow the box.
        let br = ScreenPoint::new(
            94.0 + original.rect.x1,
            crate::layout::PAGE_GAP + original.rect.y1,
        );
        view.mouse_down(br, MouseButton::Left);
        view.mouse_move(ScreenPoint::new(br.x - 140.0, br.y + 5.0));
        view.mouse_up(ScreenPoint::new(br.x - 140.0, br.y + 5.0));

        let annots = view.document().unwrap().annotations(0).unwrap();
        assert_eq!(annots.len(), 1);
        assert_ne!(annots[0].id, original.id);
        assert!(annots[0].text.contains('\n'));
        assert_eq!(annots[0].text.replace('\n', ""), original.text);
    }

    #[test]
    fn stamp_resize_keeps_aspect_ratio_through_the_view() {
        let mut view = view_with_pages(1);
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("logo.png");
        image::RgbaImage::from_pixel(200, 100, image::Rgba([5, 5, 5, 255]))
            .save(&img_path)
            .unwrap();

        let id = view.place_stamp_on_page(0, &img_path, None).unwrap();
        let before = view.overlay_stamps().get(id).unwrap().rect();
        let aspect = before.width() / before.height();
        assert!((aspect - 2.0).abs() < 0.01);

        let br = ScreenPoint::new(
            94.0 + before.x1,
            crate::layout::PAGE_GAP + before.y1,
        );
        view.mouse_down(br, MouseButton::Left);
        view.mouse_move(ScreenPoint::new(br.x + 40.0, br.y + 10.0));
        view.mouse_up(ScreenPoint::new(br.x + 40.0, br.y + 10.0));

        let after = view.overlay_stamps().get(id).unwrap().rect();
        let ratio = after.width() / after.height();
        assert!((ratio - 2.0).abs() < 0.01, "ratio {ratio}");
        assert!(after.width() > before.width());
    }

    #[test]
    fn crop_mode_fires_callback_with_document_rect() {
        let mut view = view_with_pages(1);
        let captured: Arc<Mutex<Option<(u16, PdfRect)>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        view.enter_crop_mode(Box::new(move |page, rect| {
            *sink.lock().unwrap() = Some((page, rect));
        }));

        view.mouse_down(ScreenPoint::new(194.0, 116.0), MouseButton::Left);
        view.mouse_move(ScreenPoint::new(294.0, 216.0));
        view.mouse_up(ScreenPoint::new(294.0, 216.0));

        assert_eq!(view.mode(), Mode::Normal);
        let (page, rect) = captured.lock().unwrap().take().expect("crop fired");
        assert_eq!(page, 0);
        // Screen (194,116)..(294,216) minus page origin (94,16).
        assert!((rect.x0 - 100.0).abs() < 0.5);
        assert!((rect.y0 - 100.0).abs() < 0.5);
        assert!((rect.x1 - 200.0).abs() < 0.5);
        assert!((rect.y1 - 200.0).abs() < 0.5);
    }

    #[test]
    fn tiny_crop_drags_are_discarded() {
        let mut view = view_with_pages(1);
        let captured: Arc<Mutex<Option<(u16, PdfRect)>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        view.enter_crop_mode(Box::new(move |page, rect| {
            *sink.lock().unwrap() = Some((page, rect));
        }));

        view.mouse_down(ScreenPoint::new(200.0, 120.0), MouseButton::Left);
        view.mouse_up(ScreenPoint::new(205.0, 126.0));

        assert_eq!(view.mode(), Mode::Normal);
        assert!(captured.lock().unwrap().is_none());
    }

    fn seed_native_text(view: &mut PdfView) {
        // Rebuild the document with a native text run and reinstall it.
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
        view.set_document(doc, None, false);
    }

    #[test]
    fn entering_crop_commits_pending_text_edit() {
        let mut view = view_with_pages(1);
        seed_native_text(&mut view);
        view.enter_text_edit_mode();

        // Click on the seeded line: doc (80, 95) → screen (+94, +16).
        view.mouse_down(ScreenPoint::new(174.0, 111.0), MouseButton::Left);
        assert!(view.text_edit_session().is_some());
        view.set_text_edit_text("edited line");

        view.enter_crop_mode(Box::new(|_, _| {}));
        assert_eq!(view.mode(), Mode::Crop);
        assert!(view.text_edit_session().is_none());

        // The document now carries the replacement run on top of the
        // covered original.
        let layout = view.document().unwrap().char_layout(0).unwrap();
        assert_eq!(layout.len(), 2);
        assert!(view
            .take_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::DocumentModified)));
    }

    #[test]
    fn text_edit_hover_reports_ibeam_over_lines() {
        let mut view = view_with_pages(1);
        seed_native_text(&mut view);
        view.enter_text_edit_mode();

        let over = view.mouse_move(ScreenPoint::new(174.0, 111.0));
        assert_eq!(over, CursorHint::IBeam);
        let scene = view.build_scene();
        assert!(scene.text_edit_hover.is_some());

        let away = view.mouse_move(ScreenPoint::new(500.0, 500.0));
        assert_eq!(away, CursorHint::Arrow);
    }

    #[test]
    fn burn_stamps_writes_into_document_and_clears_overlays() {
        let mut view = view_with_pages(1);
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("seal.png");
        image::RgbaImage::from_pixel(20, 20, image::Rgba([200, 10, 10, 255]))
            .save(&img_path)
            .unwrap();

        view.place_stamp_on_page(0, &img_path, None).unwrap();
        assert_eq!(view.overlay_stamps().len(), 1);
        view.burn_overlay_stamps();
        assert!(view.overlay_stamps().is_empty());

        // Burned pixels land on the page raster.
        let img = view.document().unwrap().render_page(0, 1.0, None).unwrap();
        assert_eq!(img.get_pixel(306, 396).0, [200, 10, 10, 255]);
    }

    #[test]
    fn scroll_tracks_current_page_and_prerenders() {
        let mut view = view_with_pages(20);
        view.take_events();
        view.scroll_to_page(5);
        let events = view.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, ViewerEvent::PageChanged(5))));
        assert_eq!(view.visible_page(), 5);

        // Pre-rendering kicked off around page 5.
        pump_until(&mut view, |v| v.has_final_render(5));
        pump_until(&mut view, |v| v.has_final_render(6));
    }

    #[test]
    fn selection_appears_in_scene_with_four_handles() {
        let mut view = view_with_pages(1);
        view.add_text_at_page_center(0, &FreeTextStyle::new("sel", "helv", 14.0));
        view.mouse_down(ScreenPoint::new(400.0, 412.0), MouseButton::Left);
        view.mouse_up(ScreenPoint::new(400.0, 412.0));

        let scene = view.build_scene();
        let marks = scene.selection.expect("selection marks");
        assert_eq!(marks.handles.len(), 4);
        assert!(marks.rect.width > 0.0);
    }

    #[test]
    fn double_click_requests_annotation_edit() {
        let mut view = view_with_pages(1);
        view.add_text_at_page_center(0, &FreeTextStyle::new("edit me", "helv", 14.0));
        view.take_events();
        view.double_click(ScreenPoint::new(400.0, 412.0));
        let events = view.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            ViewerEvent::AnnotationEditRequested { page: 0, .. }
        )));
    }

    #[test]
    fn update_free_text_returns_fresh_reference() {
        let mut view = view_with_pages(1);
        view.add_text_at_page_center(0, &FreeTextStyle::new("before", "helv", 14.0));
        let original = view.document().unwrap().annotations(0).unwrap()[0].clone();

        let updated = view
            .update_free_text(&original, &FreeTextStyle::new("after", "helv", 14.0))
            .expect("update succeeds");
        assert_ne!(updated.id, original.id);
        assert_eq!(updated.text, "after");
        assert_eq!(view.annotation_raw_text(&updated), "after");
    }

    #[test]
    fn search_highlights_reach_the_scene() {
        let mut view = view_with_pages(1);
        view.set_search_highlights(
            vec![
                (0, PdfRect::new(10.0, 10.0, 60.0, 20.0)),
                (0, PdfRect::new(10.0, 40.0, 60.0, 50.0)),
            ],
            Some(1),
        );
        let scene = view.build_scene();
        assert_eq!(scene.search.len(), 2);
        assert!(!scene.search[0].current);
        assert!(scene.search[1].current);

        view.clear_search();
        assert!(view.build_scene().search.is_empty());
    }
}
