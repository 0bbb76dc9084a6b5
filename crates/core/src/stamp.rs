//! Overlay image stamps
//!
//! A stamp is an image placed over a page that is *not* written into the
//! document's annotation model until burn-in. Until then it exists only
//! in this store: it can be moved, resized and deleted freely with no
//! document mutation. Burn-in draws every stamp into its page and clears
//! the store, irreversibly (undo is out of scope).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vellum_engine::{Document, EngineError, PdfPoint, PdfRect};

/// Stable identifier for an overlay stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampId(Uuid);

impl StampId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// An image stamp placed on a page, in document-space coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayStamp {
    pub id: StampId,
    pub page: u16,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub path: PathBuf,
    #[serde(default)]
    pub selected: bool,
}

impl OverlayStamp {
    pub fn rect(&self) -> PdfRect {
        PdfRect::new(self.x0, self.y0, self.x1, self.y1)
    }

    pub fn set_rect(&mut self, rect: PdfRect) {
        self.x0 = rect.x0;
        self.y0 = rect.y0;
        self.x1 = rect.x1;
        self.y1 = rect.y1;
    }

    pub fn aspect_ratio(&self) -> f32 {
        let h = self.y1 - self.y0;
        if h <= 0.0 {
            1.0
        } else {
            (self.x1 - self.x0) / h
        }
    }
}

/// Default stamp width as a fraction of the page width.
const DEFAULT_WIDTH_FRACTION: f32 = 0.15;

/// In-memory list of overlay stamps, in placement (z) order.
#[derive(Debug, Default)]
pub struct StampStore {
    stamps: Vec<OverlayStamp>,
}

impl StampStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a stamp centered at `at` (or the page center), sized to 15%
    /// of the page width with the source image's aspect ratio.
    pub fn place(
        &mut self,
        doc: &Document,
        page: u16,
        image_path: &Path,
        at: Option<PdfPoint>,
    ) -> Result<StampId, EngineError> {
        let size = doc.page_size(page)?;
        let center = at.unwrap_or(PdfPoint::new(size.width / 2.0, size.height / 2.0));

        let aspect = match image::image_dimensions(image_path) {
            Ok((w, h)) if h > 0 => w as f32 / h as f32,
            Ok(_) => 1.0,
            Err(err) => {
                tracing::warn!(path = %image_path.display(), %err, "could not probe stamp image");
                1.0
            }
        };

        let width = size.width * DEFAULT_WIDTH_FRACTION;
        let height = width / aspect;
        let stamp = OverlayStamp {
            id: StampId::new(),
            page,
            x0: center.x - width / 2.0,
            y0: center.y - height / 2.0,
            x1: center.x + width / 2.0,
            y1: center.y + height / 2.0,
            path: image_path.to_path_buf(),
            selected: false,
        };
        let id = stamp.id;
        self.stamps.push(stamp);
        Ok(id)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &OverlayStamp> {
        self.stamps.iter()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn get(&self, id: StampId) -> Option<&OverlayStamp> {
        self.stamps.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: StampId) -> Option<&mut OverlayStamp> {
        self.stamps.iter_mut().find(|s| s.id == id)
    }

    /// Select one stamp exclusively, or clear the selection with `None`.
    pub fn select(&mut self, id: Option<StampId>) {
        for stamp in &mut self.stamps {
            stamp.selected = Some(stamp.id) == id;
        }
    }

    pub fn selected(&self) -> Option<&OverlayStamp> {
        self.stamps.iter().find(|s| s.selected)
    }

    pub fn remove(&mut self, id: StampId) -> bool {
        let before = self.stamps.len();
        self.stamps.retain(|s| s.id != id);
        self.stamps.len() != before
    }

    /// Write every stamp into its page and clear the store.
    ///
    /// A stamp whose image fails to load is skipped (logged), matching
    /// the per-item swallow policy for burn-in. Returns the pages that
    /// were actually drawn into, so the caller can invalidate them.
    pub fn burn_into(&mut self, doc: &mut Document) -> Vec<u16> {
        let mut touched = Vec::new();
        for stamp in self.stamps.drain(..) {
            let image = match image::open(&stamp.path) {
                Ok(img) => img.to_rgba8(),
                Err(err) => {
                    tracing::warn!(path = %stamp.path.display(), %err, "skipping unreadable stamp");
                    continue;
                }
            };
            match doc.insert_image(stamp.page, stamp.rect(), &image) {
                Ok(()) => {
                    if !touched.contains(&stamp.page) {
                        touched.push(stamp.page);
                    }
                }
                Err(err) => {
                    tracing::warn!(page = stamp.page, %err, "stamp burn-in failed");
                }
            }
        }
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::create(&[(600.0, 800.0)])
    }

    fn png_fixture(dir: &Path, w: u32, h: u32) -> PathBuf {
        let path = dir.join("stamp.png");
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 200, 30, 255]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn place_sizes_stamp_from_page_and_image_aspect() {
        let dir = tempfile::tempdir().unwrap();
        let path = png_fixture(dir.path(), 200, 100);
        let doc = doc();
        let mut store = StampStore::new();

        let id = store.place(&doc, 0, &path, None).unwrap();
        let stamp = store.get(id).unwrap();
        let rect = stamp.rect();
        // 15% of 600 = 90 wide; aspect 2:1 → 45 tall; page-centered.
        assert!((rect.width() - 90.0).abs() < 0.1);
        assert!((rect.height() - 45.0).abs() < 0.1);
        assert!((rect.center().x - 300.0).abs() < 0.1);
        assert!((rect.center().y - 400.0).abs() < 0.1);
    }

    #[test]
    fn place_at_point_centers_there() {
        let dir = tempfile::tempdir().unwrap();
        let path = png_fixture(dir.path(), 100, 100);
        let doc = doc();
        let mut store = StampStore::new();
        let id = store
            .place(&doc, 0, &path, Some(PdfPoint::new(100.0, 150.0)))
            .unwrap();
        let rect = store.get(id).unwrap().rect();
        assert!((rect.center().x - 100.0).abs() < 0.1);
        assert!((rect.center().y - 150.0).abs() < 0.1);
    }

    #[test]
    fn unreadable_image_falls_back_to_square() {
        let doc = doc();
        let mut store = StampStore::new();
        let id = store
            .place(&doc, 0, Path::new("/nonexistent/image.png"), None)
            .unwrap();
        let rect = store.get(id).unwrap().rect();
        assert!((rect.width() - rect.height()).abs() < 0.1);
    }

    #[test]
    fn selection_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = png_fixture(dir.path(), 50, 50);
        let doc = doc();
        let mut store = StampStore::new();
        let a = store.place(&doc, 0, &path, None).unwrap();
        let b = store.place(&doc, 0, &path, None).unwrap();

        store.select(Some(a));
        assert_eq!(store.selected().unwrap().id, a);
        store.select(Some(b));
        assert_eq!(store.selected().unwrap().id, b);
        assert!(!store.get(a).unwrap().selected);
        store.select(None);
        assert!(store.selected().is_none());
    }

    #[test]
    fn burn_writes_images_and_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = png_fixture(dir.path(), 40, 40);
        let mut doc = doc();
        let mut store = StampStore::new();
        store
            .place(&doc, 0, &path, Some(PdfPoint::new(300.0, 400.0)))
            .unwrap();

        let touched = store.burn_into(&mut doc);
        assert_eq!(touched, vec![0]);
        assert!(store.is_empty());

        // The stamp's pixels are now part of the page raster.
        let img = doc.render_page(0, 1.0, None).unwrap();
        assert_eq!(img.get_pixel(300, 400).0, [10, 200, 30, 255]);
    }

    #[test]
    fn burn_skips_missing_images() {
        let mut doc = doc();
        let mut store = StampStore::new();
        store
            .place(&doc, 0, Path::new("/nonexistent/image.png"), None)
            .unwrap();
        let touched = store.burn_into(&mut doc);
        assert!(touched.is_empty());
        assert!(store.is_empty());
    }
}
