//! Read-only render handle
//!
//! Background rasterization must never touch the live [`crate::Document`];
//! each render task opens its own [`RenderDocument`] from either the file
//! path or an immutable byte snapshot. The handle is deliberately not
//! `Send`: it is opened, used and dropped on the worker thread that
//! created it, while [`RenderSource`] (plain data) is what crosses
//! threads.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use lopdf::ObjectId;

use crate::{raster, EngineError, EngineResult, PageSize, PdfRect, RgbaImage};

/// What a render task opens its document from.
///
/// Copied into the task at scheduling time; cheap to clone (the snapshot
/// bytes are shared).
#[derive(Debug, Clone)]
pub enum RenderSource {
    /// The unmodified file on disk.
    Path(PathBuf),
    /// Serialized bytes of a modified document.
    Snapshot(Arc<Vec<u8>>),
}

/// Read-only, thread-affine document handle for rasterization.
pub struct RenderDocument {
    inner: lopdf::Document,
    pages: Vec<ObjectId>,
    sizes: Vec<PageSize>,
    /// Keeps the handle on the thread that opened it.
    _not_send: PhantomData<*const ()>,
}

impl RenderDocument {
    /// Open a render handle from a task's source.
    pub fn open(source: &RenderSource) -> EngineResult<Self> {
        let inner = match source {
            RenderSource::Path(path) => lopdf::Document::load(path)?,
            RenderSource::Snapshot(bytes) => lopdf::Document::load_mem(bytes)?,
        };
        let mut pages = Vec::new();
        let mut sizes = Vec::new();
        for (_, page_id) in inner.get_pages() {
            pages.push(page_id);
            sizes.push(raster::media_box(&inner, page_id));
        }
        Ok(Self { inner, pages, sizes, _not_send: PhantomData })
    }

    pub fn page_count(&self) -> u16 {
        self.pages.len() as u16
    }

    pub fn page_size(&self, page: u16) -> EngineResult<PageSize> {
        self.sizes
            .get(page as usize)
            .copied()
            .ok_or(EngineError::PageOutOfRange { page, page_count: self.page_count() })
    }

    /// Rasterize a page region at the given scale.
    pub fn render_page(
        &self,
        page: u16,
        scale: f32,
        clip: Option<PdfRect>,
    ) -> EngineResult<RgbaImage> {
        let page_id = *self
            .pages
            .get(page as usize)
            .ok_or(EngineError::PageOutOfRange { page, page_count: self.page_count() })?;
        raster::rasterize(&self.inner, page_id, self.sizes[page as usize], scale, clip)
    }
}
