//! Live document handle
//!
//! [`Document`] owns the parsed PDF and is the only handle that mutates
//! it. It is intended to live on the UI thread; background rendering
//! works from a serialized snapshot via [`crate::RenderDocument`], never
//! from this type.

use std::fmt;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};

use crate::raster::{self, PageItem};
use crate::text::{CharBox, RawLine, RawSpan};
use crate::{metrics, EngineError, EngineResult, PageSize, PdfPoint, PdfRect, RgbColor, RgbaImage};

/// Identity of an annotation: the object id of its dictionary.
///
/// Stable for the lifetime of the annotation, but *not* across
/// delete-and-recreate mutations: callers must adopt the id returned by
/// the mutation that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnnotationId(pub(crate) ObjectId);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0 .0, self.0 .1)
    }
}

/// A FreeText annotation as read from the document.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRef {
    pub id: AnnotationId,
    pub page: u16,
    pub rect: PdfRect,
    pub text: String,
    pub font_name: String,
    pub font_size: f32,
    pub color: RgbColor,
}

/// Creation parameters for a FreeText annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeTextSpec {
    pub text: String,
    pub font_name: String,
    pub font_size: f32,
    pub color: RgbColor,
}

/// Parameters for inserting a run of page text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextInsertSpec {
    pub font_name: String,
    /// Raw font program bytes; embedded as a `/FontFile2` stream when set.
    pub font_file: Option<Vec<u8>>,
    pub font_size: f32,
    pub color: RgbColor,
}

/// Live, mutable PDF document handle.
pub struct Document {
    inner: lopdf::Document,
    pages: Vec<ObjectId>,
    sizes: Vec<PageSize>,
}

impl Document {
    /// Build a document from scratch with the given page sizes in points.
    pub fn create(page_sizes: &[(f32, f32)]) -> Self {
        let mut inner = lopdf::Document::with_version("1.5");
        let pages_id = inner.new_object_id();

        let mut kids: Vec<Object> = Vec::with_capacity(page_sizes.len());
        let mut pages = Vec::with_capacity(page_sizes.len());
        let mut sizes = Vec::with_capacity(page_sizes.len());

        for &(w, h) in page_sizes {
            let page_id = inner.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => Object::Array(vec![
                    0.into(), 0.into(), Object::Real(w), Object::Real(h),
                ]),
            });
            kids.push(Object::Reference(page_id));
            pages.push(page_id);
            sizes.push(PageSize { width: w, height: h });
        }

        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(kids),
            "Count" => Object::Integer(page_sizes.len() as i64),
        };
        inner
            .objects
            .insert(pages_id, Object::Dictionary(pages_dict));

        let catalog_id = inner.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        inner.trailer.set("Root", Object::Reference(catalog_id));

        Self { inner, pages, sizes }
    }

    /// Load a document from a file path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        Self::from_inner(lopdf::Document::load(path)?)
    }

    /// Load a document from raw PDF bytes.
    pub fn open_bytes(bytes: &[u8]) -> EngineResult<Self> {
        Self::from_inner(lopdf::Document::load_mem(bytes)?)
    }

    fn from_inner(inner: lopdf::Document) -> EngineResult<Self> {
        let mut pages = Vec::new();
        let mut sizes = Vec::new();
        for (_, page_id) in inner.get_pages() {
            pages.push(page_id);
            sizes.push(raster::media_box(&inner, page_id));
        }
        Ok(Self { inner, pages, sizes })
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

    pub fn page_sizes(&self) -> &[PageSize] {
        &self.sizes
    }

    fn page_id(&self, page: u16) -> EngineResult<ObjectId> {
        self.pages
            .get(page as usize)
            .copied()
            .ok_or(EngineError::PageOutOfRange { page, page_count: self.page_count() })
    }

    // ── Annotations ───────────────────────────────────────────────────

    /// List the FreeText annotations of a page, in /Annots order.
    pub fn annotations(&self, page: u16) -> EngineResult<Vec<AnnotationRef>> {
        let page_id = self.page_id(page)?;
        let height = self.sizes[page as usize].height;

        let mut out = Vec::new();
        for annot_id in self.annot_ids(page_id) {
            let Ok(dict) = self.inner.get_dictionary(annot_id) else {
                continue;
            };
            if !matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"FreeText") {
                continue;
            }
            let Some(rect) = dict
                .get(b"Rect")
                .ok()
                .and_then(|obj| raster::rect_from_pdf(obj, height))
            else {
                continue;
            };
            let text = dict
                .get(b"Contents")
                .ok()
                .and_then(decode_string)
                .unwrap_or_default();
            let da = dict.get(b"DA").ok().and_then(decode_string).unwrap_or_default();
            let (font_name, font_size, color) = parse_da(&da);

            out.push(AnnotationRef {
                id: AnnotationId(annot_id),
                page,
                rect,
                text,
                font_name,
                font_size,
                color,
            });
        }
        Ok(out)
    }

    /// Create a FreeText annotation and return its reference.
    pub fn add_free_text(
        &mut self,
        page: u16,
        rect: PdfRect,
        spec: &FreeTextSpec,
    ) -> EngineResult<AnnotationRef> {
        let page_id = self.page_id(page)?;
        let height = self.sizes[page as usize].height;

        let da = format!(
            "{} {} {} rg /{} {} Tf",
            spec.color.r, spec.color.g, spec.color.b, spec.font_name, spec.font_size
        );
        let annot_id = self.inner.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "FreeText",
            "Rect" => raster::rect_to_pdf(rect, height),
            "Contents" => Object::string_literal(spec.text.as_str()),
            "DA" => Object::string_literal(da),
        });

        // Append to the page's /Annots array, creating it if needed.
        let page_dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
        match page_dict.get_mut(b"Annots") {
            Ok(Object::Array(arr)) => arr.push(Object::Reference(annot_id)),
            _ => page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)])),
        }

        Ok(AnnotationRef {
            id: AnnotationId(annot_id),
            page,
            rect,
            text: spec.text.clone(),
            font_name: spec.font_name.clone(),
            font_size: spec.font_size,
            color: spec.color,
        })
    }

    /// Move or resize an annotation.
    pub fn set_annotation_rect(
        &mut self,
        page: u16,
        id: AnnotationId,
        rect: PdfRect,
    ) -> EngineResult<()> {
        let height = self.page_size(page)?.height;
        if !self.annot_ids(self.page_id(page)?).contains(&id.0) {
            return Err(EngineError::AnnotationNotFound(id));
        }
        let dict = self.inner.get_object_mut(id.0)?.as_dict_mut()?;
        dict.set("Rect", raster::rect_to_pdf(rect, height));
        Ok(())
    }

    /// Delete an annotation from a page.
    pub fn delete_annotation(&mut self, page: u16, id: AnnotationId) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        if !self.annot_ids(page_id).contains(&id.0) {
            return Err(EngineError::AnnotationNotFound(id));
        }
        let page_dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
        if let Ok(Object::Array(arr)) = page_dict.get_mut(b"Annots") {
            arr.retain(|obj| !matches!(obj, Object::Reference(r) if *r == id.0));
        }
        self.inner.objects.remove(&id.0);
        Ok(())
    }

    fn annot_ids(&self, page_id: ObjectId) -> Vec<ObjectId> {
        raster::annot_dicts(&self.inner, page_id)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    // ── Content overlays ──────────────────────────────────────────────

    /// Paint a filled rectangle over existing page content.
    ///
    /// Appends draw operators only; coordinates of other content-stream
    /// elements are left untouched.
    pub fn draw_rect(&mut self, page: u16, rect: PdfRect, fill: RgbColor) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let height = self.sizes[page as usize].height;
        let ops = vec![
            Operation::new("rg", vec![fill.r.into(), fill.g.into(), fill.b.into()]),
            Operation::new(
                "re",
                vec![
                    rect.x0.into(),
                    (height - rect.y1).into(),
                    rect.width().into(),
                    rect.height().into(),
                ],
            ),
            Operation::new("f", vec![]),
        ];
        self.append_ops(page_id, ops)
    }

    /// Insert a run of text with its baseline starting at `origin`.
    pub fn insert_text(
        &mut self,
        page: u16,
        origin: PdfPoint,
        text: &str,
        spec: &TextInsertSpec,
    ) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let height = self.sizes[page as usize].height;

        let res_name = self.register_font(page_id, &spec.font_name, spec.font_file.as_deref())?;
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(res_name.into_bytes()), spec.font_size.into()],
            ),
            Operation::new(
                "rg",
                vec![spec.color.r.into(), spec.color.g.into(), spec.color.b.into()],
            ),
            Operation::new("Td", vec![origin.x.into(), (height - origin.y).into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ];
        self.append_ops(page_id, ops)
    }

    /// Draw an image into the page (used by stamp burn-in).
    pub fn insert_image(&mut self, page: u16, rect: PdfRect, image: &RgbaImage) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let height = self.sizes[page as usize].height;

        let res_name = self.register_image(page_id, image)?;
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    rect.width().into(),
                    0.into(),
                    0.into(),
                    rect.height().into(),
                    rect.x0.into(),
                    (height - rect.y1).into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(res_name.into_bytes())]),
            Operation::new("Q", vec![]),
        ];
        self.append_ops(page_id, ops)
    }

    fn append_ops(&mut self, page_id: ObjectId, ops: Vec<Operation>) -> EngineResult<()> {
        let existing = self.inner.get_page_content(page_id).unwrap_or_default();
        let mut content = if existing.is_empty() {
            Content { operations: Vec::new() }
        } else {
            Content::decode(&existing)
                .map_err(|e| EngineError::MalformedContent(e.to_string()))?
        };
        content.operations.extend(ops);
        let encoded = content
            .encode()
            .map_err(|e| EngineError::MalformedContent(e.to_string()))?;

        let stream_id = self
            .inner
            .add_object(Stream::new(dictionary! {}, encoded));
        let page_dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
        page_dict.set("Contents", Object::Reference(stream_id));
        Ok(())
    }

    /// Register a font resource on a page, embedding the font program
    /// when raw bytes are supplied. Returns the resource name.
    fn register_font(
        &mut self,
        page_id: ObjectId,
        base_font: &str,
        font_file: Option<&[u8]>,
    ) -> EngineResult<String> {
        let mut font_dict = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
        };
        if let Some(bytes) = font_file {
            let file_id = self.inner.add_object(Stream::new(
                dictionary! { "Length1" => Object::Integer(bytes.len() as i64) },
                bytes.to_vec(),
            ));
            let desc_id = self.inner.add_object(dictionary! {
                "Type" => "FontDescriptor",
                "FontName" => Object::Name(base_font.as_bytes().to_vec()),
                "FontFile2" => Object::Reference(file_id),
            });
            font_dict.set("FontDescriptor", Object::Reference(desc_id));
        }
        let font_id = self.inner.add_object(font_dict);

        let mut resources = self.page_resources(page_id);
        let mut fonts = match resources.get(b"Font") {
            Ok(Object::Dictionary(d)) => d.clone(),
            _ => Dictionary::new(),
        };
        let res_name = format!("VF{}", fonts.len() + 1);
        fonts.set(res_name.clone(), Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        let page_dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
        page_dict.set("Resources", Object::Dictionary(resources));
        Ok(res_name)
    }

    fn register_image(&mut self, page_id: ObjectId, image: &RgbaImage) -> EngineResult<String> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write as _;

        let mut rgb = Vec::with_capacity((image.width() * image.height() * 3) as usize);
        for px in image.pixels() {
            rgb.extend_from_slice(&px.0[..3]);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&rgb)?;
        let compressed = encoder.finish()?;

        let xobj_id = self.inner.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(image.width() as i64),
                "Height" => Object::Integer(image.height() as i64),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "FlateDecode",
            },
            compressed,
        ));

        let mut resources = self.page_resources(page_id);
        let mut xobjects = match resources.get(b"XObject") {
            Ok(Object::Dictionary(d)) => d.clone(),
            _ => Dictionary::new(),
        };
        let res_name = format!("VI{}", xobjects.len() + 1);
        xobjects.set(res_name.clone(), Object::Reference(xobj_id));
        resources.set("XObject", Object::Dictionary(xobjects));

        let page_dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
        page_dict.set("Resources", Object::Dictionary(resources));
        Ok(res_name)
    }

    /// Owned copy of the page's /Resources dictionary (resolving an
    /// indirect reference), or an empty one.
    fn page_resources(&self, page_id: ObjectId) -> Dictionary {
        let Ok(dict) = self.inner.get_dictionary(page_id) else {
            return Dictionary::new();
        };
        match dict.get(b"Resources") {
            Ok(Object::Dictionary(d)) => d.clone(),
            Ok(Object::Reference(r)) => match self.inner.get_object(*r) {
                Ok(Object::Dictionary(d)) => d.clone(),
                _ => Dictionary::new(),
            },
            _ => Dictionary::new(),
        }
    }

    // ── Text extraction ───────────────────────────────────────────────

    /// Extract the page's text as lines of per-character boxes, in
    /// content-stream drawing order.
    ///
    /// Each text run is reported as its own line even when baselines
    /// coincide: a later run overlapping an earlier one is how a prior
    /// edit's replacement text coexists with the glyphs it covers, and
    /// consumers rely on the drawing order to pick the topmost.
    pub fn char_layout(&self, page: u16) -> EngineResult<Vec<RawLine>> {
        let page_id = self.page_id(page)?;
        let size = self.sizes[page as usize];
        let items = raster::collect_page_items(&self.inner, page_id, size)?;

        let mut lines: Vec<RawLine> = Vec::new();
        for item in items {
            let PageItem::Text(run) = item else { continue };
            let baseline = run.origin_doc.y;
            let mut chars = Vec::with_capacity(run.text.chars().count());
            let mut x = run.origin_doc.x;
            for ch in run.text.chars() {
                let advance = metrics::glyph_advance(ch, run.font_size);
                chars.push(CharBox {
                    ch,
                    bbox: PdfRect::new(
                        x,
                        baseline - 0.8 * run.font_size,
                        x + advance,
                        baseline + 0.2 * run.font_size,
                    ),
                });
                x += advance;
            }
            let span = RawSpan {
                chars,
                font_name: run.font_name,
                font_size: run.font_size,
                color: run.color,
                origin: run.origin_doc,
            };
            if let Some(line) = RawLine::from_spans(vec![span]) {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// Extract the raw bytes of an embedded font program by base name.
    ///
    /// Walks every page's /Resources/Font entries to the descriptor's
    /// FontFile stream. Returns `None` when the font is not embedded.
    pub fn extract_font(&self, font_name: &str) -> Option<Vec<u8>> {
        for &page_id in &self.pages {
            let resources = self.page_resources(page_id);
            let Ok(Object::Dictionary(fonts)) = resources.get(b"Font") else {
                continue;
            };
            for (_, value) in fonts.iter() {
                let font_dict = match value {
                    Object::Reference(r) => match self.inner.get_dictionary(*r) {
                        Ok(dict) => dict,
                        Err(_) => continue,
                    },
                    Object::Dictionary(d) => d,
                    _ => continue,
                };
                let base = font_dict
                    .get(b"BaseFont")
                    .ok()
                    .and_then(|obj| match obj {
                        Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
                        _ => None,
                    })
                    .unwrap_or_default();
                if base != font_name {
                    continue;
                }
                let Ok(Object::Reference(desc_ref)) = font_dict.get(b"FontDescriptor") else {
                    continue;
                };
                let Ok(desc) = self.inner.get_dictionary(*desc_ref) else {
                    continue;
                };
                for key in [b"FontFile2".as_slice(), b"FontFile3".as_slice(), b"FontFile".as_slice()]
                {
                    if let Ok(Object::Reference(file_ref)) = desc.get(key) {
                        if let Ok(Object::Stream(stream)) = self.inner.get_object(*file_ref) {
                            return Some(
                                stream
                                    .decompressed_content()
                                    .unwrap_or_else(|_| stream.content.clone()),
                            );
                        }
                    }
                }
            }
        }
        None
    }

    // ── Rendering & snapshots ─────────────────────────────────────────

    /// Rasterize a page region at the given scale.
    pub fn render_page(
        &self,
        page: u16,
        scale: f32,
        clip: Option<PdfRect>,
    ) -> EngineResult<RgbaImage> {
        let page_id = self.page_id(page)?;
        let size = self.sizes[page as usize];
        raster::rasterize(&self.inner, page_id, size, scale, clip)
    }

    /// Serialize the document to bytes (the snapshot format consumed by
    /// [`crate::RenderDocument`]).
    pub fn serialize(&mut self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner.save_to(&mut buf)?;
        Ok(buf)
    }

    /// Save to a file path.
    pub fn save_path<P: AsRef<Path>>(&mut self, path: P) -> EngineResult<()> {
        self.inner.save(path)?;
        Ok(())
    }
}

/// Decode a PDF string object to UTF-8, lossily.
fn decode_string(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Parse a FreeText /DA appearance string: `r g b rg /Name size Tf`.
///
/// Missing pieces fall back to black 14 pt Helv, matching what this
/// engine writes.
pub(crate) fn parse_da(da: &str) -> (String, f32, RgbColor) {
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let mut font_name = String::from("Helv");
    let mut font_size = 14.0_f32;
    let mut color = RgbColor::BLACK;

    for (i, tok) in tokens.iter().enumerate() {
        match *tok {
            "rg" if i >= 3 => {
                let parse = |s: &str| s.parse::<f32>().ok();
                if let (Some(r), Some(g), Some(b)) = (
                    parse(tokens[i - 3]),
                    parse(tokens[i - 2]),
                    parse(tokens[i - 1]),
                ) {
                    color = RgbColor::new(r, g, b);
                }
            }
            "Tf" if i >= 2 => {
                if let Some(name) = tokens[i - 2].strip_prefix('/') {
                    font_name = name.to_string();
                }
                if let Ok(size) = tokens[i - 1].parse::<f32>() {
                    font_size = size;
                }
            }
            _ => {}
        }
    }
    (font_name, font_size, color)
}
