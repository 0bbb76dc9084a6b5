//! Content-stream interpretation and software rasterization
//!
//! Walks the operator subset this engine writes (`rg`/`re`/`f` fills,
//! `BT..ET` text runs, `q/cm/Do/Q` images) and either collects typed
//! page items (for layout extraction) or replays them onto an RGBA
//! buffer. Text is greeked (glyph-advance boxes in the run color),
//! which is deterministic and sufficient for previews, cover-and-redraw
//! and background sampling.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Object, ObjectId};

use crate::document::parse_da;
use crate::{metrics, EngineError, EngineResult, PageSize, PdfPoint, PdfRect, RgbColor, RgbaImage};

/// A text run as found in the content stream.
#[derive(Debug, Clone)]
pub(crate) struct TextRun {
    pub origin_doc: PdfPoint,
    pub text: String,
    pub font_name: String,
    pub font_size: f32,
    pub color: RgbColor,
}

/// One drawable element, in drawing order.
#[derive(Debug, Clone)]
pub(crate) enum PageItem {
    Fill { rect: PdfRect, color: RgbColor },
    Text(TextRun),
    Image { rect: PdfRect, res_name: String },
}

/// Read a page's /MediaBox, defaulting to US Letter.
pub(crate) fn media_box(doc: &lopdf::Document, page_id: ObjectId) -> PageSize {
    let fallback = PageSize { width: 612.0, height: 792.0 };
    let Ok(dict) = doc.get_dictionary(page_id) else {
        return fallback;
    };
    dict.get(b"MediaBox")
        .ok()
        .and_then(|obj| obj.as_array().ok())
        .and_then(|arr| {
            if arr.len() != 4 {
                return None;
            }
            let x0 = num(&arr[0])?;
            let y0 = num(&arr[1])?;
            let x1 = num(&arr[2])?;
            let y1 = num(&arr[3])?;
            Some(PageSize { width: (x1 - x0).abs(), height: (y1 - y0).abs() })
        })
        .unwrap_or(fallback)
}

/// Convert a top-left document-space rect to a PDF /Rect array.
pub(crate) fn rect_to_pdf(rect: PdfRect, page_height: f32) -> Object {
    Object::Array(vec![
        rect.x0.into(),
        (page_height - rect.y1).into(),
        rect.x1.into(),
        (page_height - rect.y0).into(),
    ])
}

/// Convert a PDF /Rect array object back to top-left document space.
pub(crate) fn rect_from_pdf(obj: &Object, page_height: f32) -> Option<PdfRect> {
    let arr = obj.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let x0 = num(&arr[0])?;
    let y0 = num(&arr[1])?;
    let x1 = num(&arr[2])?;
    let y1 = num(&arr[3])?;
    Some(PdfRect::new(
        x0.min(x1),
        page_height - y0.max(y1),
        x0.max(x1),
        page_height - y0.min(y1),
    ))
}

fn num(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn string_bytes(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Annotation dictionaries referenced from a page's /Annots array.
pub(crate) fn annot_dicts(doc: &lopdf::Document, page_id: ObjectId) -> Vec<(ObjectId, Dictionary)> {
    let Ok(dict) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let annots = match dict.get(b"Annots") {
        Ok(Object::Array(arr)) => arr.clone(),
        Ok(Object::Reference(r)) => match doc.get_object(*r) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    annots
        .iter()
        .filter_map(|obj| match obj {
            Object::Reference(r) => doc
                .get_dictionary(*r)
                .ok()
                .map(|dict| (*r, dict.clone())),
            _ => None,
        })
        .collect()
}

/// Map of font resource names to /BaseFont names for a page.
fn font_base_names(doc: &lopdf::Document, page_id: ObjectId) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Some(fonts) = resource_category(doc, page_id, b"Font") else {
        return map;
    };
    for (res_name, value) in fonts.iter() {
        let font_dict = match value {
            Object::Reference(r) => match doc.get_dictionary(*r) {
                Ok(d) => d.clone(),
                Err(_) => continue,
            },
            Object::Dictionary(d) => d.clone(),
            _ => continue,
        };
        if let Ok(Object::Name(base)) = font_dict.get(b"BaseFont") {
            map.insert(
                String::from_utf8_lossy(res_name).into_owned(),
                String::from_utf8_lossy(base).into_owned(),
            );
        }
    }
    map
}

fn resource_category(
    doc: &lopdf::Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<Dictionary> {
    let dict = doc.get_dictionary(page_id).ok()?;
    let resources = match dict.get(b"Resources").ok()? {
        Object::Dictionary(d) => d.clone(),
        Object::Reference(r) => match doc.get_object(*r).ok()? {
            Object::Dictionary(d) => d.clone(),
            _ => return None,
        },
        _ => return None,
    };
    match resources.get(key).ok()? {
        Object::Dictionary(d) => Some(d.clone()),
        Object::Reference(r) => match doc.get_object(*r).ok()? {
            Object::Dictionary(d) => Some(d.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Interpret a page's content stream into drawable items.
pub(crate) fn collect_page_items(
    doc: &lopdf::Document,
    page_id: ObjectId,
    size: PageSize,
) -> EngineResult<Vec<PageItem>> {
    let bytes = doc.get_page_content(page_id).unwrap_or_default();
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let content =
        Content::decode(&bytes).map_err(|e| EngineError::MalformedContent(e.to_string()))?;
    let fonts = font_base_names(doc, page_id);

    let mut items = Vec::new();
    let mut fill_color = RgbColor::BLACK;
    let mut pending_rects: Vec<PdfRect> = Vec::new();

    // Transform stack for the q/cm/Do/Q image pattern: (a, d, e, f) of
    // the last concatenated matrix (no rotation/skew support).
    let mut cm_stack: Vec<Option<(f32, f32, f32, f32)>> = vec![None];

    // Text state inside BT..ET.
    let mut in_text = false;
    let mut line_origin = (0.0_f32, 0.0_f32);
    let mut font_res = String::new();
    let mut font_size = 12.0_f32;

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "rg" => {
                if operands.len() == 3 {
                    if let (Some(r), Some(g), Some(b)) =
                        (num(&operands[0]), num(&operands[1]), num(&operands[2]))
                    {
                        fill_color = RgbColor::new(r, g, b);
                    }
                }
            }
            "re" => {
                if operands.len() == 4 {
                    if let (Some(x), Some(y), Some(w), Some(h)) = (
                        num(&operands[0]),
                        num(&operands[1]),
                        num(&operands[2]),
                        num(&operands[3]),
                    ) {
                        pending_rects.push(PdfRect::new(
                            x,
                            size.height - (y + h),
                            x + w,
                            size.height - y,
                        ));
                    }
                }
            }
            "f" | "F" | "b" | "B" => {
                for rect in pending_rects.drain(..) {
                    items.push(PageItem::Fill { rect, color: fill_color });
                }
            }
            "n" => pending_rects.clear(),
            "q" => cm_stack.push(*cm_stack.last().unwrap_or(&None)),
            "Q" => {
                cm_stack.pop();
                if cm_stack.is_empty() {
                    cm_stack.push(None);
                }
            }
            "cm" => {
                if operands.len() == 6 {
                    if let (Some(a), Some(d), Some(e), Some(f)) = (
                        num(&operands[0]),
                        num(&operands[3]),
                        num(&operands[4]),
                        num(&operands[5]),
                    ) {
                        *cm_stack.last_mut().unwrap() = Some((a, d, e, f));
                    }
                }
            }
            "Do" => {
                if let Some(Object::Name(res)) = operands.first() {
                    if let Some((a, d, e, f)) = cm_stack.last().copied().flatten() {
                        items.push(PageItem::Image {
                            rect: PdfRect::new(
                                e,
                                size.height - (f + d),
                                e + a,
                                size.height - f,
                            ),
                            res_name: String::from_utf8_lossy(res).into_owned(),
                        });
                    }
                }
            }
            "BT" => {
                in_text = true;
                line_origin = (0.0, 0.0);
            }
            "ET" => in_text = false,
            "Tf" => {
                if operands.len() == 2 {
                    if let Object::Name(res) = &operands[0] {
                        font_res = String::from_utf8_lossy(res).into_owned();
                    }
                    if let Some(s) = num(&operands[1]) {
                        font_size = s;
                    }
                }
            }
            "Td" if in_text => {
                if operands.len() == 2 {
                    if let (Some(tx), Some(ty)) = (num(&operands[0]), num(&operands[1])) {
                        line_origin.0 += tx;
                        line_origin.1 += ty;
                    }
                }
            }
            "Tj" if in_text => {
                if let Some(text) = operands.first().and_then(string_bytes) {
                    items.push(PageItem::Text(TextRun {
                        origin_doc: PdfPoint::new(line_origin.0, size.height - line_origin.1),
                        text,
                        font_name: fonts
                            .get(&font_res)
                            .cloned()
                            .unwrap_or_else(|| font_res.clone()),
                        font_size,
                        color: fill_color,
                    }));
                }
            }
            "TJ" if in_text => {
                // Array form: concatenate the string elements, ignoring
                // kerning adjustments.
                if let Some(Object::Array(parts)) = operands.first() {
                    let text: String =
                        parts.iter().filter_map(string_bytes).collect::<Vec<_>>().concat();
                    if !text.is_empty() {
                        items.push(PageItem::Text(TextRun {
                            origin_doc: PdfPoint::new(line_origin.0, size.height - line_origin.1),
                            text,
                            font_name: fonts
                                .get(&font_res)
                                .cloned()
                                .unwrap_or_else(|| font_res.clone()),
                            font_size,
                            color: fill_color,
                        }));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(items)
}

/// Rasterize a page region at `scale` into an RGBA buffer.
pub(crate) fn rasterize(
    doc: &lopdf::Document,
    page_id: ObjectId,
    size: PageSize,
    scale: f32,
    clip: Option<PdfRect>,
) -> EngineResult<RgbaImage> {
    if scale <= 0.0 {
        return Err(EngineError::Render(format!("non-positive scale {scale}")));
    }
    let region = clip.unwrap_or(PdfRect::new(0.0, 0.0, size.width, size.height));
    let width = ((region.width() * scale).round() as u32).max(1);
    let height = ((region.height() * scale).round() as u32).max(1);

    let mut image = RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));

    let items = collect_page_items(doc, page_id, size)?;
    for item in &items {
        match item {
            PageItem::Fill { rect, color } => {
                fill_rect(&mut image, *rect, *color, region, scale);
            }
            PageItem::Text(run) => {
                greek_run(
                    &mut image,
                    run.origin_doc,
                    &run.text,
                    run.font_size,
                    run.color,
                    region,
                    scale,
                );
            }
            PageItem::Image { rect, res_name } => {
                blit_image(doc, page_id, &mut image, *rect, res_name, region, scale);
            }
        }
    }

    // FreeText annotations draw above page content.
    for (_, dict) in annot_dicts(doc, page_id) {
        if !matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"FreeText") {
            continue;
        }
        let Some(rect) = dict
            .get(b"Rect")
            .ok()
            .and_then(|obj| rect_from_pdf(obj, size.height))
        else {
            continue;
        };
        let text = dict.get(b"Contents").ok().and_then(string_bytes).unwrap_or_default();
        let da = dict.get(b"DA").ok().and_then(string_bytes).unwrap_or_default();
        let (_, font_size, color) = parse_da(&da);

        for (i, line) in text.split('\n').enumerate() {
            let baseline = rect.y0 + font_size * 0.8 + font_size * 1.2 * i as f32;
            if baseline > rect.y1 + font_size {
                break;
            }
            greek_run(
                &mut image,
                PdfPoint::new(rect.x0 + 2.0, baseline),
                line,
                font_size,
                color,
                region,
                scale,
            );
        }
    }

    Ok(image)
}

fn fill_rect(image: &mut RgbaImage, rect: PdfRect, color: RgbColor, region: PdfRect, scale: f32) {
    let px0 = ((rect.x0 - region.x0) * scale).floor().max(0.0) as i64;
    let py0 = ((rect.y0 - region.y0) * scale).floor().max(0.0) as i64;
    let px1 = ((rect.x1 - region.x0) * scale).ceil() as i64;
    let py1 = ((rect.y1 - region.y0) * scale).ceil() as i64;
    let rgba = image::Rgba(color.to_rgba8());

    for y in py0..py1.min(image.height() as i64) {
        for x in px0..px1.min(image.width() as i64) {
            if x >= 0 && y >= 0 {
                image.put_pixel(x as u32, y as u32, rgba);
            }
        }
    }
}

/// Draw a text run as glyph-advance boxes (greeked text).
fn greek_run(
    image: &mut RgbaImage,
    origin: PdfPoint,
    text: &str,
    font_size: f32,
    color: RgbColor,
    region: PdfRect,
    scale: f32,
) {
    let mut x = origin.x;
    for ch in text.chars() {
        let advance = metrics::glyph_advance(ch, font_size);
        if !ch.is_whitespace() {
            fill_rect(
                image,
                PdfRect::new(x, origin.y - 0.7 * font_size, x + advance * 0.85, origin.y),
                color,
                region,
                scale,
            );
        }
        x += advance;
    }
}

/// Nearest-neighbor blit of an image XObject into its placement rect.
fn blit_image(
    doc: &lopdf::Document,
    page_id: ObjectId,
    image: &mut RgbaImage,
    rect: PdfRect,
    res_name: &str,
    region: PdfRect,
    scale: f32,
) {
    let Some(xobjects) = resource_category(doc, page_id, b"XObject") else {
        return;
    };
    let Ok(Object::Reference(r)) = xobjects.get(res_name.as_bytes()) else {
        return;
    };
    let Ok(Object::Stream(stream)) = doc.get_object(*r) else {
        return;
    };
    let (Ok(Object::Integer(iw)), Ok(Object::Integer(ih))) =
        (stream.dict.get(b"Width"), stream.dict.get(b"Height"))
    else {
        return;
    };
    let (iw, ih) = (*iw as u32, *ih as u32);
    let Ok(rgb) = stream.decompressed_content() else {
        return;
    };
    if rgb.len() < (iw * ih * 3) as usize {
        tracing::warn!(res_name, "image XObject data shorter than declared size");
        return;
    }

    let px0 = ((rect.x0 - region.x0) * scale).floor() as i64;
    let py0 = ((rect.y0 - region.y0) * scale).floor() as i64;
    let px1 = ((rect.x1 - region.x0) * scale).ceil() as i64;
    let py1 = ((rect.y1 - region.y0) * scale).ceil() as i64;
    if px1 <= px0 || py1 <= py0 {
        return;
    }

    for y in py0.max(0)..py1.min(image.height() as i64) {
        for x in px0.max(0)..px1.min(image.width() as i64) {
            let sx = ((x - px0) as f32 / (px1 - px0) as f32 * iw as f32) as u32;
            let sy = ((y - py0) as f32 / (py1 - py0) as f32 * ih as f32) as u32;
            let idx = ((sy.min(ih - 1) * iw + sx.min(iw - 1)) * 3) as usize;
            image.put_pixel(
                x as u32,
                y as u32,
                image::Rgba([rgb[idx], rgb[idx + 1], rgb[idx + 2], 255]),
            );
        }
    }
}
