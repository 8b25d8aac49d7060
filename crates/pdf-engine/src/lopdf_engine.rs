//! Default rasterizer backed by `lopdf`
//!
//! Pages are "rendered" as a transparent raster with a light frame and a dark
//! bar per text run: enough for layout, hit-testing and compositing without a
//! native PDF renderer.

use crate::cancel::{yield_now, CancellationToken};
use crate::text::{extract_text_items, TextItem};
use crate::{OpenSource, PageHandle, PageSize, PdfEngineError, Rasterizer, RgbaImage, Viewport};
use image::Rgba;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::sync::Arc;

const FRAME: Rgba<u8> = Rgba([220, 220, 220, 255]);
const INK: Rgba<u8> = Rgba([48, 48, 48, 255]);
const MAX_INHERIT_DEPTH: usize = 32;

/// Fallback when a page has no usable MediaBox (US Letter).
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

fn has_encrypt_marker(bytes: &[u8]) -> bool {
    bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt")
}

pub(crate) fn load_document(bytes: &[u8]) -> Result<Document, PdfEngineError> {
    if has_encrypt_marker(bytes) {
        return Err(PdfEngineError::EncryptedUnsupported);
    }

    let document = Document::load_mem(bytes)?;
    if document.get_pages().is_empty() {
        return Err(PdfEngineError::Backend("document has no pages".to_owned()));
    }

    Ok(document)
}

/// Looks up `key` on the page or, failing that, on its `/Parent` chain.
pub(crate) fn inherited_attribute<'a>(
    document: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = document.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return match value {
                Object::Reference(id) => document.get_object(*id).ok(),
                other => Some(other),
            };
        }

        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = document.get_dictionary(parent).ok()?;
    }

    None
}

pub(crate) fn inherited_dictionary(
    document: &Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<Dictionary> {
    match inherited_attribute(document, page_id, key)? {
        Object::Dictionary(dict) => Some(dict.clone()),
        _ => None,
    }
}

pub(crate) fn page_size_of(document: &Document, page_id: ObjectId) -> PageSize {
    let Some(Object::Array(array)) = inherited_attribute(document, page_id, b"MediaBox") else {
        return DEFAULT_PAGE_SIZE;
    };

    let coords: Vec<f32> = array
        .iter()
        .filter_map(|object| match object {
            Object::Integer(value) => Some(*value as f32),
            Object::Real(value) => Some(*value as f32),
            _ => None,
        })
        .collect();

    match coords.as_slice() {
        [x0, y0, x1, y1] if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => {
            PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() }
        }
        _ => DEFAULT_PAGE_SIZE,
    }
}

#[derive(Debug)]
struct ParsedDocument {
    document: Document,
    pages: BTreeMap<u32, ObjectId>,
}

/// Rasterizer over one parsed document.
#[derive(Debug, Clone)]
pub struct LopdfRasterizer {
    inner: Arc<ParsedDocument>,
}

impl LopdfRasterizer {
    /// Fetches and parses the document behind `source`.
    pub fn open(source: &OpenSource) -> Result<Self, PdfEngineError> {
        let bytes = source.fetch()?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        let document = load_document(bytes)?;
        let pages = document.get_pages();
        Ok(Self { inner: Arc::new(ParsedDocument { document, pages }) })
    }

    pub fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError> {
        let page_id = self.page_id(page_number)?;
        Ok(page_size_of(&self.inner.document, page_id))
    }

    fn page_id(&self, page_number: u32) -> Result<ObjectId, PdfEngineError> {
        self.inner.pages.get(&page_number).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_number,
            page_count: self.page_count(),
        })
    }
}

impl Rasterizer for LopdfRasterizer {
    type Page = LopdfPage;

    fn page_count(&self) -> u32 {
        self.inner.pages.len() as u32
    }

    async fn page(&self, page_number: u32) -> Result<LopdfPage, PdfEngineError> {
        let page_id = self.page_id(page_number)?;
        yield_now().await;

        let document = &self.inner.document;
        let size = page_size_of(document, page_id);
        let content = document.get_page_content(page_id)?;
        let text_items = extract_text_items(&content)?;

        Ok(LopdfPage { page_number, size, text_items: Some(text_items) })
    }
}

/// Decoded page; the text layout is dropped on [`PageHandle::release`].
#[derive(Debug, Clone)]
pub struct LopdfPage {
    page_number: u32,
    size: PageSize,
    text_items: Option<Vec<TextItem>>,
}

impl LopdfPage {
    fn items(&self) -> Result<&[TextItem], PdfEngineError> {
        self.text_items.as_deref().ok_or_else(|| {
            PdfEngineError::Backend(format!("page {} was already released", self.page_number))
        })
    }
}

impl PageHandle for LopdfPage {
    fn page_number(&self) -> u32 {
        self.page_number
    }

    fn size(&self) -> PageSize {
        self.size
    }

    async fn render(
        &self,
        viewport: Viewport,
        cancel: CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError> {
        cancel.check()?;
        let items = self.items()?.to_vec();
        yield_now().await;
        cancel.check()?;

        let (width, height) = (viewport.width_px, viewport.height_px);
        let mut image = RgbaImage::new(width, height);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, FRAME);
                image.put_pixel(x, height - 1, FRAME);
            }
            for y in 0..height {
                image.put_pixel(0, y, FRAME);
                image.put_pixel(width - 1, y, FRAME);
            }
        }

        for item in &items {
            let scale = viewport.scale;
            let font_px = item.font_height() * scale;
            let left = item.x() * scale;
            let baseline = height as f32 - item.baseline_y() * scale;
            let top = baseline - font_px * 0.7;
            let right = left + item.width * scale;

            let x0 = left.max(0.0) as u32;
            let y0 = top.max(0.0) as u32;
            let x1 = (right.max(0.0) as u32).min(width);
            let y1 = (baseline.max(0.0) as u32).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    image.put_pixel(x, y, INK);
                }
            }
        }

        cancel.check()?;
        Ok(image)
    }

    async fn text_content(&self) -> Result<Vec<TextItem>, PdfEngineError> {
        Ok(self.items()?.to_vec())
    }

    fn release(&mut self) {
        self.text_items = None;
    }

    fn is_released(&self) -> bool {
        self.text_items.is_none()
    }
}
