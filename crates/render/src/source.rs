//! Document source abstraction
//!
//! The engine only needs three things from a document: how many pages it
//! has, how large each page is, and a raster of a page at a given scale.
//! [`LopdfSource`] reads page boxes with `lopdf` and produces a placeholder
//! raster. With the `pdfium` feature, [`open_document`] prefers
//! [`crate::pdfium::PdfiumSource`], which renders real page content.

use crate::error::{RenderError, RenderResult};
use crate::geometry::Dimensions;
use image::Rgba;
use lopdf::{Document, Object, ObjectId};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub type RgbaImage = image::RgbaImage;

/// US Letter, used when a page has no readable MediaBox
const FALLBACK_PAGE: Dimensions = Dimensions::new(612.0, 792.0);

const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);
const MARKER: Rgba<u8> = Rgba([40, 40, 40, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// A parsed document the engine can rasterize
///
/// Page numbers are 1-based.
pub trait DocumentSource: Send + Sync {
    fn page_count(&self) -> u32;

    /// Page size in points
    fn page_dimensions(&self, page: u32) -> RenderResult<Dimensions>;

    /// Rasterize a page at `scale` pixels per point
    fn rasterize(&self, page: u32, scale: f64) -> RenderResult<RgbaImage>;

    /// Whether [`DocumentSource::rasterize`] draws the page's actual content
    ///
    /// Export refuses to rasterize pages through a source that returns
    /// `false`, since the page content would be lost.
    fn renders_content(&self) -> bool {
        true
    }
}

/// Open `path` with the best available source
///
/// With the `pdfium` feature this is a [`crate::pdfium::PdfiumSource`] when
/// the native library can be bound; otherwise a [`LopdfSource`].
pub fn open_document<P: AsRef<Path>>(path: P) -> RenderResult<Arc<dyn DocumentSource>> {
    open_bytes(fs::read(path)?)
}

#[cfg(feature = "pdfium")]
fn open_bytes(bytes: Vec<u8>) -> RenderResult<Arc<dyn DocumentSource>> {
    match crate::pdfium::shared_pdfium() {
        Ok(pdfium) => Ok(Arc::new(crate::pdfium::PdfiumSource::from_bytes(pdfium, bytes)?)),
        Err(error) => {
            tracing::warn!(error = %error, "pdfium unavailable; pages render as placeholders");
            Ok(Arc::new(LopdfSource::from_bytes(&bytes)?))
        }
    }
}

#[cfg(not(feature = "pdfium"))]
fn open_bytes(bytes: Vec<u8>) -> RenderResult<Arc<dyn DocumentSource>> {
    tracing::debug!("built without pdfium; pages render as placeholders");
    Ok(Arc::new(LopdfSource::from_bytes(&bytes)?))
}

/// Fail fast on encrypted documents; no source supports passwords
pub fn reject_encrypted(bytes: &[u8]) -> RenderResult<()> {
    if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(RenderError::EncryptedUnsupported);
    }
    Ok(())
}

/// `lopdf`-backed source with a placeholder rasterizer
#[derive(Debug, Clone)]
pub struct LopdfSource {
    page_sizes: Vec<Dimensions>,
}

impl LopdfSource {
    pub fn open<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        Self::from_bytes(&fs::read(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> RenderResult<Self> {
        reject_encrypted(bytes)?;

        let doc = Document::load_mem(bytes)?;
        let page_sizes = doc
            .get_pages()
            .into_values()
            .map(|page_id| media_box(&doc, page_id).unwrap_or(FALLBACK_PAGE))
            .collect::<Vec<_>>();

        if page_sizes.is_empty() {
            return Err(RenderError::NoPages);
        }

        tracing::debug!(pages = page_sizes.len(), "parsed document page boxes");
        Ok(Self { page_sizes })
    }

    fn check_page(&self, page: u32) -> RenderResult<Dimensions> {
        page.checked_sub(1)
            .and_then(|index| self.page_sizes.get(index as usize))
            .copied()
            .ok_or(RenderError::PageOutOfRange { page, page_count: self.page_count() })
    }
}

impl DocumentSource for LopdfSource {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_dimensions(&self, page: u32) -> RenderResult<Dimensions> {
        self.check_page(page)
    }

    fn rasterize(&self, page: u32, scale: f64) -> RenderResult<RgbaImage> {
        let size = self.check_page(page)?;
        let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
        let (width, height) = size.scaled(scale).to_pixels();
        Ok(placeholder_raster(width, height, page))
    }

    fn renders_content(&self) -> bool {
        false
    }
}

/// White page with a border, a top-left orientation block and one tick per
/// page number (up to ten) along the bottom edge
pub fn placeholder_raster(width: u32, height: u32, page: u32) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, WHITE);
    if width < 4 || height < 4 {
        return image;
    }

    for x in 0..width {
        image.put_pixel(x, 0, BORDER);
        image.put_pixel(x, height - 1, BORDER);
    }
    for y in 0..height {
        image.put_pixel(0, y, BORDER);
        image.put_pixel(width - 1, y, BORDER);
    }

    let block_w = (width / 6).max(1);
    let block_h = (height / 8).max(1);
    for y in 2..(2 + block_h).min(height - 1) {
        for x in 2..(2 + block_w).min(width - 1) {
            image.put_pixel(x, y, MARKER);
        }
    }

    let tick = (width / 40).max(1);
    let base = height.saturating_sub(2 + tick * 2);
    for n in 0..page.min(10) {
        let x0 = 2 + n * tick * 2;
        for y in base..(base + tick).min(height - 1) {
            for x in x0..(x0 + tick).min(width - 1) {
                image.put_pixel(x, y, MARKER);
            }
        }
    }

    image
}

/// Resolve a page attribute that may be inherited from the page tree
pub fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    // Page trees are shallow; the bound guards against Parent cycles
    for _ in 0..64 {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Follow a single indirect reference
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

pub fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(*value as f64),
        _ => None,
    }
}

/// MediaBox as `[x0, y0, x1, y1]`, inherited when the page lacks one
pub fn media_box_array(doc: &Document, page_id: ObjectId) -> Option<[f64; 4]> {
    let array = inherited_attribute(doc, page_id, b"MediaBox")?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0; 4];
    for (slot, object) in values.iter_mut().zip(array) {
        *slot = number(resolve(doc, object))?;
    }
    Some(values)
}

fn media_box(doc: &Document, page_id: ObjectId) -> Option<Dimensions> {
    let [x0, y0, x1, y1] = media_box_array(doc, page_id)?;
    Some(Dimensions::new((x1 - x0).abs(), (y1 - y0).abs()))
}
