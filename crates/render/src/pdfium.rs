//! PDFium-backed document source
//!
//! Enabled by the `pdfium` feature. The native library is looked up next to
//! the executable (app bundles), then in the working directory, then on the
//! system library path.

use crate::error::{RenderError, RenderResult};
use crate::geometry::Dimensions;
use crate::source::{reject_encrypted, DocumentSource, RgbaImage};
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::OnceLock;

static PDFIUM: OnceLock<Pdfium> = OnceLock::new();

/// Bind the PDFium library
pub fn bind_pdfium() -> RenderResult<Pdfium> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf));

    if let Some(ref dir) = exe_dir {
        if let Ok(bindings) = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|error| RenderError::Backend(format!("failed to bind pdfium library: {error}")))?;
    Ok(Pdfium::new(bindings))
}

/// Process-wide PDFium instance, bound on first use
pub fn shared_pdfium() -> RenderResult<&'static Pdfium> {
    if let Some(pdfium) = PDFIUM.get() {
        return Ok(pdfium);
    }
    let pdfium = bind_pdfium()?;
    Ok(PDFIUM.get_or_init(|| pdfium))
}

/// Document source that renders real page content through PDFium
pub struct PdfiumSource {
    document: PdfDocument<'static>,
    page_sizes: Vec<Dimensions>,
}

impl PdfiumSource {
    pub fn open<P: AsRef<Path>>(pdfium: &'static Pdfium, path: P) -> RenderResult<Self> {
        Self::from_bytes(pdfium, std::fs::read(path)?)
    }

    pub fn from_bytes(pdfium: &'static Pdfium, bytes: Vec<u8>) -> RenderResult<Self> {
        reject_encrypted(&bytes)?;

        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|error| RenderError::Backend(format!("failed to load document: {error}")))?;
        let page_sizes = document
            .pages()
            .iter()
            .map(|page| Dimensions::new(page.width().value as f64, page.height().value as f64))
            .collect::<Vec<_>>();

        if page_sizes.is_empty() {
            return Err(RenderError::NoPages);
        }

        tracing::debug!(pages = page_sizes.len(), "opened document with pdfium");
        Ok(Self { document, page_sizes })
    }

    fn check_page(&self, page: u32) -> RenderResult<Dimensions> {
        page.checked_sub(1)
            .and_then(|index| self.page_sizes.get(index as usize))
            .copied()
            .ok_or(RenderError::PageOutOfRange { page, page_count: self.page_count() })
    }
}

impl DocumentSource for PdfiumSource {
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

        let index = u16::try_from(page - 1)
            .map_err(|_| RenderError::PageOutOfRange { page, page_count: self.page_count() })?;
        let pdf_page = self
            .document
            .pages()
            .get(index)
            .map_err(|error| RenderError::Raster(format!("page {page}: {error}")))?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|error| RenderError::Raster(format!("page {page}: {error}")))?;

        let (rendered_width, rendered_height) = (bitmap.width() as u32, bitmap.height() as u32);
        RgbaImage::from_raw(rendered_width, rendered_height, bitmap.as_rgba_bytes().to_vec()).ok_or_else(|| {
            RenderError::Raster(format!(
                "page {page}: bitmap does not match {rendered_width}x{rendered_height}"
            ))
        })
    }
}
