//! Document sources for tests

use lopdf::{Dictionary, Document, Object, Stream};
use page_editor_render::source::placeholder_raster;
use page_editor_render::{DocumentSource, Dimensions, RenderError, RenderResult, RgbaImage};
use page_editor_scheduler::CancellationToken;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

/// Small portrait pages with placeholder rasters; counts rasterizations
pub struct BlankSource {
    pages: u32,
    size: Dimensions,
    renders: AtomicU32,
}

impl BlankSource {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            size: Dimensions::new(40.0, 60.0),
            renders: AtomicU32::new(0),
        }
    }

    pub fn renders(&self) -> u32 {
        self.renders.load(Ordering::SeqCst)
    }
}

impl DocumentSource for BlankSource {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page_dimensions(&self, page: u32) -> RenderResult<Dimensions> {
        if page == 0 || page > self.pages {
            return Err(RenderError::PageOutOfRange { page, page_count: self.pages });
        }
        Ok(self.size)
    }

    fn rasterize(&self, page: u32, scale: f64) -> RenderResult<RgbaImage> {
        let (width, height) = self.page_dimensions(page)?.scaled(scale).to_pixels();
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(placeholder_raster(width, height, page))
    }
}

/// Renders each page with its left half black and its right half white,
/// standing in for a rasterizer that draws real content
pub struct PaintedSource {
    sizes: Vec<Dimensions>,
}

impl PaintedSource {
    pub fn new(sizes: &[(i64, i64)]) -> Self {
        Self {
            sizes: sizes
                .iter()
                .map(|(width, height)| Dimensions::new(*width as f64, *height as f64))
                .collect(),
        }
    }
}

impl DocumentSource for PaintedSource {
    fn page_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    fn page_dimensions(&self, page: u32) -> RenderResult<Dimensions> {
        page.checked_sub(1)
            .and_then(|index| self.sizes.get(index as usize))
            .copied()
            .ok_or(RenderError::PageOutOfRange { page, page_count: self.page_count() })
    }

    fn rasterize(&self, page: u32, scale: f64) -> RenderResult<RgbaImage> {
        let (width, height) = self.page_dimensions(page)?.scaled(scale).to_pixels();
        let pixels = (0..height)
            .flat_map(|_| 0..width)
            .flat_map(|x| {
                let value = if x < width / 2 { 0 } else { 255 };
                [value, value, value, 255]
            })
            .collect();
        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Raster(format!("page {page}: bad buffer size")))
    }
}

/// Fails the first rasterization of selected pages
pub struct FlakySource {
    inner: BlankSource,
    pending: Mutex<BTreeSet<u32>>,
}

impl FlakySource {
    pub fn failing_once(inner: BlankSource, pages: &[u32]) -> Self {
        Self {
            inner,
            pending: Mutex::new(pages.iter().copied().collect()),
        }
    }
}

impl DocumentSource for FlakySource {
    fn page_count(&self) -> u32 {
        self.inner.page_count()
    }

    fn page_dimensions(&self, page: u32) -> RenderResult<Dimensions> {
        self.inner.page_dimensions(page)
    }

    fn rasterize(&self, page: u32, scale: f64) -> RenderResult<RgbaImage> {
        if self.pending.lock().remove(&page) {
            return Err(RenderError::Raster(format!("corrupt content stream on page {page}")));
        }
        self.inner.rasterize(page, scale)
    }
}

/// Cancels a token while rasterizing, as a file switch would mid-render
pub struct CancellingSource {
    inner: BlankSource,
    token: Mutex<Option<CancellationToken>>,
}

impl CancellingSource {
    pub fn new(inner: BlankSource) -> Self {
        Self {
            inner,
            token: Mutex::new(None),
        }
    }

    pub fn arm(&self, token: CancellationToken) {
        *self.token.lock() = Some(token);
    }
}

impl DocumentSource for CancellingSource {
    fn page_count(&self) -> u32 {
        self.inner.page_count()
    }

    fn page_dimensions(&self, page: u32) -> RenderResult<Dimensions> {
        self.inner.page_dimensions(page)
    }

    fn rasterize(&self, page: u32, scale: f64) -> RenderResult<RgbaImage> {
        if let Some(token) = self.token.lock().take() {
            token.cancel();
        }
        self.inner.rasterize(page, scale)
    }
}

/// PDF with one page per `(width, height)`; the font resource is inherited
/// from the page tree root
pub fn sample_pdf(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let resources = Dictionary::from_iter(vec![(
        "Font",
        Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
    )]);

    let mut kids = Vec::new();
    for (index, (width, height)) in sizes.iter().enumerate() {
        let content = format!("BT /F1 12 Tf 20 20 Td (Page {}) Tj ET", index + 1);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(*width),
                    Object::Integer(*height),
                ]),
            ),
            ("Contents", Object::Reference(content_id)),
        ]);
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(sizes.len() as i64)),
        ("Kids", Object::Array(kids)),
        ("Resources", Object::Dictionary(resources)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}
