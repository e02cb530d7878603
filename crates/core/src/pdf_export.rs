//! PDF export of edited pages
//!
//! Each page is exported one of three ways:
//!
//! - **Unchanged**: no edits, the page object is left as it was.
//! - **Vector**: rotation/scale/offset only. The original content becomes a
//!   Form XObject drawn through the solver's PDF matrix, so text stays text.
//! - **Raster**: cropped pages, and every page in grayscale mode. The page
//!   is rasterized, composited like the preview, and embedded as an image.
//!   This needs a source that renders page content; a placeholder source
//!   makes the export fail instead of replacing the page.
//!
//! Page count, order and physical page size are always preserved.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use page_editor_render::source::{inherited_attribute, media_box_array};
use page_editor_render::{draw_page, solve, ColorMode, Dimensions, DocumentSource, EditHistory, RenderError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Error types for PDF export operations
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("encoding error: {0}")]
    Encode(String),
    #[error("page {page} must be rasterized but the document source cannot render page content (build with the `pdfium` feature)")]
    RasterUnavailable { page: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// How a page was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStrategy {
    Unchanged,
    Vector,
    Raster,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    pub color_mode: ColorMode,
    /// Pixels per point for rasterized pages
    pub raster_scale: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::Color,
            raster_scale: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub pages: Vec<(u32, ExportStrategy)>,
}

impl ExportReport {
    pub fn count(&self, strategy: ExportStrategy) -> usize {
        self.pages.iter().filter(|(_, chosen)| *chosen == strategy).count()
    }

    pub fn strategy(&self, page: u32) -> Option<ExportStrategy> {
        self.pages
            .iter()
            .find(|(number, _)| *number == page)
            .map(|(_, strategy)| *strategy)
    }
}

pub fn choose_strategy(edit: Option<&EditHistory>, options: &ExportOptions) -> ExportStrategy {
    if options.color_mode == ColorMode::Grayscale {
        return ExportStrategy::Raster;
    }
    match edit {
        Some(edit) if edit.has_crop() => ExportStrategy::Raster,
        Some(edit) if !edit.is_identity() => ExportStrategy::Vector,
        _ => ExportStrategy::Unchanged,
    }
}

/// Apply `edits` (keyed by 1-based page number) to the PDF in `input`
///
/// `source` rasterizes pages that need the raster strategy. When no page
/// changes, the input bytes are returned as they are.
pub fn export_document(
    input: &[u8],
    edits: &BTreeMap<u32, EditHistory>,
    options: &ExportOptions,
    source: &dyn DocumentSource,
) -> ExportResult<(Vec<u8>, ExportReport)> {
    let mut doc = Document::load_mem(input)?;
    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();

    let mut report = ExportReport::default();
    for (number, page_id) in pages {
        let edit = edits.get(&number);
        let strategy = choose_strategy(edit, options);
        let identity = EditHistory::default();
        let edit = edit.unwrap_or(&identity);

        match strategy {
            ExportStrategy::Unchanged => {}
            ExportStrategy::Vector => write_vector_page(&mut doc, page_id, edit)?,
            ExportStrategy::Raster => write_raster_page(&mut doc, page_id, number, edit, options, source)?,
        }
        tracing::debug!(page = number, ?strategy, "export strategy chosen");
        report.pages.push((number, strategy));
    }

    if report.count(ExportStrategy::Unchanged) == report.pages.len() {
        return Ok((input.to_vec(), report));
    }

    doc.compress();
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| ExportError::Encode(e.to_string()))?;

    tracing::info!(
        pages = report.pages.len(),
        vector = report.count(ExportStrategy::Vector),
        raster = report.count(ExportStrategy::Raster),
        bytes = output.len(),
        "document exported"
    );
    Ok((output, report))
}

/// Export `input` to `output` through a temporary file in the same directory
///
/// The destination is only replaced once the whole document is encoded.
pub fn export_to_path(
    input: &Path,
    output: &Path,
    edits: &BTreeMap<u32, EditHistory>,
    options: &ExportOptions,
    source: &dyn DocumentSource,
) -> ExportResult<ExportReport> {
    let bytes = fs::read(input)?;
    let (encoded, report) = export_document(&bytes, edits, options, source)?;

    let directory = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(directory)?;
    file.write_all(&encoded)?;
    file.as_file().sync_all()?;
    file.persist(output).map_err(|e| ExportError::Io(e.error))?;
    Ok(report)
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

/// MediaBox normalized to `[x0, y0, x1, y1]` with x0 < x1 and y0 < y1
fn page_box(doc: &Document, page_id: ObjectId) -> ExportResult<[f64; 4]> {
    let [ax, ay, bx, by] = media_box_array(doc, page_id)
        .ok_or_else(|| ExportError::Encode("page has no usable MediaBox".into()))?;
    Ok([ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)])
}

fn box_object(bounds: [f64; 4]) -> Object {
    Object::Array(bounds.iter().map(|value| real(*value)).collect())
}

/// Paint the page white, then run `body` inside its own graphics state
fn page_operations(bounds: [f64; 4], body: Vec<Operation>) -> Vec<Operation> {
    let [x0, y0, x1, y1] = bounds;
    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![real(1.0), real(1.0), real(1.0)]),
        Operation::new("re", vec![real(x0), real(y0), real(x1 - x0), real(y1 - y0)]),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
        Operation::new("q", vec![]),
    ];
    operations.extend(body);
    operations.push(Operation::new("Q", vec![]));
    operations
}

/// Point the page at a fresh content stream and resource dictionary
fn replace_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    bounds: [f64; 4],
    operations: Vec<Operation>,
    xobject: (&str, ObjectId),
) -> ExportResult<()> {
    let encoded = Content { operations }
        .encode()
        .map_err(|e| ExportError::Encode(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    let mut xobjects = Dictionary::new();
    xobjects.set(xobject.0, Object::Reference(xobject.1));
    let mut resources = Dictionary::new();
    resources.set("XObject", Object::Dictionary(xobjects));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Reference(content_id));
    page.set("Resources", Object::Dictionary(resources));
    page.set("MediaBox", box_object(bounds));
    Ok(())
}

fn write_vector_page(doc: &mut Document, page_id: ObjectId, edit: &EditHistory) -> ExportResult<()> {
    let bounds = page_box(doc, page_id)?;
    let [x0, y0, x1, y1] = bounds;
    let page = Dimensions::new(x1 - x0, y1 - y0);

    let content = doc.get_page_content(page_id)?;
    let resources = inherited_attribute(doc, page_id, b"Resources")
        .cloned()
        .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));

    let mut form = Dictionary::new();
    form.set("Type", name("XObject"));
    form.set("Subtype", name("Form"));
    form.set("BBox", box_object(bounds));
    form.set("Resources", resources);
    let form_id = doc.add_object(Stream::new(form, content));

    let transform = solve(page, page, edit);
    let [a, b, c, d, e, f] = transform.pdf_matrix();
    let source = transform.source_rect;
    // Source rect is top-left based; the form lives in bottom-left page space
    let source_bottom = page.height - source.y - source.height;

    let body = vec![
        Operation::new("cm", vec![real(a), real(b), real(c), real(d), real(e + x0), real(f + y0)]),
        Operation::new("re", vec![real(0.0), real(0.0), real(source.width), real(source.height)]),
        Operation::new("W", vec![]),
        Operation::new("n", vec![]),
        Operation::new(
            "cm",
            vec![
                real(1.0),
                real(0.0),
                real(0.0),
                real(1.0),
                real(-(x0 + source.x)),
                real(-(y0 + source_bottom)),
            ],
        ),
        Operation::new("Do", vec![name("Fm0")]),
    ];

    replace_page_content(doc, page_id, bounds, page_operations(bounds, body), ("Fm0", form_id))
}

fn write_raster_page(
    doc: &mut Document,
    page_id: ObjectId,
    number: u32,
    edit: &EditHistory,
    options: &ExportOptions,
    source: &dyn DocumentSource,
) -> ExportResult<()> {
    if !source.renders_content() {
        return Err(ExportError::RasterUnavailable { page: number });
    }
    let bounds = page_box(doc, page_id)?;
    let [x0, y0, x1, y1] = bounds;

    let scale = if options.raster_scale > 0.0 && options.raster_scale.is_finite() {
        options.raster_scale
    } else {
        1.0
    };
    let pristine = source.rasterize(number, scale)?;
    let composed = draw_page(&pristine, edit, scale, options.color_mode);

    let (color_space, data): (&str, Vec<u8>) = match options.color_mode {
        ColorMode::Grayscale => ("DeviceGray", composed.pixels().map(|pixel| pixel.0[0]).collect()),
        ColorMode::Color => (
            "DeviceRGB",
            composed
                .pixels()
                .flat_map(|pixel| [pixel.0[0], pixel.0[1], pixel.0[2]])
                .collect(),
        ),
    };

    let mut image = Dictionary::new();
    image.set("Type", name("XObject"));
    image.set("Subtype", name("Image"));
    image.set("Width", Object::Integer(composed.width() as i64));
    image.set("Height", Object::Integer(composed.height() as i64));
    image.set("ColorSpace", name(color_space));
    image.set("BitsPerComponent", Object::Integer(8));
    let image_id = doc.add_object(Stream::new(image, data));

    let body = vec![
        Operation::new("cm", vec![real(x1 - x0), real(0.0), real(0.0), real(y1 - y0), real(x0), real(y0)]),
        Operation::new("Do", vec![name("Im0")]),
    ];
    replace_page_content(doc, page_id, bounds, page_operations(bounds, body), ("Im0", image_id))
}
