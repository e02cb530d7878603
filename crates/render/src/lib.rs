//! Page Editor Render Library
//!
//! Geometry, the transform solver shared by preview and export, document
//! sources, the raster compositor, thumbnails and two-up sheets. The
//! `pdfium` feature adds a source that renders real page content.

pub mod compositor;
pub mod edit_history;
pub mod error;
pub mod geometry;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod sheet;
pub mod source;
pub mod thumbnail;
pub mod transform;

pub use compositor::{crop_to_page, draw, draw_page, ColorMode};
pub use edit_history::EditHistory;
pub use error::{RenderError, RenderResult};
pub use geometry::{CropArea, Dimensions, PageSizeCatalog, Rect};
pub use sheet::{compose_sheet, DEFAULT_SHEET_GAP};
pub use source::{open_document, DocumentSource, LopdfSource, RgbaImage};
pub use thumbnail::{full_thumbnail, generate_thumbnail, Thumbnail, ThumbnailTier};
pub use transform::{is_rotated_90_or_270, normalize_rotation, solve, GeometricTransform, FIT_MARGIN};
