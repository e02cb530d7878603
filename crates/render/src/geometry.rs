//! Geometry primitives shared by the solver, compositor and encoder
//!
//! All values are `f64` in device-independent units. Page sizes coming from a
//! PDF are in points (1/72 inch); raster sizes are in pixels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width and height of a page, raster or canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Dimensions of a raster in pixels
    pub fn of_raster(width: u32, height: u32) -> Self {
        Self::new(width as f64, height as f64)
    }

    /// Scale both axes by the same factor
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    pub fn center(self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Pixel size when rasterized, never smaller than 1x1
    pub fn to_pixels(self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

/// Axis-aligned rectangle with a top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering the full extent of `dims`
    pub fn full(dims: Dimensions) -> Self {
        Self::new(0.0, 0.0, dims.width, dims.height)
    }

    pub fn size(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Crop region normalized to 0..1 against the ORIGINAL page dimensions
///
/// A crop is never expressed relative to a previous crop; re-cropping a page
/// replaces the area instead of composing with it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropArea {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropArea {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Normalize a pixel-space rectangle against the canvas it was drawn on
    pub fn from_pixels(rect: Rect, canvas: Dimensions) -> Self {
        if canvas.width <= 0.0 || canvas.height <= 0.0 {
            return Self::new(0.0, 0.0, 1.0, 1.0);
        }
        Self::new(
            rect.x / canvas.width,
            rect.y / canvas.height,
            rect.width / canvas.width,
            rect.height / canvas.height,
        )
        .clamped()
    }

    /// Restrict every component to the unit square
    pub fn clamped(self) -> Self {
        let x = self.x.clamp(0.0, 1.0);
        let y = self.y.clamp(0.0, 1.0);
        Self::new(
            x,
            y,
            self.width.clamp(0.0, 1.0 - x),
            self.height.clamp(0.0, 1.0 - y),
        )
    }

    /// Scale against concrete page dimensions
    pub fn to_rect(&self, dims: Dimensions) -> Rect {
        Rect::new(
            self.x * dims.width,
            self.y * dims.height,
            self.width * dims.width,
            self.height * dims.height,
        )
    }

    /// Covers the whole page, i.e. crops nothing
    pub fn is_full_page(&self) -> bool {
        const EPS: f64 = 1e-9;
        self.x.abs() < EPS
            && self.y.abs() < EPS
            && (self.width - 1.0).abs() < EPS
            && (self.height - 1.0).abs() < EPS
    }
}

/// Named page sizes in points
#[derive(Debug, Clone)]
pub struct PageSizeCatalog {
    sizes: BTreeMap<String, Dimensions>,
}

impl PageSizeCatalog {
    /// Empty catalog, for hosts that provide their own sizes
    pub fn empty() -> Self {
        Self { sizes: BTreeMap::new() }
    }

    /// ISO A-series and the common North American sizes, portrait
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        catalog.insert("A3", Dimensions::new(841.89, 1190.55));
        catalog.insert("A4", Dimensions::new(595.28, 841.89));
        catalog.insert("A5", Dimensions::new(419.53, 595.28));
        catalog.insert("Letter", Dimensions::new(612.0, 792.0));
        catalog.insert("Legal", Dimensions::new(612.0, 1008.0));
        catalog.insert("Tabloid", Dimensions::new(792.0, 1224.0));
        catalog
    }

    pub fn insert(&mut self, name: impl Into<String>, dims: Dimensions) {
        self.sizes.insert(name.into(), dims);
    }

    pub fn get(&self, name: &str) -> Option<Dimensions> {
        self.sizes.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sizes.keys().map(String::as_str)
    }

    /// Find the catalog entry matching `dims` in either orientation
    ///
    /// `tolerance` is in the same unit as the catalog (points).
    pub fn identify(&self, dims: Dimensions, tolerance: f64) -> Option<&str> {
        self.sizes.iter().find_map(|(name, size)| {
            let portrait = (size.width - dims.width).abs() <= tolerance
                && (size.height - dims.height).abs() <= tolerance;
            let landscape = (size.width - dims.height).abs() <= tolerance
                && (size.height - dims.width).abs() <= tolerance;
            (portrait || landscape).then_some(name.as_str())
        })
    }
}

impl Default for PageSizeCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_from_pixels_normalizes_against_canvas() {
        let crop = CropArea::from_pixels(
            Rect::new(150.0, 200.0, 300.0, 400.0),
            Dimensions::new(600.0, 800.0),
        );
        assert_eq!(crop, CropArea::new(0.25, 0.25, 0.5, 0.5));
    }

    #[test]
    fn test_crop_clamps_to_unit_square() {
        let crop = CropArea::new(-0.1, 0.5, 2.0, 0.8).clamped();
        assert_eq!(crop.x, 0.0);
        assert_eq!(crop.width, 1.0);
        assert_eq!(crop.height, 0.5);
    }

    #[test]
    fn test_crop_to_rect_uses_original_dimensions() {
        let rect = CropArea::new(0.25, 0.25, 0.5, 0.5).to_rect(Dimensions::new(600.0, 800.0));
        assert_eq!(rect, Rect::new(150.0, 200.0, 300.0, 400.0));
    }

    #[test]
    fn test_catalog_identifies_both_orientations() {
        let catalog = PageSizeCatalog::standard();
        assert_eq!(catalog.identify(Dimensions::new(612.0, 792.0), 1.0), Some("Letter"));
        assert_eq!(catalog.identify(Dimensions::new(792.0, 612.0), 1.0), Some("Letter"));
        assert_eq!(catalog.identify(Dimensions::new(100.0, 100.0), 1.0), None);
    }

    #[test]
    fn test_to_pixels_never_returns_zero() {
        assert_eq!(Dimensions::new(0.2, 0.0).to_pixels(), (1, 1));
        assert_eq!(Dimensions::new(10.4, 20.6).to_pixels(), (10, 21));
    }
}
