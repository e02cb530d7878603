//! Persisted per-page edit record
//!
//! `EditHistory` is the only interchange format between the editing session
//! and export. It is stored as camelCase JSON and must round-trip unchanged.

use crate::geometry::CropArea;
use serde::{Deserialize, Serialize};

/// Default user scale in percent
pub const DEFAULT_SCALE: f64 = 100.0;

fn default_scale() -> f64 {
    DEFAULT_SCALE
}

/// Geometric edits applied to one page
///
/// `rotation` is kept exactly as entered (e.g. `-90` or `450`); consumers
/// normalize it through [`crate::transform::normalize_rotation`]. Offsets are
/// in page units (points); raster paths scale them by their pixel density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditHistory {
    #[serde(default)]
    pub rotation: i32,

    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default)]
    pub offset_x: f64,

    #[serde(default)]
    pub offset_y: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_area: Option<CropArea>,

    /// The source raster was already cropped and re-centered on a page-sized
    /// canvas; the solver must not crop it again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cropped: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_crop_to_page: Option<bool>,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self {
            rotation: 0,
            scale: DEFAULT_SCALE,
            offset_x: 0.0,
            offset_y: 0.0,
            crop_area: None,
            is_cropped: None,
            fit_crop_to_page: None,
        }
    }
}

impl EditHistory {
    pub fn with_rotation(mut self, rotation: i32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_offset(mut self, offset_x: f64, offset_y: f64) -> Self {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
        self
    }

    /// Attach a committed crop; the raster it applies to is pre-centered
    pub fn with_crop(mut self, crop: CropArea, fit_to_page: bool) -> Self {
        self.crop_area = Some(crop.clamped());
        self.is_cropped = Some(true);
        self.fit_crop_to_page = Some(fit_to_page);
        self
    }

    pub fn has_crop(&self) -> bool {
        self.crop_area.is_some_and(|crop| !crop.is_full_page())
    }

    pub fn is_pre_cropped(&self) -> bool {
        self.is_cropped.unwrap_or(false) && self.crop_area.is_some()
    }

    pub fn fits_crop_to_page(&self) -> bool {
        self.fit_crop_to_page.unwrap_or(false)
    }

    /// User scale as a factor, falling back to 1.0 for non-positive input
    pub fn scale_factor(&self) -> f64 {
        if self.scale > 0.0 && self.scale.is_finite() {
            self.scale / 100.0
        } else {
            1.0
        }
    }

    /// True when applying this history changes nothing
    pub fn is_identity(&self) -> bool {
        crate::transform::normalize_rotation(self.rotation) == 0
            && (self.scale_factor() - 1.0).abs() < f64::EPSILON
            && self.offset_x == 0.0
            && self.offset_y == 0.0
            && !self.has_crop()
    }

    /// Copy with offsets converted from page units into raster pixels
    pub fn with_offsets_scaled(&self, pixels_per_unit: f64) -> Self {
        Self {
            offset_x: self.offset_x * pixels_per_unit,
            offset_y: self.offset_y * pixels_per_unit,
            ..self.clone()
        }
    }
}
