//! Geometric transform solver
//!
//! Turns an [`EditHistory`] into concrete draw parameters for both output
//! targets: the raster canvas (top-left origin, y down, clockwise rotation)
//! and the exported PDF (bottom-left origin, y up, counter-clockwise
//! rotation). Preview and export both go through [`solve`], so the two can
//! never disagree about where a page lands.
//!
//! The solver is pure: no I/O, no allocation, no failure. Degenerate inputs
//! produce finite values.

use crate::edit_history::EditHistory;
use crate::geometry::{Dimensions, Rect};

/// Fraction of the fitted size actually used, so rotated content never
/// touches the canvas edge
pub const FIT_MARGIN: f64 = 0.90;

/// Normalize a rotation in degrees into `0..360`
///
/// This is the only rotation normalization in the workspace; the compositor
/// and the export encoder both rely on it.
pub fn normalize_rotation(rotation: i32) -> u32 {
    rotation.rem_euclid(360) as u32
}

/// True for quarter turns that swap the page axes
pub fn is_rotated_90_or_270(rotation: i32) -> bool {
    matches!(normalize_rotation(rotation), 90 | 270)
}

/// Draw parameters derived from an edit
///
/// `draw_x`/`draw_y` are relative to the canvas center after the caller has
/// translated to `center + offset` and rotated by `rotation` degrees.
/// `pdf_draw_x`/`pdf_draw_y` are absolute page coordinates of the content's
/// local origin in PDF space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricTransform {
    /// Region of the original page that is drawn, in original-space units
    pub source_rect: Rect,

    /// Auto-fit factor; exactly 1.0 when the page is not rotated
    pub scale_to_fit: f64,

    /// `scale_to_fit` times the user scale
    pub final_scale: f64,

    pub draw_width: f64,
    pub draw_height: f64,
    pub draw_x: f64,
    pub draw_y: f64,

    pub pdf_draw_x: f64,
    pub pdf_draw_y: f64,

    /// Rotation in PDF convention (negated, degrees)
    pub pdf_rotation: f64,

    /// Normalized clockwise rotation in degrees
    pub rotation: u32,

    /// Target the transform was solved for
    pub target: Dimensions,

    pub offset_x: f64,
    pub offset_y: f64,
}

/// Solve the draw parameters for `edit` applied to a page of `original`
/// size, drawn onto a canvas (or page) of `target` size.
pub fn solve(original: Dimensions, target: Dimensions, edit: &EditHistory) -> GeometricTransform {
    let source_rect = match edit.crop_area {
        Some(crop) if !edit.is_pre_cropped() => crop.clamped().to_rect(original),
        _ => Rect::full(original),
    };

    let rotation = normalize_rotation(edit.rotation);
    let scale_to_fit = fit_scale(source_rect.size(), target, edit.rotation);
    let final_scale = scale_to_fit * edit.scale_factor();

    let draw_width = (source_rect.width * final_scale).max(0.0);
    let draw_height = (source_rect.height * final_scale).max(0.0);
    let draw_x = -draw_width / 2.0;
    let draw_y = -draw_height / 2.0;

    // PDF rotates counter-clockwise, the canvas clockwise
    let pdf_rotation = -(rotation as f64);
    let (sin, cos) = pdf_rotation.to_radians().sin_cos();
    let (center_x, center_y) = target.center();
    let pdf_draw_x = center_x + edit.offset_x + (draw_x * cos - draw_y * sin);
    // y grows downward on the canvas and upward in PDF space
    let pdf_draw_y = center_y - edit.offset_y + (draw_x * sin + draw_y * cos);

    GeometricTransform {
        source_rect,
        scale_to_fit,
        final_scale,
        draw_width,
        draw_height,
        draw_x,
        draw_y,
        pdf_draw_x,
        pdf_draw_y,
        pdf_rotation,
        rotation,
        target,
        offset_x: edit.offset_x,
        offset_y: edit.offset_y,
    }
}

/// Auto-fit factor for `source` drawn rotated onto `target`
///
/// Rotations other than quarter turns reuse the unrotated axes as an
/// approximate bounding box.
fn fit_scale(source: Dimensions, target: Dimensions, rotation: i32) -> f64 {
    if normalize_rotation(rotation) == 0 {
        return 1.0;
    }
    if source.width <= 0.0 || source.height <= 0.0 {
        return 1.0;
    }

    let (scale_x, scale_y) = if is_rotated_90_or_270(rotation) {
        (target.width / source.height, target.height / source.width)
    } else {
        (target.width / source.width, target.height / source.height)
    };

    scale_x.min(scale_y) * FIT_MARGIN
}

impl GeometricTransform {
    /// Affine matrix `[a b c d e f]` placing source-local PDF coordinates
    /// (origin at the bottom-left of `source_rect`) on the output page
    pub fn pdf_matrix(&self) -> [f64; 6] {
        let (sin, cos) = self.pdf_rotation.to_radians().sin_cos();
        let s = self.final_scale;
        [
            s * cos,
            s * sin,
            -s * sin,
            s * cos,
            self.pdf_draw_x,
            self.pdf_draw_y,
        ]
    }

    /// Map a canvas point back to the original-space point drawn there
    ///
    /// Inverse of translate(center + offset) · rotate(rotation) ·
    /// translate(draw_x, draw_y) · scale(final_scale).
    pub fn canvas_to_source(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.final_scale <= 0.0 || !self.final_scale.is_finite() {
            return None;
        }
        let (center_x, center_y) = self.target.center();
        let dx = x - (center_x + self.offset_x);
        let dy = y - (center_y + self.offset_y);

        let (sin, cos) = (self.rotation as f64).to_radians().sin_cos();
        let local_x = dx * cos + dy * sin;
        let local_y = -dx * sin + dy * cos;

        Some((
            self.source_rect.x + (local_x - self.draw_x) / self.final_scale,
            self.source_rect.y + (local_y - self.draw_y) / self.final_scale,
        ))
    }
}
