//! Raster compositor
//!
//! Draws a pristine page raster through the solver onto a fresh canvas. The
//! pristine raster is only ever read; every call allocates a new output, so
//! drawing the same edit twice yields identical pixels.

use crate::edit_history::EditHistory;
use crate::geometry::{CropArea, Dimensions, Rect};
use crate::source::RgbaImage;
use crate::transform::{solve, GeometricTransform};
use image::Rgba;
use serde::{Deserialize, Serialize};

/// Output color handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Color,
    Grayscale,
}

impl std::str::FromStr for ColorMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "color" | "colour" => Ok(Self::Color),
            "grayscale" | "greyscale" | "gray" | "grey" => Ok(Self::Grayscale),
            other => Err(format!("unknown color mode: {other}")),
        }
    }
}

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Draw `pristine` with `edit` applied onto a white canvas of `target` size
///
/// Offsets in `edit` must already be in raster pixels. Content is drawn on a
/// transparent offscreen canvas first, filtered, then composited over white,
/// so grayscale never bleeds into the page background.
pub fn draw(
    pristine: &RgbaImage,
    edit: &EditHistory,
    target: Dimensions,
    color_mode: ColorMode,
) -> RgbaImage {
    let cropped;
    let source = match (edit.is_pre_cropped(), edit.crop_area) {
        (true, Some(crop)) => {
            cropped = crop_to_page(pristine, crop, edit.fits_crop_to_page());
            &cropped
        }
        _ => pristine,
    };

    let transform = solve(
        Dimensions::of_raster(source.width(), source.height()),
        target,
        edit,
    );

    let (width, height) = target.to_pixels();
    let mut offscreen = RgbaImage::from_pixel(width, height, TRANSPARENT);
    draw_transformed(source, &transform, &mut offscreen);

    if color_mode == ColorMode::Grayscale {
        grayscale_in_place(&mut offscreen);
    }

    composite_over_white(&offscreen)
}

/// Draw a page at its own raster size, converting point offsets to pixels
pub fn draw_page(
    pristine: &RgbaImage,
    edit: &EditHistory,
    pixels_per_point: f64,
    color_mode: ColorMode,
) -> RgbaImage {
    draw(
        pristine,
        &edit.with_offsets_scaled(pixels_per_point),
        Dimensions::of_raster(pristine.width(), pristine.height()),
        color_mode,
    )
}

/// Cut `crop` out of `pristine` and re-center it on a page-sized canvas
///
/// With `fit_to_page` the region is scaled uniformly until it fills the page
/// along its tighter axis; otherwise it keeps its native pixel size.
pub fn crop_to_page(pristine: &RgbaImage, crop: CropArea, fit_to_page: bool) -> RgbaImage {
    let page = Dimensions::of_raster(pristine.width(), pristine.height());
    let region = crop.clamped().to_rect(page);
    let mut canvas = RgbaImage::from_pixel(pristine.width(), pristine.height(), WHITE);
    if region.width < 1.0 || region.height < 1.0 {
        return canvas;
    }

    let scale = if fit_to_page {
        (page.width / region.width).min(page.height / region.height)
    } else {
        1.0
    };
    let placed = Rect::new(
        (page.width - region.width * scale) / 2.0,
        (page.height - region.height * scale) / 2.0,
        region.width * scale,
        region.height * scale,
    );

    blit_scaled(pristine, region, &mut canvas, placed);
    canvas
}

/// Copy `src_rect` of `src` into `dst_rect` of `dst`, bilinear sampled
pub fn blit_scaled(src: &RgbaImage, src_rect: Rect, dst: &mut RgbaImage, dst_rect: Rect) {
    if dst_rect.width <= 0.0 || dst_rect.height <= 0.0 {
        return;
    }
    let scale_x = src_rect.width / dst_rect.width;
    let scale_y = src_rect.height / dst_rect.height;

    let x_start = dst_rect.x.max(0.0).floor() as u32;
    let y_start = dst_rect.y.max(0.0).floor() as u32;
    let x_end = (dst_rect.right().ceil().max(0.0) as u32).min(dst.width());
    let y_end = (dst_rect.bottom().ceil().max(0.0) as u32).min(dst.height());

    for y in y_start..y_end {
        let cy = y as f64 + 0.5;
        if cy < dst_rect.y || cy >= dst_rect.bottom() {
            continue;
        }
        for x in x_start..x_end {
            let cx = x as f64 + 0.5;
            if cx < dst_rect.x || cx >= dst_rect.right() {
                continue;
            }
            let sx = src_rect.x + (cx - dst_rect.x) * scale_x;
            let sy = src_rect.y + (cy - dst_rect.y) * scale_y;
            dst.put_pixel(x, y, sample_bilinear(src, sx, sy, src_rect));
        }
    }
}

fn draw_transformed(source: &RgbaImage, transform: &GeometricTransform, canvas: &mut RgbaImage) {
    let rect = transform.source_rect;
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }

    for y in 0..canvas.height() {
        for x in 0..canvas.width() {
            let Some((sx, sy)) = transform.canvas_to_source(x as f64 + 0.5, y as f64 + 0.5) else {
                return;
            };
            if sx < rect.x || sy < rect.y || sx >= rect.right() || sy >= rect.bottom() {
                continue;
            }
            canvas.put_pixel(x, y, sample_bilinear(source, sx, sy, rect));
        }
    }
}

/// Bilinear sample at continuous coordinates, restricted to `bounds`
fn sample_bilinear(image: &RgbaImage, x: f64, y: f64, bounds: Rect) -> Rgba<u8> {
    let max_x = (image.width() as f64 - 1.0).max(0.0);
    let max_y = (image.height() as f64 - 1.0).max(0.0);
    let min_bx = bounds.x.floor().clamp(0.0, max_x);
    let min_by = bounds.y.floor().clamp(0.0, max_y);
    let max_bx = (bounds.right().ceil() - 1.0).clamp(min_bx, max_x);
    let max_by = (bounds.bottom().ceil() - 1.0).clamp(min_by, max_y);

    // Pixel centers sit at +0.5
    let fx = (x - 0.5).clamp(min_bx, max_bx);
    let fy = (y - 0.5).clamp(min_by, max_by);
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let x1 = (x0 + 1.0).min(max_bx);
    let y1 = (y0 + 1.0).min(max_by);

    let p00 = image.get_pixel(x0 as u32, y0 as u32).0;
    let p10 = image.get_pixel(x1 as u32, y0 as u32).0;
    let p01 = image.get_pixel(x0 as u32, y1 as u32).0;
    let p11 = image.get_pixel(x1 as u32, y1 as u32).0;

    let mut out = [0u8; 4];
    for channel in 0..4 {
        let top = p00[channel] as f64 * (1.0 - tx) + p10[channel] as f64 * tx;
        let bottom = p01[channel] as f64 * (1.0 - tx) + p11[channel] as f64 * tx;
        out[channel] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Rec. 601 luma, alpha untouched
pub fn grayscale_in_place(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let luma = ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8;
        *pixel = Rgba([luma, luma, luma, a]);
    }
}

/// Flatten an image with alpha onto an opaque white background
pub fn composite_over_white(image: &RgbaImage) -> RgbaImage {
    let mut out = RgbaImage::new(image.width(), image.height());
    for (dst, src) in out.pixels_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        *dst = Rgba([blend(r), blend(g), blend(b), 255]);
    }
    out
}
