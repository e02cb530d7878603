//! Two-up sheet composition
//!
//! A sheet places two page rasters side by side on one landscape canvas.
//! Each slot is outlined with a thin guide so the page boundaries stay
//! visible when the pages themselves are white.

use crate::source::RgbaImage;
use image::{imageops, Rgba};

/// Default gap between slots and around the sheet, in pixels
pub const DEFAULT_SHEET_GAP: u32 = 24;

const GUIDE: Rgba<u8> = Rgba([200, 200, 200, 255]);
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Lay `left` and `right` out on a two-up landscape sheet
///
/// An odd trailing page passes `None` for `right` and gets an empty outlined
/// slot. Both slots share the larger page's size; smaller pages are centered.
pub fn compose_sheet(left: &RgbaImage, right: Option<&RgbaImage>, gap: u32) -> RgbaImage {
    let slot_w = left.width().max(right.map_or(0, |r| r.width())).max(1);
    let slot_h = left.height().max(right.map_or(0, |r| r.height())).max(1);

    let content_w = slot_w * 2 + gap;
    let sheet_h = slot_h + gap * 2;
    // Very tall pages would otherwise produce a portrait sheet
    let sheet_w = (content_w + gap * 2).max(sheet_h + 1);

    let mut sheet = RgbaImage::from_pixel(sheet_w, sheet_h, BACKGROUND);
    let left_x = (sheet_w - content_w) / 2;
    let right_x = left_x + slot_w + gap;

    place(&mut sheet, Some(left), left_x, gap, slot_w, slot_h);
    place(&mut sheet, right, right_x, gap, slot_w, slot_h);
    sheet
}

fn place(sheet: &mut RgbaImage, page: Option<&RgbaImage>, x: u32, y: u32, slot_w: u32, slot_h: u32) {
    if let Some(page) = page {
        let px = x + (slot_w - page.width()) / 2;
        let py = y + (slot_h - page.height()) / 2;
        imageops::replace(sheet, page, px as i64, py as i64);
    }
    outline(sheet, x, y, slot_w, slot_h);
}

/// One-pixel guide just outside the slot
fn outline(sheet: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32) {
    let left = x.saturating_sub(1);
    let top = y.saturating_sub(1);
    let right = (x + w).min(sheet.width() - 1);
    let bottom = (y + h).min(sheet.height() - 1);
    for gx in left..=right {
        sheet.put_pixel(gx, top, GUIDE);
        sheet.put_pixel(gx, bottom, GUIDE);
    }
    for gy in top..=bottom {
        sheet.put_pixel(left, gy, GUIDE);
        sheet.put_pixel(right, gy, GUIDE);
    }
}
