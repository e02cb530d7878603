//! Thumbnail encoding
//!
//! Every thumbnail in the engine goes through [`generate_thumbnail`], whether
//! it comes from the initial load, a re-render after an edit, or apply-all.
//! One routine keeps the thumbnail strip visually consistent.

use crate::error::RenderResult;
use crate::source::RgbaImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Downscale factor for preview thumbnails
pub const THUMBNAIL_SCALE: f64 = 0.5;

/// JPEG quality for preview thumbnails
pub const THUMBNAIL_QUALITY: u8 = 60;

/// JPEG quality for full-resolution thumbnails
pub const FULL_QUALITY: u8 = 92;

/// Fidelity of a stored thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailTier {
    /// Nothing rendered yet
    Placeholder,
    /// Half-resolution JPEG
    Preview,
    /// Full-resolution JPEG
    Full,
}

/// Encoded thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub tier: ThumbnailTier,
    pub width: u32,
    pub height: u32,
    /// JPEG bytes, empty for placeholders
    pub jpeg: Arc<[u8]>,
}

impl Thumbnail {
    pub fn placeholder() -> Self {
        Self {
            tier: ThumbnailTier::Placeholder,
            width: 0,
            height: 0,
            jpeg: Arc::from(Vec::<u8>::new()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.tier == ThumbnailTier::Placeholder
    }

    pub fn decode(&self) -> RenderResult<RgbaImage> {
        Ok(image::load_from_memory_with_format(&self.jpeg, ImageFormat::Jpeg)?.to_rgba8())
    }
}

/// Half-resolution, quality-60 JPEG of `raster`
pub fn generate_thumbnail(raster: &RgbaImage) -> RenderResult<Thumbnail> {
    encode(raster, THUMBNAIL_SCALE, THUMBNAIL_QUALITY, ThumbnailTier::Preview)
}

/// Full-resolution JPEG of `raster`
pub fn full_thumbnail(raster: &RgbaImage) -> RenderResult<Thumbnail> {
    encode(raster, 1.0, FULL_QUALITY, ThumbnailTier::Full)
}

fn encode(raster: &RgbaImage, scale: f64, quality: u8, tier: ThumbnailTier) -> RenderResult<Thumbnail> {
    let width = ((raster.width() as f64 * scale).round() as u32).max(1);
    let height = ((raster.height() as f64 * scale).round() as u32).max(1);

    let resized = if (width, height) == raster.dimensions() {
        raster.clone()
    } else {
        imageops::resize(raster, width, height, FilterType::Triangle)
    };
    // JPEG has no alpha channel; rasters are already opaque
    let rgb = DynamicImage::ImageRgba8(resized).to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&rgb)?;

    Ok(Thumbnail {
        tier,
        width,
        height,
        jpeg: Arc::from(jpeg),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::placeholder_raster;

    #[test]
    fn test_preview_is_half_size_jpeg() {
        let thumb = generate_thumbnail(&placeholder_raster(200, 300, 1)).unwrap();
        assert_eq!(thumb.tier, ThumbnailTier::Preview);
        assert_eq!((thumb.width, thumb.height), (100, 150));
        assert_eq!(&thumb.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(thumb.decode().unwrap().dimensions(), (100, 150));
    }

    #[test]
    fn test_full_tier_keeps_resolution() {
        let thumb = full_thumbnail(&placeholder_raster(64, 48, 2)).unwrap();
        assert_eq!(thumb.tier, ThumbnailTier::Full);
        assert_eq!((thumb.width, thumb.height), (64, 48));
    }

    #[test]
    fn test_tiny_raster_still_encodes() {
        let thumb = generate_thumbnail(&RgbaImage::new(1, 1)).unwrap();
        assert_eq!((thumb.width, thumb.height), (1, 1));
    }

    #[test]
    fn test_tiers_order_by_fidelity() {
        assert!(ThumbnailTier::Placeholder < ThumbnailTier::Preview);
        assert!(ThumbnailTier::Preview < ThumbnailTier::Full);
        assert!(Thumbnail::placeholder().is_placeholder());
    }
}
