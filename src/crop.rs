use image::{RgbImage, imageops};

use crate::model::{PageGeometry, Rect};

/// Cells whose shorter side is below this many pixels are never cards.
pub const MIN_CARD_PIXELS: u32 = 30;
pub const BLANK_BRIGHTNESS: f64 = 0.97;

/// Pixel-space box, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBox {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }
}

/// Maps a page-space rectangle onto the rendered page, clamped to its bounds.
#[must_use]
pub fn to_pixels(rect: &Rect, page: &PageGeometry, image: &RgbImage) -> PixelBox {
    let (width, height) = image.dimensions();
    let scale_x = width as f32 / page.width;
    let scale_y = height as f32 / page.height;
    let clamp = |value: f32, limit: u32| (value.max(0.0) as u32).min(limit);
    PixelBox {
        x0: clamp(rect.x0 * scale_x, width),
        y0: clamp(rect.y0 * scale_y, height),
        x1: clamp(rect.x1 * scale_x, width),
        y1: clamp(rect.y1 * scale_y, height),
    }
}

#[must_use]
pub fn crop_card(image: &RgbImage, page: &PageGeometry, rect: &Rect) -> RgbImage {
    let pixels = to_pixels(rect, page, image);
    imageops::crop_imm(image, pixels.x0, pixels.y0, pixels.width(), pixels.height()).to_image()
}

/// Degenerate or almost entirely white crops.
#[must_use]
pub fn is_blank(image: &RgbImage) -> bool {
    let (width, height) = image.dimensions();
    if width.min(height) < MIN_CARD_PIXELS {
        return true;
    }
    let raw = image.as_raw();
    let total = raw.iter().map(|&channel| u64::from(channel)).sum::<u64>();
    let mean = total as f64 / raw.len() as f64;
    mean / 255.0 > BLANK_BRIGHTNESS
}
