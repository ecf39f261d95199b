//! Domain detection from the badge printed in the corner of ability cards.

use image::RgbImage;

use crate::model::Domain;

pub type Rgb = (u8, u8, u8);

/// Returned when a region has no usable colored pixel.
pub const NEUTRAL_GRAY: Rgb = (128, 128, 128);

/// Badge colors sampled from known cards. Order is the tie-break order.
pub const REFERENCE_PALETTE: [(Domain, Rgb); 9] = [
    (Domain::Arcano, (141, 94, 133)),
    (Domain::Lama, (172, 67, 47)),
    (Domain::Osso, (231, 211, 139)),
    (Domain::Codice, (61, 100, 137)),
    (Domain::Grazia, (199, 83, 127)),
    (Domain::Mezzanotte, (195, 176, 103)),
    (Domain::Saggio, (41, 120, 61)),
    (Domain::Splendore, (219, 188, 19)),
    (Domain::Valore, (207, 120, 27)),
];

const WHITE_LEVEL: u8 = 210;
const BLACK_LEVEL: u8 = 30;
const MIN_SATURATION: u8 = 20;
const MIN_SATURATED_PIXELS: usize = 8;

/// Fractional sub-region of an image, `x` and `y` as `(start, end)` in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: (f32, f32),
    pub y: (f32, f32),
}

impl Default for Region {
    fn default() -> Self {
        Self {
            x: (0.0, 0.25),
            y: (0.0, 0.25),
        }
    }
}

fn is_white(&[r, g, b]: &[u8; 3]) -> bool {
    r > WHITE_LEVEL && g > WHITE_LEVEL && b > WHITE_LEVEL
}

fn is_black(&[r, g, b]: &[u8; 3]) -> bool {
    r < BLACK_LEVEL && g < BLACK_LEVEL && b < BLACK_LEVEL
}

fn is_saturated(&[r, g, b]: &[u8; 3]) -> bool {
    r.max(g).max(b) - r.min(g).min(b) > MIN_SATURATION
}

fn mean(pixels: &[[u8; 3]]) -> Option<Rgb> {
    if pixels.is_empty() {
        return None;
    }
    let mut sums = [0_u64; 3];
    for pixel in pixels {
        for (sum, channel) in sums.iter_mut().zip(pixel) {
            *sum += u64::from(*channel);
        }
    }
    let count = pixels.len() as u64;
    let channel = |sum: u64| u8::try_from(sum / count).unwrap_or(u8::MAX);
    Some((channel(sums[0]), channel(sums[1]), channel(sums[2])))
}

/// Mean color of the colored, saturated pixels inside `region`.
#[must_use]
pub fn dominant_color(image: &RgbImage, region: Region) -> Rgb {
    let (width, height) = image.dimensions();
    let x0 = (region.x.0 * width as f32) as u32;
    let x1 = ((region.x.1 * width as f32) as u32).max(1).min(width);
    let y0 = (region.y.0 * height as f32) as u32;
    let y1 = ((region.y.1 * height as f32) as u32).max(1).min(height);
    if x0 >= x1 || y0 >= y1 {
        return NEUTRAL_GRAY;
    }

    let colored = (y0..y1)
        .flat_map(|y| (x0..x1).map(move |x| (x, y)))
        .map(|(x, y)| image.get_pixel(x, y).0)
        .filter(|pixel| !is_white(pixel) && !is_black(pixel))
        .collect::<Vec<_>>();
    let saturated = colored
        .iter()
        .copied()
        .filter(is_saturated)
        .collect::<Vec<_>>();

    let chosen = if saturated.len() < MIN_SATURATED_PIXELS {
        &colored
    } else {
        &saturated
    };
    mean(chosen).unwrap_or(NEUTRAL_GRAY)
}

fn distance((r, g, b): Rgb, (dr, dg, db): Rgb) -> f64 {
    let dr = f64::from(r) - f64::from(dr);
    let dg = f64::from(g) - f64::from(dg);
    let db = f64::from(b) - f64::from(db);
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Nearest palette domain and its distance. Exact ties keep the earlier entry.
#[must_use]
pub fn classify_with_distance(rgb: Rgb) -> (Domain, f64) {
    let mut best = (Domain::Unknown, f64::INFINITY);
    for (domain, reference) in REFERENCE_PALETTE {
        let dist = distance(rgb, reference);
        if dist < best.1 {
            best = (domain, dist);
        }
    }
    best
}

#[must_use]
pub fn classify(rgb: Rgb) -> Domain {
    classify_with_distance(rgb).0
}
