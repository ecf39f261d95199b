//! Raster fallback for pages that carry no vector layout hints.

use image::{GrayImage, Luma, RgbImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;
use imageproc::point::Point;

use crate::grid::{GridContext, GridStrategy};
use crate::model::{CardCell, GridMethod, PageGeometry, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageContourStrategy {
    /// Gray level above which a pixel counts as page background.
    pub background_threshold: u8,
    /// Closing radius; 2 gives a 5x5 square element.
    pub close_radius: u8,
    pub min_area_fraction: f64,
    pub max_area_fraction: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub max_area_deviation: f32,
}

impl Default for ImageContourStrategy {
    fn default() -> Self {
        Self {
            background_threshold: 225,
            close_radius: 2,
            min_area_fraction: 0.04,
            max_area_fraction: 0.45,
            min_aspect: 0.35,
            max_aspect: 1.1,
            max_area_deviation: 0.30,
        }
    }
}

impl GridStrategy for ImageContourStrategy {
    fn method(&self) -> GridMethod {
        GridMethod::ImageContours
    }

    fn cells(&self, context: &GridContext<'_>) -> Option<Vec<CardCell>> {
        let image = context.image?;
        let rects = self.detect(image, context.page);
        if rects.is_empty() {
            return None;
        }
        Some(rects.into_iter().map(|rect| CardCell { rect }).collect())
    }
}

impl ImageContourStrategy {
    /// Card-sized blobs on the rendered page, in page points.
    #[must_use]
    pub fn detect(&self, image: &RgbImage, page: &PageGeometry) -> Vec<Rect> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let mask = close(&self.foreground_mask(image), Norm::LInf, self.close_radius);
        let page_area = f64::from(width) * f64::from(height);
        let min_area = page_area * self.min_area_fraction;
        let max_area = page_area * self.max_area_fraction;
        let scale_x = page.width / width as f32;
        let scale_y = page.height / height as f32;

        let mut rects = Vec::new();
        for contour in find_contours::<i32>(&mask) {
            if contour.border_type != BorderType::Outer || contour.parent.is_some() {
                continue;
            }
            let area = polygon_area(&contour.points);
            if area <= min_area || area >= max_area {
                continue;
            }
            let Some((x, y, w, h)) = bounding_box(&contour.points) else {
                continue;
            };
            let aspect = f64::from(w) / f64::from(h.max(1));
            if aspect <= self.min_aspect || aspect >= self.max_aspect {
                continue;
            }
            rects.push(Rect::new(
                x as f32 * scale_x,
                y as f32 * scale_y,
                (x + w) as f32 * scale_x,
                (y + h) as f32 * scale_y,
            ));
        }

        if rects.len() < 2 {
            return Vec::new();
        }
        self.drop_area_outliers(rects)
    }

    fn foreground_mask(&self, image: &RgbImage) -> GrayImage {
        let gray = imageops::grayscale(image);
        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            if gray.get_pixel(x, y)[0] > self.background_threshold {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    fn drop_area_outliers(&self, rects: Vec<Rect>) -> Vec<Rect> {
        let mut areas = rects.iter().map(Rect::area).collect::<Vec<_>>();
        areas.sort_by(f32::total_cmp);
        let median = areas[areas.len() / 2];
        if median <= 0.0 {
            return Vec::new();
        }
        rects
            .into_iter()
            .filter(|rect| (rect.area() - median).abs() / median < self.max_area_deviation)
            .collect()
    }
}

/// Shoelace area of a closed contour.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0_i64;
    for (index, current) in points.iter().enumerate() {
        let next = points[(index + 1) % points.len()];
        twice_area += i64::from(current.x) * i64::from(next.y) - i64::from(next.x) * i64::from(current.y);
    }
    twice_area.abs() as f64 / 2.0
}

fn bounding_box(points: &[Point<i32>]) -> Option<(i32, i32, i32, i32)> {
    let min_x = points.iter().map(|point| point.x).min()?;
    let max_x = points.iter().map(|point| point.x).max()?;
    let min_y = points.iter().map(|point| point.y).min()?;
    let max_y = points.iter().map(|point| point.y).max()?;
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}
