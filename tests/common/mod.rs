#![allow(dead_code)]

use std::path::Path;

use image::{Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use card_sheet_extract::{ExtractError, Rasterizer};

pub const PAGE_WIDTH: i64 = 842;
pub const PAGE_HEIGHT: i64 = 595;
pub const ART_W: i64 = 202;
pub const ART_H: i64 = 110;
pub const COLUMNS: [i64; 3] = [30, 300, 570];
pub const ROWS: [i64; 3] = [40, 225, 410];

/// Text placed with its baseline at (`x`, `baseline`) in top-left page coordinates.
#[derive(Debug, Clone)]
pub struct FixtureText {
    pub text: String,
    pub x: i64,
    pub baseline: i64,
    pub size: i64,
    pub bold: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    /// Filled rectangles as (left, top, width, height) in top-left page coordinates.
    pub rects: Vec<(i64, i64, i64, i64)>,
    pub texts: Vec<FixtureText>,
}

impl FixturePage {
    pub fn with_art_grid(mut self) -> Self {
        for top in ROWS {
            for left in COLUMNS {
                self.rects.push((left, top, ART_W, ART_H));
            }
        }
        self
    }

    /// Repeats `lines` inside every cell of the 3x3 grid, one line every 14 points.
    pub fn with_text_in_every_cell(mut self, lines: &[&str]) -> Self {
        for top in ROWS {
            for left in COLUMNS {
                for (offset, line) in (0_i64..).zip(lines) {
                    self.texts.push(FixtureText {
                        text: (*line).to_string(),
                        x: left + 20,
                        baseline: top + 30 + offset * 14,
                        size: 10,
                        bold: false,
                    });
                }
            }
        }
        self
    }
}

pub fn create_card_sheet(path: &Path, pages: &[FixturePage]) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut page_ids = Vec::new();
    for page in pages {
        let mut operations = Vec::new();
        for &(left, top, width, height) in &page.rects {
            operations.push(Operation::new(
                "re",
                vec![
                    left.into(),
                    (PAGE_HEIGHT - top - height).into(),
                    width.into(),
                    height.into(),
                ],
            ));
            operations.push(Operation::new("f", vec![]));
        }

        for text in &page.texts {
            let font = if text.bold { "F2" } else { "F1" };
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.into(), text.size.into()]),
                Operation::new("Td", vec![text.x.into(), (PAGE_HEIGHT - text.baseline).into()]),
                Operation::new("Tj", vec![Object::string_literal(text.text.as_str())]),
                Operation::new("ET", vec![]),
            ]);
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        page_ids.push(page_id);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<_>>(),
            "Count" => i64::try_from(page_ids.len())?,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(path)?;
    Ok(())
}

/// Renders every page as a flat color, one color per page.
pub struct FlatRasterizer {
    pub colors: Vec<[u8; 3]>,
}

impl Rasterizer for FlatRasterizer {
    fn render(&self, index: u32, dpi: u32) -> Result<RgbImage, ExtractError> {
        let color = self.colors[index as usize];
        let scale = dpi as f32 / 72.0;
        Ok(RgbImage::from_pixel(
            (PAGE_WIDTH as f32 * scale) as u32,
            (PAGE_HEIGHT as f32 * scale) as u32,
            Rgb(color),
        ))
    }
}
