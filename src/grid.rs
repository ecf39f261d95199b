//! Card cell location.
//!
//! A page is tried against an ordered list of [`GridStrategy`] objects; the
//! first one that yields at least one non-empty cell decides the layout.
//! Vector art boxes are the most reliable signal, a grid borrowed from
//! another page of the same document comes next, and contour detection on
//! the rendered pixels is the last resort.

use image::RgbImage;
use tracing::debug;

use crate::cluster::{DEFAULT_GAP, cluster};
use crate::contour::ImageContourStrategy;
use crate::model::{CardCell, GridMethod, GridParameters, PageGeometry, Rect};

/// Nominal size of the art frame printed on each domain card.
pub const ART_WIDTH: f32 = 201.9;
pub const ART_HEIGHT: f32 = 110.4;
pub const ART_TOLERANCE: f32 = 0.12;

/// Inset applied to every grid slot to stay clear of neighbour bleed.
pub const CELL_INSET: f32 = 2.0;

const ORDER_BUCKET: f32 = 10.0;

/// Everything a strategy may look at for one page.
#[derive(Debug, Clone, Copy)]
pub struct GridContext<'a> {
    pub page: &'a PageGeometry,
    pub image: Option<&'a RgbImage>,
    pub reference: Option<&'a GridParameters>,
}

pub trait GridStrategy {
    fn method(&self) -> GridMethod;

    /// Candidate cells, or `None` when the strategy does not apply.
    fn cells(&self, context: &GridContext<'_>) -> Option<Vec<CardCell>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArtBoxStrategy;

impl GridStrategy for ArtBoxStrategy {
    fn method(&self) -> GridMethod {
        GridMethod::ArtBoxes
    }

    fn cells(&self, context: &GridContext<'_>) -> Option<Vec<CardCell>> {
        let params = params_from_art_boxes(context.page)?;
        build_grid(context.page, &params)
    }
}

/// Applies the document's reference grid to pages without art boxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceGridStrategy;

impl GridStrategy for ReferenceGridStrategy {
    fn method(&self) -> GridMethod {
        GridMethod::ReferenceGrid
    }

    fn cells(&self, context: &GridContext<'_>) -> Option<Vec<CardCell>> {
        if !art_boxes(context.page).is_empty() {
            return None;
        }
        build_grid(context.page, context.reference?)
    }
}

pub struct GridLocator {
    strategies: Vec<Box<dyn GridStrategy>>,
}

impl GridLocator {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn GridStrategy>>) -> Self {
        Self { strategies }
    }

    /// Ordered cells for the page and the strategy that produced them.
    #[must_use]
    pub fn locate(&self, context: &GridContext<'_>) -> (Vec<CardCell>, GridMethod) {
        for strategy in &self.strategies {
            let Some(mut cells) = strategy.cells(context) else {
                continue;
            };
            cells.retain(|cell| !cell.rect.is_empty());
            if cells.is_empty() {
                debug!(method = %strategy.method(), "strategy produced only empty cells");
                continue;
            }
            sort_cells(&mut cells);
            return (cells, strategy.method());
        }
        (Vec::new(), GridMethod::None)
    }
}

impl Default for GridLocator {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ArtBoxStrategy),
            Box::new(ReferenceGridStrategy),
            Box::new(ImageContourStrategy::default()),
        ])
    }
}

fn within_tolerance(value: f32, nominal: f32) -> bool {
    (value - nominal).abs() / nominal < ART_TOLERANCE
}

#[must_use]
pub fn art_boxes(page: &PageGeometry) -> Vec<Rect> {
    page.rects
        .iter()
        .filter(|rect| {
            rect.width() > 0.0
                && rect.height() > 0.0
                && within_tolerance(rect.width(), ART_WIDTH)
                && within_tolerance(rect.height(), ART_HEIGHT)
        })
        .copied()
        .collect()
}

#[must_use]
pub fn params_from_art_boxes(page: &PageGeometry) -> Option<GridParameters> {
    let boxes = art_boxes(page);
    if boxes.is_empty() {
        return None;
    }

    let column_starts = cluster(&boxes.iter().map(|rect| rect.x0).collect::<Vec<_>>(), DEFAULT_GAP);
    let row_starts = cluster(&boxes.iter().map(|rect| rect.y0).collect::<Vec<_>>(), DEFAULT_GAP);
    let (Some(&first_col), Some(&last_col)) = (column_starts.first(), column_starts.last()) else {
        return None;
    };
    let (Some(&first_row), Some(&last_row)) = (row_starts.first(), row_starts.last()) else {
        return None;
    };

    let column_count = column_starts.len();
    let row_count = row_starts.len();
    let column_span = if column_count > 1 {
        (last_col - first_col) / (column_count - 1) as f32
    } else {
        page.width - 2.0 * first_col
    };
    let row_span = if row_count > 1 {
        (last_row - first_row) / (row_count - 1) as f32
    } else {
        page.height / row_count as f32
    };
    let top_margin = ((page.height - row_count as f32 * row_span) / 2.0).max(0.0);

    Some(GridParameters {
        column_starts,
        column_span,
        row_span,
        top_margin,
        row_count,
    })
}

/// Lays out one inset cell per (row, column); `None` if the grid is unusable.
#[must_use]
pub fn build_grid(page: &PageGeometry, params: &GridParameters) -> Option<Vec<CardCell>> {
    if params.row_count == 0 || params.column_starts.is_empty() {
        return None;
    }

    let mut cells = Vec::with_capacity(params.row_count * params.column_count());
    for row in 0..params.row_count {
        for &x0 in &params.column_starts {
            let cell_x0 = x0 + CELL_INSET;
            let cell_y0 = params.top_margin + row as f32 * params.row_span + CELL_INSET;
            let cell_x1 = (page.width - 1.0).min(x0 + params.column_span - CELL_INSET);
            let cell_y1 = (page.height - 1.0).min(cell_y0 + params.row_span - 2.0 * CELL_INSET);
            let rect = Rect::new(cell_x0, cell_y0, cell_x1, cell_y1);
            if !rect.is_empty() {
                cells.push(CardCell { rect });
            }
        }
    }

    if cells.is_empty() {
        return None;
    }
    Some(cells)
}

fn bucket(value: f32) -> i64 {
    (value / ORDER_BUCKET).round_ties_even() as i64
}

/// Row-bucket then column order, with raw coordinates as the final tie-break.
pub fn sort_cells(cells: &mut [CardCell]) {
    cells.sort_by(|a, b| {
        bucket(a.rect.y0)
            .cmp(&bucket(b.rect.y0))
            .then(bucket(a.rect.x0).cmp(&bucket(b.rect.x0)))
            .then(a.rect.y0.total_cmp(&b.rect.y0))
            .then(a.rect.x0.total_cmp(&b.rect.x0))
    });
}

/// First page whose art boxes form a complete 3x3 grid.
pub fn scan_reference<I>(pages: I) -> Option<GridParameters>
where
    I: IntoIterator<Item = PageGeometry>,
{
    pages
        .into_iter()
        .filter_map(|page| params_from_art_boxes(&page))
        .find(GridParameters::is_complete_3x3)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect as PixelRect;

    use super::{
        ART_HEIGHT, ART_WIDTH, GridContext, GridLocator, build_grid, params_from_art_boxes,
        scan_reference, sort_cells,
    };
    use crate::model::{CardCell, GridMethod, PageGeometry, Rect};

    fn art_box(x0: f32, y0: f32) -> Rect {
        Rect::new(x0, y0, x0 + ART_WIDTH, y0 + ART_HEIGHT)
    }

    fn page(rects: Vec<Rect>) -> PageGeometry {
        PageGeometry {
            width: 842.0,
            height: 595.0,
            rects,
        }
    }

    fn full_grid_page() -> PageGeometry {
        let mut rects = Vec::new();
        for y in [40.0, 225.0, 410.0] {
            for x in [30.0, 300.0, 570.0] {
                rects.push(art_box(x, y));
            }
        }
        page(rects)
    }

    fn locate(page: &PageGeometry, reference: Option<&crate::model::GridParameters>) -> (Vec<CardCell>, GridMethod) {
        GridLocator::default().locate(&GridContext {
            page,
            image: None,
            reference,
        })
    }

    #[test]
    fn single_row_of_art_boxes_yields_three_cells() {
        let page = page(vec![art_box(570.0, 60.0), art_box(30.0, 60.0), art_box(300.0, 61.5)]);

        let (cells, method) = locate(&page, None);

        assert_eq!(method, GridMethod::ArtBoxes);
        assert_eq!(cells.len(), 3);
        assert!(cells[0].rect.x0 < cells[1].rect.x0);
        assert!(cells[1].rect.x0 < cells[2].rect.x0);
        assert!((cells[0].rect.x0 - 32.0).abs() < 1e-3);
    }

    #[test]
    fn ignores_rectangles_outside_art_tolerance() {
        let page = page(vec![Rect::new(0.0, 0.0, 842.0, 595.0), Rect::new(10.0, 10.0, 60.0, 30.0)]);
        assert!(params_from_art_boxes(&page).is_none());
        let (cells, method) = locate(&page, None);
        assert!(cells.is_empty());
        assert_eq!(method, GridMethod::None);
    }

    #[test]
    fn full_grid_derives_uniform_spans() {
        let params = params_from_art_boxes(&full_grid_page()).expect("grid should be derived");
        assert!(params.is_complete_3x3());
        assert!((params.column_span - 270.0).abs() < 1e-3);
        assert!((params.row_span - 185.0).abs() < 1e-3);
        assert!((params.top_margin - 20.0).abs() < 1e-3);
    }

    #[test]
    fn pages_without_art_boxes_reuse_the_reference_grid() {
        let reference = scan_reference(vec![page(Vec::new()), full_grid_page()])
            .expect("reference grid should be found");

        let (cells, method) = locate(&page(Vec::new()), Some(&reference));

        assert_eq!(method, GridMethod::ReferenceGrid);
        assert_eq!(cells.len(), 9);
    }

    #[test]
    fn reference_scan_skips_incomplete_grids() {
        let partial = page(vec![art_box(30.0, 40.0), art_box(300.0, 40.0)]);
        assert!(scan_reference(vec![partial]).is_none());
    }

    #[test]
    fn located_cells_are_deterministic() {
        let page = full_grid_page();
        let first = locate(&page, None);
        let second = locate(&page, None);
        assert_eq!(first, second);
    }

    #[test]
    fn cell_order_is_a_strict_total_order() {
        let (cells, _) = locate(&full_grid_page(), None);
        for pair in cells.windows(2) {
            let (a, b) = (pair[0].rect, pair[1].rect);
            let same_row = ((a.y0 / 10.0).round_ties_even() - (b.y0 / 10.0).round_ties_even()).abs() < f32::EPSILON;
            assert!(a.y0 < b.y0 || (same_row && a.x0 < b.x0), "{a:?} !< {b:?}");
        }
    }

    #[test]
    fn sorting_uses_coarse_rows() {
        let mut cells = vec![
            CardCell { rect: Rect::new(300.0, 42.0, 400.0, 100.0) },
            CardCell { rect: Rect::new(30.0, 44.0, 130.0, 100.0) },
            CardCell { rect: Rect::new(30.0, 200.0, 130.0, 300.0) },
        ];
        sort_cells(&mut cells);
        let xs = cells.iter().map(|cell| (cell.rect.x0, cell.rect.y0)).collect::<Vec<_>>();
        assert_eq!(xs, vec![(30.0, 44.0), (300.0, 42.0), (30.0, 200.0)]);
    }

    #[test]
    fn art_box_grid_with_only_empty_cells_falls_through() {
        let narrow = PageGeometry {
            width: 300.0,
            height: 400.0,
            rects: vec![art_box(250.0, 60.0)],
        };
        let params = params_from_art_boxes(&narrow).expect("one art box still yields parameters");
        assert!(build_grid(&narrow, &params).is_none());

        let mut image = RgbImage::from_pixel(600, 800, Rgb([255, 255, 255]));
        for x in [40, 225] {
            draw_filled_rect_mut(&mut image, PixelRect::at(x, 60).of_size(150, 220), Rgb([40, 60, 90]));
        }
        let (cells, method) = GridLocator::default().locate(&GridContext {
            page: &narrow,
            image: Some(&image),
            reference: None,
        });
        assert_eq!(method, GridMethod::ImageContours);
        assert_eq!(cells.len(), 2);
    }
}
