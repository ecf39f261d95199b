//! Page-by-page orchestration of grid location, classification and output.

use std::collections::BTreeMap;

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{UNKNOWN_NAME, class_domain, classify_category, find_name};
use crate::color::{Region, classify_with_distance, dominant_color};
use crate::crop::{PixelBox, crop_card, is_blank, to_pixels};
use crate::error::ExtractError;
use crate::grid::{GridContext, GridLocator, scan_reference};
use crate::metadata::{Placement, build_record};
use crate::model::{
    CardRecord, Category, Domain, GridMethod, GridParameters, PageGeometry, RawSpan, Rect,
    SubCategory,
};
use crate::options::ExtractOptions;
use crate::spans::spans;
use crate::warning::{ExtractWarning, WarningCode};

/// 0-based indices of the pages that hold class cards.
pub const CLASS_PAGES: std::ops::Range<u32> = 0..6;

/// Vector and text layer of a document, addressed by 0-based page index.
pub trait PageSource {
    fn page_count(&self) -> u32;

    fn geometry(&self, index: u32) -> Result<PageGeometry, ExtractError>;

    /// Text fragments whose layout falls within `rect`.
    fn text_in_rect(&self, index: u32, rect: &Rect) -> Result<Vec<RawSpan>, ExtractError>;
}

pub trait Rasterizer {
    /// RGB rendering of the page at `dpi`.
    fn render(&self, index: u32, dpi: u32) -> Result<RgbImage, ExtractError>;
}

/// Receives finished cards; owns naming and storage.
pub trait CardSink {
    fn accept(&mut self, record: &CardRecord, image: &RgbImage) -> Result<(), ExtractError>;

    fn debug_page(
        &mut self,
        _page: u32,
        _image: &RgbImage,
        _cells: &[PixelBox],
    ) -> Result<(), ExtractError> {
        Ok(())
    }

    fn finish(&mut self, _summary: &RunSummary) -> Result<(), ExtractError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub origin: usize,
    pub community: usize,
    pub classes: BTreeMap<Domain, usize>,
    pub abilities: BTreeMap<Domain, usize>,
    pub pages_processed: usize,
    pub pages_skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    pub page: u32,
    pub method: GridMethod,
    pub cells: usize,
    pub cards: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub summary: RunSummary,
    pub pages: Vec<PageReport>,
    pub warnings: Vec<ExtractWarning>,
}

impl ExtractionReport {
    #[must_use]
    pub fn card_count(&self) -> usize {
        self.summary.total
    }
}

/// Sequence counters for one run.
#[derive(Debug, Default)]
struct RunState {
    summary: RunSummary,
}

impl RunState {
    fn next_sequence(
        &mut self,
        category: Category,
        domain: Option<Domain>,
        sub: Option<SubCategory>,
    ) -> usize {
        self.summary.total += 1;
        let counter = match (category, domain, sub) {
            (Category::Origin, ..) => &mut self.summary.origin,
            (Category::Community, ..) => &mut self.summary.community,
            (Category::Domain, domain, Some(SubCategory::Class)) => self
                .summary
                .classes
                .entry(domain.unwrap_or(Domain::Unknown))
                .or_insert(0),
            (Category::Domain, domain, _) => self
                .summary
                .abilities
                .entry(domain.unwrap_or(Domain::Unknown))
                .or_insert(0),
        };
        *counter += 1;
        *counter
    }
}

pub struct Extractor<'a, S, R> {
    source: &'a S,
    rasterizer: &'a R,
    locator: GridLocator,
    options: ExtractOptions,
}

impl<'a, S, R> Extractor<'a, S, R>
where
    S: PageSource,
    R: Rasterizer,
{
    #[must_use]
    pub fn new(source: &'a S, rasterizer: &'a R, options: ExtractOptions) -> Self {
        Self {
            source,
            rasterizer,
            locator: GridLocator::default(),
            options,
        }
    }

    #[must_use]
    pub fn with_locator(mut self, locator: GridLocator) -> Self {
        self.locator = locator;
        self
    }

    fn reference_grid(&self) -> Result<Option<GridParameters>, ExtractError> {
        let geometries = (0..self.source.page_count())
            .map(|index| self.source.geometry(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scan_reference(geometries))
    }

    pub fn run<K: CardSink>(&self, sink: &mut K) -> Result<ExtractionReport, ExtractError> {
        self.options.validate()?;
        let pages = self.options.resolve_pages(self.source.page_count())?;

        let mut warnings = Vec::new();
        let reference = self.reference_grid()?;
        match &reference {
            Some(params) => info!(
                columns = ?params.column_starts,
                column_span = params.column_span,
                row_span = params.row_span,
                top_margin = params.top_margin,
                "reference grid found"
            ),
            None => warnings.push(ExtractWarning::new(
                WarningCode::NoReferenceGrid,
                "no page forms a complete 3x3 art-box grid; pages without art boxes fall back to contours",
            )),
        }

        let mut state = RunState::default();
        let mut page_reports = Vec::with_capacity(pages.len());
        for index in pages {
            let report = self.process_page(index, reference.as_ref(), &mut state, sink, &mut warnings)?;
            page_reports.push(report);
        }

        sink.finish(&state.summary)?;
        Ok(ExtractionReport {
            summary: state.summary,
            pages: page_reports,
            warnings,
        })
    }

    fn process_page<K: CardSink>(
        &self,
        index: u32,
        reference: Option<&GridParameters>,
        state: &mut RunState,
        sink: &mut K,
        warnings: &mut Vec<ExtractWarning>,
    ) -> Result<PageReport, ExtractError> {
        let page_number = index + 1;
        let geometry = self.source.geometry(index)?;
        let page_image = self.rasterizer.render(index, self.options.dpi)?;
        let is_class_page = CLASS_PAGES.contains(&index);

        let (cells, method) = self.locator.locate(&GridContext {
            page: &geometry,
            image: Some(&page_image),
            reference,
        });
        if cells.is_empty() {
            warn!(page = page_number, "no grid detected, skipping page");
            warnings.push(
                ExtractWarning::new(WarningCode::NoGridDetected, "no card grid detected; page skipped")
                    .with_page(page_number),
            );
            state.summary.pages_skipped += 1;
            return Ok(PageReport {
                page: page_number,
                method,
                cells: 0,
                cards: 0,
            });
        }

        let kind = if is_class_page {
            SubCategory::Class
        } else {
            SubCategory::Ability
        };
        info!(page = page_number, cells = cells.len(), kind = kind.as_str(), %method, "grid located");
        state.summary.pages_processed += 1;

        if self.options.debug {
            let boxes = cells
                .iter()
                .map(|cell| to_pixels(&cell.rect, &geometry, &page_image))
                .collect::<Vec<_>>();
            sink.debug_page(page_number, &page_image, &boxes)?;
        }

        let mut cards = 0;
        for (cell_offset, cell) in cells.iter().enumerate() {
            let card_image = crop_card(&page_image, &geometry, &cell.rect);
            if is_blank(&card_image) {
                continue;
            }

            let raw = self.source.text_in_rect(index, &cell.rect)?;
            let cell_spans = spans(&raw, &cell.rect);
            let category = classify_category(&cell_spans);
            let cell_index = cell_offset + 1;

            let (domain, sub_category) = match category {
                Category::Domain if is_class_page => {
                    let name = find_name(&cell_spans);
                    let domain = class_domain(&name);
                    if domain == Domain::Unknown {
                        warnings.push(
                            ExtractWarning::new(
                                WarningCode::UnknownClassDomain,
                                format!("class '{name}' has no known domain"),
                            )
                            .with_page(page_number)
                            .with_cell(cell_index),
                        );
                    }
                    (Some(domain), Some(SubCategory::Class))
                }
                Category::Domain => {
                    let rgb = dominant_color(&card_image, Region::default());
                    let (domain, distance) = classify_with_distance(rgb);
                    debug!(page = page_number, cell = cell_index, ?rgb, %domain, distance, "badge color matched");
                    (Some(domain), Some(SubCategory::Ability))
                }
                Category::Origin | Category::Community => (None, None),
            };

            let sequence = state.next_sequence(category, domain, sub_category);
            let record = build_record(
                &cell_spans,
                Placement {
                    category,
                    domain,
                    sub_category,
                    page: page_number,
                    cell_index,
                    sequence,
                },
            );
            if record.metadata.nome == UNKNOWN_NAME {
                warnings.push(
                    ExtractWarning::new(WarningCode::UnknownCardName, "no card name found")
                        .with_page(page_number)
                        .with_cell(cell_index),
                );
            }

            debug!(label = %record.label(), name = %record.metadata.nome, "card extracted");
            sink.accept(&record, &card_image)?;
            cards += 1;
        }

        Ok(PageReport {
            page: page_number,
            method,
            cells: cells.len(),
            cards,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::{CardSink, Extractor, PageSource, Rasterizer};
    use crate::error::ExtractError;
    use crate::grid::{ART_HEIGHT, ART_WIDTH};
    use crate::model::{CardRecord, Category, Domain, GridMethod, PageGeometry, RawSpan, Rect, SubCategory};
    use crate::options::ExtractOptions;
    use crate::warning::WarningCode;

    struct FakePage {
        geometry: PageGeometry,
        spans: Vec<RawSpan>,
        fill: Rgb<u8>,
    }

    struct FakeDocument {
        pages: Vec<FakePage>,
    }

    impl PageSource for FakeDocument {
        fn page_count(&self) -> u32 {
            self.pages.len() as u32
        }

        fn geometry(&self, index: u32) -> Result<PageGeometry, ExtractError> {
            Ok(self.pages[index as usize].geometry.clone())
        }

        // Every cell repeats the page's spans, given relative to the cell.
        fn text_in_rect(&self, index: u32, rect: &Rect) -> Result<Vec<RawSpan>, ExtractError> {
            Ok(self.pages[index as usize]
                .spans
                .iter()
                .map(|span| RawSpan {
                    bbox: Rect::new(
                        span.bbox.x0 + rect.x0,
                        span.bbox.y0 + rect.y0,
                        span.bbox.x1 + rect.x0,
                        span.bbox.y1 + rect.y0,
                    ),
                    ..span.clone()
                })
                .collect())
        }
    }

    impl Rasterizer for FakeDocument {
        fn render(&self, index: u32, dpi: u32) -> Result<RgbImage, ExtractError> {
            let page = &self.pages[index as usize];
            let scale = dpi as f32 / 72.0;
            Ok(RgbImage::from_pixel(
                (page.geometry.width * scale) as u32,
                (page.geometry.height * scale) as u32,
                page.fill,
            ))
        }
    }

    #[derive(Default)]
    struct Collect {
        records: Vec<CardRecord>,
        finished: bool,
    }

    impl CardSink for Collect {
        fn accept(&mut self, record: &CardRecord, _image: &RgbImage) -> Result<(), ExtractError> {
            self.records.push(record.clone());
            Ok(())
        }

        fn finish(&mut self, _summary: &super::RunSummary) -> Result<(), ExtractError> {
            self.finished = true;
            Ok(())
        }
    }

    fn grid_rects() -> Vec<Rect> {
        let mut rects = Vec::new();
        for y in [40.0, 225.0, 410.0] {
            for x in [30.0, 300.0, 570.0] {
                rects.push(Rect::new(x, y, x + ART_WIDTH, y + ART_HEIGHT));
            }
        }
        rects
    }

    fn text(value: &str, size: f32, x: f32, y: f32) -> RawSpan {
        RawSpan {
            text: value.to_string(),
            size,
            bold: false,
            italic: false,
            bbox: Rect::new(x, y, x + 20.0, y + size),
        }
    }

    fn page(rects: Vec<Rect>, spans: Vec<RawSpan>, fill: [u8; 3]) -> FakePage {
        FakePage {
            geometry: PageGeometry {
                width: 842.0,
                height: 595.0,
                rects,
            },
            spans,
            fill: Rgb(fill),
        }
    }

    fn options() -> ExtractOptions {
        ExtractOptions {
            dpi: 72,
            ..ExtractOptions::default()
        }
    }

    fn document() -> FakeDocument {
        let blank = || page(Vec::new(), Vec::new(), [255, 255, 255]);
        let mut pages = (0..6).map(|_| blank()).collect::<Vec<_>>();
        // Page 1 carries class cards.
        pages[0] = page(grid_rects(), vec![text("LADRO", 14.0, 50.0, 60.0)], [200, 200, 200]);
        // Page 7: origin cards without art boxes.
        pages.push(page(Vec::new(), vec![text("Clank", 14.0, 50.0, 60.0), text("ORIGINE", 8.0, 50.0, 80.0)], [200, 200, 200]));
        // Page 8: ability cards with a green badge.
        pages.push(page(grid_rects(), vec![text("RADICI", 14.0, 50.0, 60.0)], [41, 120, 61]));
        FakeDocument { pages }
    }

    #[test]
    fn classifies_cards_into_run_scoped_buckets() {
        let doc = document();
        let mut sink = Collect::default();
        let report = Extractor::new(&doc, &doc, options())
            .run(&mut sink)
            .expect("run should succeed");

        assert!(sink.finished);
        assert_eq!(report.card_count(), 27);
        assert_eq!(report.summary.classes.get(&Domain::Mezzanotte), Some(&9));
        assert_eq!(report.summary.origin, 9);
        assert_eq!(report.summary.abilities.get(&Domain::Saggio), Some(&9));

        let class_card = &sink.records[0];
        assert_eq!(class_card.category, Category::Domain);
        assert_eq!(class_card.sub_category, Some(SubCategory::Class));
        assert_eq!(class_card.page, 1);
        assert_eq!(class_card.cell_index, 1);
        assert_eq!(class_card.sequence, 1);

        let last = sink.records.last().expect("records should not be empty");
        assert_eq!(last.domain, Some(Domain::Saggio));
        assert_eq!(last.sequence, 9);
        assert_eq!(last.cell_index, 9);
    }

    #[test]
    fn borrows_reference_grid_for_pages_without_art_boxes() {
        let doc = document();
        let mut sink = Collect::default();
        let report = Extractor::new(&doc, &doc, options())
            .run(&mut sink)
            .expect("run should succeed");

        let origin_page = report.pages.iter().find(|page| page.page == 7).expect("page 7 processed");
        assert_eq!(origin_page.method, GridMethod::ReferenceGrid);
        assert_eq!(origin_page.cards, 9);

        let blank_page = report.pages.iter().find(|page| page.page == 2).expect("page 2 processed");
        assert_eq!(blank_page.method, GridMethod::ReferenceGrid);
        assert_eq!(blank_page.cards, 0);
    }

    #[test]
    fn pages_without_any_grid_are_skipped_with_a_warning() {
        let doc = FakeDocument {
            pages: vec![page(Vec::new(), Vec::new(), [255, 255, 255])],
        };
        let mut sink = Collect::default();
        let report = Extractor::new(&doc, &doc, options())
            .run(&mut sink)
            .expect("run should succeed");

        assert_eq!(report.card_count(), 0);
        assert_eq!(report.summary.pages_skipped, 1);
        assert!(report.warnings.iter().any(|warning| warning.code == WarningCode::NoGridDetected && warning.page == Some(1)));
    }

    #[test]
    fn selection_limits_processed_pages() {
        let doc = document();
        let mut sink = Collect::default();
        let options = ExtractOptions {
            pages: Some("8".parse().expect("selection should parse")),
            ..options()
        };
        let report = Extractor::new(&doc, &doc, options)
            .run(&mut sink)
            .expect("run should succeed");

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.card_count(), 9);
        assert!(sink.records.iter().all(|record| record.page == 8));
    }

    #[test]
    fn selection_past_the_last_page_is_an_error() {
        let doc = document();
        let mut sink = Collect::default();
        let options = ExtractOptions {
            pages: Some("40".parse().expect("selection should parse")),
            ..options()
        };
        let error = Extractor::new(&doc, &doc, options)
            .run(&mut sink)
            .expect_err("run should fail");
        assert!(matches!(error, ExtractError::PageOutOfRange { page: 40, count: 8 }));
    }
}
