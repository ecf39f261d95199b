pub mod classify;
pub mod cluster;
pub mod color;
pub mod contour;
pub mod crop;
mod error;
pub mod grid;
pub mod metadata;
pub mod model;
mod options;
mod pdf_reader;
pub mod pipeline;
#[cfg(feature = "pdfium")]
mod raster;
mod sink;
pub mod spans;
mod warning;

use std::path::Path;

use tracing::info;

pub use error::ExtractError;
pub use options::{DEFAULT_DPI, ExtractOptions, MAX_DPI, MIN_DPI, PageSelection};
pub use pdf_reader::PdfDocument;
pub use pipeline::{CardSink, ExtractionReport, Extractor, PageSource, Rasterizer, RunSummary};
#[cfg(feature = "pdfium")]
pub use raster::{PdfiumRasterizer, bind_pdfium};
pub use sink::{DirectorySink, IndexEntry, safe_filename};
pub use warning::{ExtractWarning, WarningCode};

/// Runs the extractor over `source`/`rasterizer` and writes the card tree to `output`.
///
/// `output` is wiped and recreated before the first card is written.
pub fn extract_with<S, R>(
    source: &S,
    rasterizer: &R,
    output: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ExtractError>
where
    S: PageSource,
    R: Rasterizer,
{
    options.validate()?;
    options.resolve_pages(source.page_count())?;
    let mut sink = DirectorySink::create(output)?;
    let report = Extractor::new(source, rasterizer, options.clone()).run(&mut sink)?;
    info!(
        cards = report.card_count(),
        warnings = report.warnings.len(),
        output = %output.display(),
        "extraction finished"
    );
    Ok(report)
}

/// Extracts every card of the PDF at `input` into `output`.
#[cfg(feature = "pdfium")]
pub fn extract_cards(
    input: &Path,
    output: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ExtractError> {
    options.validate()?;
    let source = PdfDocument::open(input)?;
    let pdfium = bind_pdfium()?;
    let rasterizer = PdfiumRasterizer::open(&pdfium, input)?;
    info!(pages = source.page_count(), dpi = options.dpi, input = %input.display(), "document opened");
    extract_with(&source, &rasterizer, output, options)
}
