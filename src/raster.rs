use std::path::Path;

use image::RgbImage;
use pdfium_render::prelude::*;

use crate::error::ExtractError;
use crate::pipeline::Rasterizer;

/// Binds the pdfium shared library next to the executable, else the system one.
pub fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|error| ExtractError::RendererUnavailable(error.to_string()))?;
    Ok(Pdfium::new(bindings))
}

pub struct PdfiumRasterizer<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumRasterizer<'a> {
    pub fn open(pdfium: &'a Pdfium, path: &Path) -> Result<Self, ExtractError> {
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|error| ExtractError::RendererUnavailable(format!("{}: {error}", path.display())))?;
        Ok(Self { document })
    }
}

impl Rasterizer for PdfiumRasterizer<'_> {
    fn render(&self, index: u32, dpi: u32) -> Result<RgbImage, ExtractError> {
        let render_error = |message: String| ExtractError::Render {
            page: index + 1,
            message,
        };

        let page_index = u16::try_from(index)
            .map_err(|_| render_error("page index exceeds pdfium limits".to_string()))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|error| render_error(error.to_string()))?;

        let scale = dpi as f32 / 72.0;
        let bitmap = page
            .render_with_config(&PdfRenderConfig::new().scale_page_by_factor(scale))
            .map_err(|error| render_error(error.to_string()))?;
        Ok(bitmap.as_image().to_rgb8())
    }
}
