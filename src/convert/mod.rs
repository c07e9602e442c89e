/*
 * PDF rasterization. The actual work is pdfium's, this
 * module just asks for one image per page in order.
 */

use std::path::{Path, PathBuf};
use derive_more::Display;
use image::DynamicImage;
use log::{debug, info};
use pdfium_render::prelude::*;

// The papers are printed small, anything under that and
// the text gets hard to read once zoomed in.
pub const RASTER_DPI: u16 = 450;

// PDF user space is 72 points per inch.
const POINTS_PER_INCH: f32 = 72.0;

#[derive(Debug, Display)]
pub enum ConversionError {
  #[display(fmt = "pdfium library unavailable: {}", _0)]
  Library(String),
  #[display(fmt = "could not open PDF: {}", _0)]
  Document(String),
  #[display(fmt = "could not render page {}: {}", _0, _1)]
  Render(usize, String),
  #[display(fmt = "could not write page {}: {}", _0, _1)]
  Output(usize, String)
}

impl std::error::Error for ConversionError {}

/// Turns a PDF into page images, one call to `sink` per
/// page, first page first. Returns how many pages were
/// produced.
///
/// Images are handed over one at a time because a full
/// newspaper page at 450 DPI is tens of megabytes.
pub trait Rasterizer: Send + Sync {
  fn rasterize(
    &self,
    pdf_path: &Path,
    dpi: u16,
    sink: &mut dyn FnMut(DynamicImage) -> Result<(), ConversionError>
  ) -> Result<usize, ConversionError>;
}

pub struct PdfiumRasterizer {
  library_dir: Option<PathBuf>
}

impl PdfiumRasterizer {

  pub fn new(library_dir: Option<PathBuf>) -> Self {
    Self { library_dir }
  }

  // Binding is done per conversion. Uploads are rare and
  // it keeps the pdfium handle on the blocking thread
  // that uses it.
  fn bind(&self) -> Result<Pdfium, ConversionError> {
    let bindings = match &self.library_dir {
      Some(dir) => Pdfium::bind_to_library(
        Pdfium::pdfium_platform_library_name_at_path(dir)
      ),
      None => Pdfium::bind_to_system_library()
    }.map_err(|e| ConversionError::Library(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
  }

}

impl Rasterizer for PdfiumRasterizer {

  fn rasterize(
    &self,
    pdf_path: &Path,
    dpi: u16,
    sink: &mut dyn FnMut(DynamicImage) -> Result<(), ConversionError>
  ) -> Result<usize, ConversionError> {
    let pdfium = self.bind()?;
    let document = pdfium.load_pdf_from_file(pdf_path, None)
      .map_err(|e| ConversionError::Document(format!("{:?}", e)))?;
    let pages = document.pages();
    info!("Rasterizing {:?}: {} pages at {} DPI", pdf_path, pages.len(), dpi);

    let render_config = PdfRenderConfig::new()
      .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH);

    let mut count = 0;
    for (index, page) in pages.iter().enumerate() {
      let bitmap = page.render_with_config(&render_config)
        .map_err(|e| ConversionError::Render(index + 1, format!("{:?}", e)))?;
      let image = bitmap.as_image();
      debug!(
        "Rendered page {} -> {}x{} px",
        index + 1,
        image.width(),
        image.height()
      );
      sink(image)?;
      count += 1;
    }
    Ok(count)
  }

}
