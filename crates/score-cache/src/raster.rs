use crate::types::*;
use image::{Rgba, RgbaImage};

#[cfg(feature = "pdfium")]
use pdfium_render::prelude::*;
#[cfg(feature = "pdfium")]
use std::path::PathBuf;

/// Turns one page of a PDF into pixels.
///
/// Implementations are blocking and are always called from the blocking
/// pool. Native document/page handles must not outlive the call.
pub trait Rasterizer: Send + Sync {
    /// Rasterize the 1-based `page_number` at `scale` pixels per point
    fn rasterize(&self, document: &[u8], page_number: usize, scale: f32) -> Result<RgbaImage>;
}

/// Produces blank white pages of the right size.
///
/// Used when no native renderer is available, so caching and annotation keep
/// working with placeholder pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRasterizer;

impl Rasterizer for PlaceholderRasterizer {
    fn rasterize(&self, document: &[u8], page_number: usize, scale: f32) -> Result<RgbaImage> {
        let handle = crate::DocumentHandle::decode(document.to_vec())?;
        let size = handle.page_size(page_number)?;
        let (width, height) = scaled_dimensions(size, scale);
        Ok(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
    }
}

/// Pixel dimensions of a page of `size` points at `scale`, at least 1x1
pub fn scaled_dimensions(size: Size, scale: f32) -> (u32, u32) {
    let width = (size.width * scale).round().max(1.0) as u32;
    let height = (size.height * scale).round().max(1.0) as u32;
    (width, height)
}

/// PDFium-backed rasterizer.
///
/// The library is bound per call, the same way documents are opened per
/// call, so every native handle is released before `rasterize` returns.
#[cfg(feature = "pdfium")]
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
}

#[cfg(feature = "pdfium")]
impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer the PDFium library found in `dir`
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    /// Bind PDFium, trying the configured directory, then `vendor/pdfium/lib`
    /// under the working directory, then the system library
    fn bind(&self) -> std::result::Result<Pdfium, PdfiumError> {
        let vendor_dir = std::env::current_dir().ok().map(|mut p| {
            p.push("vendor/pdfium/lib");
            p
        });

        for dir in self.library_dir.iter().chain(vendor_dir.iter()) {
            if !dir.exists() {
                continue;
            }
            if let Ok(binding) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            {
                return Ok(Pdfium::new(binding));
            }
        }

        Pdfium::bind_to_system_library().map(Pdfium::new)
    }
}

#[cfg(feature = "pdfium")]
impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, document: &[u8], page_number: usize, scale: f32) -> Result<RgbaImage> {
        let index = page_number
            .checked_sub(1)
            .ok_or(CacheError::PageOutOfRange {
                page: page_number,
                count: 0,
            })?;

        let pdfium = self
            .bind()
            .map_err(|e| CacheError::Render(format!("PDFium unavailable: {}", e)))?;
        let pdf = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| CacheError::DecodeFailure(e.to_string()))?;
        let page = pdf
            .pages()
            .get(index as u16)
            .map_err(|e| CacheError::Render(format!("page {}: {}", page_number, e)))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| CacheError::Render(format!("page {}: {}", page_number, e)))?;

        Ok(bitmap.as_image().into_rgba8())
    }
}
