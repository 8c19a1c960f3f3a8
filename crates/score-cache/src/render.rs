//! Page rasterization sized to the viewing surface

use crate::document::DocumentHandle;
use crate::raster::Rasterizer;
use crate::types::*;
use image::{ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

/// Largest scale at which `natural` fits entirely inside `target`
pub fn fit_scale(natural: Size, target: Size) -> f32 {
    (target.width / natural.width).min(target.height / natural.height)
}

/// Scale that is never under-resolved whichever way the device is held:
/// the larger of the fits into `target` and into `target` turned a quarter
/// turn.
pub fn cover_scale(natural: Size, target: Size) -> f32 {
    fit_scale(natural, target).max(fit_scale(natural, target.rotated()))
}

/// Encoded page image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageBlob {
    /// Compress a raster into WebP
    pub fn encode(image: &RgbaImage) -> Result<Self> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::WebP)?;
        Ok(Self {
            bytes,
            width: image.width(),
            height: image.height(),
            format: ImageFormat::WebP,
        })
    }

    /// Wrap already-encoded bytes, reading dimensions from the header
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self> {
        let reader = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| CacheError::Render(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| CacheError::Render("unrecognized image format".to_string()))?;
        let (width, height) = reader.into_dimensions()?;
        Ok(Self {
            bytes,
            width,
            height,
            format,
        })
    }

    pub fn decode(&self) -> Result<RgbaImage> {
        Ok(image::load_from_memory_with_format(&self.bytes, self.format)?.into_rgba8())
    }
}

#[derive(Clone)]
pub struct PageRenderer {
    rasterizer: Arc<dyn Rasterizer>,
}

impl PageRenderer {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { rasterizer }
    }

    /// Render `page_number` for a surface described by `metrics`.
    ///
    /// The scale covers the surface in both orientations and is multiplied by
    /// the pixel density.
    pub async fn render(
        &self,
        document: &DocumentHandle,
        page_number: usize,
        metrics: DisplayMetrics,
    ) -> Result<ImageBlob> {
        let natural = document.page_size(page_number)?;
        let scale = cover_scale(natural, metrics.surface()) * metrics.density;
        self.render_at_scale(document, page_number, scale).await
    }

    /// Render `page_number` at an explicit pixels-per-point scale
    pub async fn render_at_scale(
        &self,
        document: &DocumentHandle,
        page_number: usize,
        scale: f32,
    ) -> Result<ImageBlob> {
        document.page_size(page_number)?;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(CacheError::Render(format!("invalid scale {}", scale)));
        }

        let bytes = Arc::clone(document.bytes());
        let rasterizer = Arc::clone(&self.rasterizer);

        tokio::task::spawn_blocking(move || {
            let image = rasterizer.rasterize(&bytes, page_number, scale)?;
            log::debug!(
                "Rasterized page {} at {:.3} ({}x{})",
                page_number,
                scale,
                image.width(),
                image.height()
            );
            ImageBlob::encode(&image)
        })
        .await?
    }
}
