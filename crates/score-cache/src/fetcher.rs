use crate::document::DocumentHandle;
use crate::render::{fit_scale, ImageBlob, PageRenderer};
use crate::storage::ObjectStorage;
use crate::types::*;
use score_store::DurableStore;
use std::sync::Arc;

/// Bounding box previews are fitted into, in pixels
pub const DEFAULT_PREVIEW_BOX: Size = Size {
    width: 300.0,
    height: 300.0,
};

/// What gets persisted for one part
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub raw_document: Arc<Vec<u8>>,
    pub preview: ImageBlob,
}

/// Downloads one part, renders its first-page preview and persists both.
pub struct DocumentFetcher {
    storage: Arc<dyn ObjectStorage>,
    media: Arc<dyn DurableStore>,
    renderer: PageRenderer,
    preview_box: Size,
}

impl DocumentFetcher {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        media: Arc<dyn DurableStore>,
        renderer: PageRenderer,
    ) -> Self {
        Self {
            storage,
            media,
            renderer,
            preview_box: DEFAULT_PREVIEW_BOX,
        }
    }

    pub fn with_preview_box(mut self, preview_box: Size) -> Self {
        self.preview_box = preview_box;
        self
    }

    /// Fetch `part` into the media cache.
    ///
    /// Nothing is written unless download, decode and preview render all
    /// succeed. Both keys are committed in a single batch with the preview
    /// ahead of the document, so a present document always has its preview.
    pub async fn fetch(&self, part: &Part) -> Result<CacheEntry> {
        log::info!("Downloading {}", part.url);
        let bytes = self.storage.download(&part.url).await?;

        let document = DocumentHandle::decode_async(bytes).await?;
        let preview = self.render_preview(&document).await?;

        let cache_key = part.cache_key();
        self.media
            .set_batch(vec![
                (part.preview_key(), preview.bytes.clone()),
                (cache_key.clone(), document.bytes().as_ref().clone()),
            ])
            .await?;

        log::info!(
            "Cached {} ({} bytes, preview {}x{})",
            cache_key,
            document.bytes().len(),
            preview.width,
            preview.height
        );

        Ok(CacheEntry {
            raw_document: Arc::clone(document.bytes()),
            preview,
        })
    }

    async fn render_preview(&self, document: &DocumentHandle) -> Result<ImageBlob> {
        let natural = document.page_size(1)?;
        let scale = fit_scale(natural, self.preview_box);
        self.renderer.render_at_scale(document, 1, scale).await
    }
}
