use crate::config::{ReaderConfig, RemoteSource};
use crate::types::*;
use score_annotate::{
    AnnotationController, AnnotationKey, AnnotationStore, DrawSurface, redraw_while_active,
};
use score_cache::{
    CacheCoordinator, DirectoryObjectStorage, DocumentFetcher, HttpObjectStorage, ObjectStorage,
    PageRenderer, PagedSession, PlaceholderRasterizer, Rasterizer,
};
use score_store::{DurableStore, FileStore, PinnedStore, StoreKind, drop_stale_versions};
use std::sync::Arc;

/// Durable namespaces used by the reader
#[derive(Clone)]
pub struct Stores {
    pub media: Arc<dyn DurableStore>,
    pub annotations: Arc<dyn DurableStore>,
    pub pinned: Arc<dyn DurableStore>,
}

impl Stores {
    /// Open the file-backed namespaces under the configured data dir, after
    /// dropping namespaces left behind by older versions
    pub async fn open(config: &ReaderConfig) -> Result<Self> {
        let root = &config.data_dir;
        let dropped = drop_stale_versions(root, &config.db_name).await?;
        if !dropped.is_empty() {
            log::info!("Removed {} outdated stores", dropped.len());
        }

        let db = config.db_name.as_str();
        Ok(Self {
            media: Arc::new(FileStore::open(root, db, StoreKind::ScoreCache).await?),
            annotations: Arc::new(FileStore::open(root, db, StoreKind::Annotations).await?),
            pinned: Arc::new(FileStore::open(root, db, StoreKind::Pinned).await?),
        })
    }
}

/// Every long-lived component, wired together
#[derive(Clone)]
pub struct ReaderServices {
    pub config: ReaderConfig,
    pub stores: Stores,
    pub renderer: PageRenderer,
    pub coordinator: CacheCoordinator,
    pub session: PagedSession,
    pub annotations: AnnotationStore,
    pub pinned: PinnedStore,
}

impl ReaderServices {
    /// Open the stores on disk and connect to the configured remote
    pub async fn open(config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        let stores = Stores::open(&config).await?;
        let storage = remote_storage(&config.remote);
        let rasterizer = default_rasterizer(&config);
        Ok(Self::assemble(config, stores, storage, rasterizer))
    }

    pub fn assemble(
        config: ReaderConfig,
        stores: Stores,
        storage: Arc<dyn ObjectStorage>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        let renderer = PageRenderer::new(rasterizer);
        let fetcher = DocumentFetcher::new(storage, stores.media.clone(), renderer.clone())
            .with_preview_box(config.preview_box);
        let coordinator = CacheCoordinator::new(Arc::new(fetcher), stores.media.clone());
        let session = PagedSession::new(stores.media.clone(), renderer.clone(), config.display);
        let annotations = AnnotationStore::new(stores.annotations.clone());
        let pinned = PinnedStore::new(stores.pinned.clone());

        Self {
            config,
            stores,
            renderer,
            coordinator,
            session,
            annotations,
            pinned,
        }
    }

    /// Annotation key of a page for the configured user
    pub fn annotation_key(&self, score_key: &str, part_key: &str, page: usize) -> AnnotationKey {
        AnnotationKey::new(self.config.user_id.clone(), score_key, part_key, page)
    }

    pub fn annotation_controller(&self) -> AnnotationController {
        AnnotationController::new(self.annotations.clone())
    }

    /// Keep `surface` in step with `controller` while a gesture is active,
    /// at the configured frame interval. Returns the number of frames drawn.
    pub async fn redraw_annotations<S: DrawSurface + ?Sized>(
        &self,
        controller: &AnnotationController,
        surface: &mut S,
    ) -> usize {
        redraw_while_active(
            controller,
            surface,
            self.config.display.density,
            self.config.redraw_interval(),
        )
        .await
    }
}

pub fn remote_storage(remote: &RemoteSource) -> Arc<dyn ObjectStorage> {
    match remote {
        RemoteSource::Http { base_url } => Arc::new(HttpObjectStorage::new(base_url.clone())),
        RemoteSource::Directory { path } => Arc::new(DirectoryObjectStorage::new(path.clone())),
    }
}

#[cfg(feature = "pdfium")]
pub fn default_rasterizer(config: &ReaderConfig) -> Arc<dyn Rasterizer> {
    match &config.pdfium_library_dir {
        Some(dir) => Arc::new(score_cache::PdfiumRasterizer::with_library_dir(dir.clone())),
        None => Arc::new(score_cache::PdfiumRasterizer::new()),
    }
}

#[cfg(not(feature = "pdfium"))]
pub fn default_rasterizer(_config: &ReaderConfig) -> Arc<dyn Rasterizer> {
    log::warn!("Built without PDFium, pages render as blank placeholders");
    Arc::new(PlaceholderRasterizer)
}

/// Rasterizer that needs no native library
pub fn placeholder_rasterizer() -> Arc<dyn Rasterizer> {
    Arc::new(PlaceholderRasterizer)
}
