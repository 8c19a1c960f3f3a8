//! Paged viewer session
//!
//! Holds at most one open document and a sliding window of rendered pages.
//! Page 0 is the cached preview, published as soon as a document is opened.
//!
//! Every async step captures the session generation before awaiting and
//! re-checks it afterwards; results for a replaced document are dropped
//! (which also revokes any image handle they carried).

use crate::document::DocumentHandle;
use crate::images::{ImageHandle, ImageRegistry};
use crate::render::{ImageBlob, PageRenderer};
use crate::types::*;
use futures::future::join_all;
use score_store::DurableStore;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Pages rendered for a request of `index`: the page itself and the two
/// after it, clamped to the document. Index 0 (the preview) maps to page 1.
pub fn page_window(index: usize, page_count: usize) -> RangeInclusive<usize> {
    index.max(1)..=index.saturating_add(2).min(page_count)
}

/// What observers see of a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<DocumentIdentity>,
    /// Zero until the full document has been decoded
    pub page_count: usize,
    /// Page index to image URL
    pub pages: BTreeMap<usize, String>,
}

#[derive(Default)]
struct SessionState {
    generation: u64,
    identity: Option<DocumentIdentity>,
    document: Option<DocumentHandle>,
    pages: BTreeMap<usize, ImageHandle>,
    in_flight: BTreeSet<usize>,
}

impl SessionState {
    fn reset(&mut self, identity: Option<DocumentIdentity>) -> u64 {
        self.generation += 1;
        self.identity = identity;
        self.document = None;
        self.pages.clear();
        self.in_flight.clear();
        self.generation
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            identity: self.identity.clone(),
            page_count: self.document.as_ref().map_or(0, |d| d.page_count()),
            pages: self
                .pages
                .iter()
                .map(|(&index, handle)| (index, handle.url().to_string()))
                .collect(),
        }
    }
}

struct SessionInner {
    state: Mutex<SessionState>,
    media: Arc<dyn DurableStore>,
    renderer: PageRenderer,
    metrics: DisplayMetrics,
    images: ImageRegistry,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

#[derive(Clone)]
pub struct PagedSession {
    inner: Arc<SessionInner>,
}

impl PagedSession {
    pub fn new(
        media: Arc<dyn DurableStore>,
        renderer: PageRenderer,
        metrics: DisplayMetrics,
    ) -> Self {
        let (snapshot_tx, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState::default()),
                media,
                renderer,
                metrics,
                images: ImageRegistry::new(),
                snapshot_tx,
            }),
        }
    }

    pub fn images(&self) -> &ImageRegistry {
        &self.inner.images
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Encoded image of a rendered page (0 is the preview)
    pub fn page_blob(&self, index: usize) -> Option<Arc<ImageBlob>> {
        self.lock().pages.get(&index).map(|h| Arc::clone(h.blob()))
    }

    /// Switch to `identity`.
    ///
    /// Everything belonging to the previous document is released first. The
    /// preview is published as page 0 before the full document is decoded.
    pub async fn open(&self, identity: DocumentIdentity) -> Result<SessionSnapshot> {
        let generation = {
            let mut state = self.lock();
            let generation = state.reset(Some(identity.clone()));
            self.publish(&state);
            generation
        };
        log::debug!("Opening {} (generation {})", identity.url(), generation);

        let preview = self.inner.media.get(&identity.preview_key()).await?;
        self.apply(generation, |state| {
            let Some(bytes) = preview else {
                return;
            };
            match ImageBlob::from_encoded(bytes) {
                Ok(blob) => {
                    state.pages.insert(0, self.inner.images.register(blob));
                }
                Err(e) => log::warn!("Unreadable preview for {}: {}", identity.url(), e),
            }
        })?;

        let raw = self.inner.media.get(&identity.media_key()).await?;
        self.ensure_current(generation)?;
        let raw = raw.ok_or_else(|| CacheError::NotCached(identity.url()))?;

        let document = DocumentHandle::decode_async(raw).await;
        self.ensure_current(generation)?;
        let document = document?;

        log::info!(
            "Opened {} ({} pages)",
            identity.url(),
            document.page_count()
        );
        self.apply(generation, |state| {
            state.document = Some(document);
            state.snapshot()
        })
    }

    /// Make sure the window around `index` is rendered.
    ///
    /// Pages already rendered or being rendered are skipped, and pages outside
    /// the window are kept. Each page is published as soon as it completes.
    /// Returns the first render error, after every render has settled.
    pub async fn show_page(&self, index: usize) -> Result<SessionSnapshot> {
        let (generation, document, targets) = {
            let mut state = self.lock();
            let document = state.document.clone().ok_or(CacheError::NotOpen)?;
            let targets: Vec<usize> = page_window(index, document.page_count())
                .filter(|page| !state.pages.contains_key(page) && !state.in_flight.contains(page))
                .collect();
            state.in_flight.extend(targets.iter().copied());
            (state.generation, document, targets)
        };

        let metrics = self.inner.metrics;
        let renders = targets.into_iter().map(|page| {
            let document = &document;
            async move {
                let result = self.inner.renderer.render(document, page, metrics).await;
                self.apply(generation, |state| {
                    state.in_flight.remove(&page);
                    result.map(|blob| {
                        state.pages.insert(page, self.inner.images.register(blob));
                    })
                })
                .and_then(|r| r)
                .inspect_err(|e| {
                    if !matches!(e, CacheError::Superseded) {
                        log::warn!("Failed to render page {}: {}", page, e);
                    }
                })
            }
        });

        join_all(renders)
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;
        Ok(self.snapshot())
    }

    /// Release the document and every page image
    pub fn close(&self) {
        let mut state = self.lock();
        state.reset(None);
        self.publish(&state);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &SessionState) {
        self.inner.snapshot_tx.send_replace(state.snapshot());
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.lock().generation == generation {
            Ok(())
        } else {
            Err(CacheError::Superseded)
        }
    }

    /// Run `f` against the state if `generation` is still current, then
    /// publish
    fn apply<T>(&self, generation: u64, f: impl FnOnce(&mut SessionState) -> T) -> Result<T> {
        let mut state = self.lock();
        if state.generation != generation {
            return Err(CacheError::Superseded);
        }
        let out = f(&mut state);
        self.publish(&state);
        Ok(out)
    }
}
