//! Displayable image resources with explicit lifetimes
//!
//! A rendered page is published to the display layer as a `blob:` URL. The
//! URL stays resolvable exactly as long as its [`ImageHandle`] is alive;
//! dropping the handle revokes it.

use crate::render::ImageBlob;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    live: HashMap<u64, Arc<ImageBlob>>,
}

#[derive(Clone, Default)]
pub struct ImageRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

fn lock(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn url_for(id: u64) -> String {
    format!("blob:score/{}", id)
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, blob: ImageBlob) -> ImageHandle {
        let blob = Arc::new(blob);
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.live.insert(id, Arc::clone(&blob));

        ImageHandle {
            id,
            url: url_for(id),
            blob,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Look up a live URL
    pub fn resolve(&self, url: &str) -> Option<Arc<ImageBlob>> {
        let id = url.strip_prefix("blob:score/")?.parse::<u64>().ok()?;
        lock(&self.inner).live.get(&id).cloned()
    }

    /// Number of handles not yet released
    pub fn live_count(&self) -> usize {
        lock(&self.inner).live.len()
    }
}

/// Owned reference to a registered image, revoked on drop
#[derive(Debug)]
pub struct ImageHandle {
    id: u64,
    url: String,
    blob: Arc<ImageBlob>,
    registry: Weak<Mutex<RegistryInner>>,
}

impl ImageHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn blob(&self) -> &Arc<ImageBlob> {
        &self.blob
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            lock(&inner).live.remove(&self.id);
            log::debug!("Revoked {}", self.url);
        }
    }
}
