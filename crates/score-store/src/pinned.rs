use crate::store::{DurableStore, get_json, set_json};
use crate::types::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Scores a user has pinned, one set per library
#[derive(Clone)]
pub struct PinnedStore {
    store: Arc<dyn DurableStore>,
}

impl PinnedStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    fn key(uid: &str, library_key: &str) -> String {
        format!("pinned/{}/{}", uid, library_key)
    }

    pub async fn load(&self, uid: &str, library_key: &str) -> Result<BTreeSet<String>> {
        let pinned = get_json(self.store.as_ref(), &Self::key(uid, library_key)).await?;
        Ok(pinned.unwrap_or_default())
    }

    pub async fn is_pinned(&self, uid: &str, library_key: &str, score_key: &str) -> Result<bool> {
        Ok(self.load(uid, library_key).await?.contains(score_key))
    }

    /// Flip the pinned flag of `score_key`, returning the new flag
    pub async fn toggle(&self, uid: &str, library_key: &str, score_key: &str) -> Result<bool> {
        let mut pinned = self.load(uid, library_key).await?;
        let now_pinned = if pinned.remove(score_key) {
            false
        } else {
            pinned.insert(score_key.to_string());
            true
        };
        set_json(self.store.as_ref(), &Self::key(uid, library_key), &pinned).await?;
        Ok(now_pinned)
    }
}
