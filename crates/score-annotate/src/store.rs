use crate::types::*;
use score_store::{DurableStore, get_json, set_json};
use std::sync::Arc;

/// Annotation lists persisted whole, one value per page
#[derive(Clone)]
pub struct AnnotationStore {
    store: Arc<dyn DurableStore>,
}

impl AnnotationStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Stored list for `key`, empty if nothing was ever saved
    pub async fn load(&self, key: &AnnotationKey) -> Result<Vec<DrawInstruction>> {
        let list: Option<Vec<DrawInstruction>> =
            get_json(self.store.as_ref(), &key.storage_key()).await?;
        Ok(list.unwrap_or_default())
    }

    /// Overwrite the list for `key`
    pub async fn save(&self, key: &AnnotationKey, instructions: &[DrawInstruction]) -> Result<()> {
        set_json(self.store.as_ref(), &key.storage_key(), instructions).await?;
        log::debug!(
            "Saved {} instructions to {}",
            instructions.len(),
            key.storage_key()
        );
        Ok(())
    }

    /// Remove every user's annotations for one part. Returns how many pages
    /// were removed.
    pub async fn purge_part(&self, score_key: &str, part_key: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.store.keys().await? {
            if belongs_to_part(&key, score_key, part_key) {
                self.store.remove(&key).await?;
                removed += 1;
            }
        }
        log::info!(
            "Purged {} annotated pages of {}/{}",
            removed,
            score_key,
            part_key
        );
        Ok(removed)
    }
}

/// Matches `annotation/{any uid}/{score_key}/{part_key}/{page}`
fn belongs_to_part(storage_key: &str, score_key: &str, part_key: &str) -> bool {
    let segments: Vec<&str> = storage_key.split('/').collect();
    matches!(
        segments.as_slice(),
        ["annotation", _, score, part, _] if *score == score_key && *part == part_key
    )
}
