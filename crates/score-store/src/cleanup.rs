use crate::types::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Remove every namespace directory older than its kind's current version.
///
/// Current namespaces are never touched, so bumping the version of one kind
/// drops only that kind's data. Returns the directories that were removed.
pub async fn drop_stale_versions(root: impl AsRef<Path>, db_name: &str) -> Result<Vec<PathBuf>> {
    let base = root.as_ref().join(db_name);
    let mut removed = Vec::new();

    for kind in StoreKind::ALL {
        for version in 1..kind.version() {
            let dir = base.join(kind.store_name_for(version));
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    log::info!("Dropped stale store {}", dir.display());
                    removed.push(dir);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(removed)
}
