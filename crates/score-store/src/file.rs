//! Directory-backed durable store
//!
//! One directory per namespace, one file per key. File names are the
//! percent-encoded key so `keys()` can be recovered from a directory listing.
//! Writes land in a staging directory first and are renamed into place, so a
//! reader never observes a half-written value. Values a batch overwrites are
//! linked aside until the whole batch is in place, and restored if it fails.

use crate::store::DurableStore;
use crate::types::*;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

const STAGING_DIR: &str = ".staging";

pub struct FileStore {
    dir: PathBuf,
    staging: PathBuf,
    write_lock: Mutex<()>,
    next_temp: AtomicU64,
}

impl FileStore {
    /// Open (creating if needed) the current version of `kind` under
    /// `{root}/{db_name}/{kind}-v{version}`
    pub async fn open(root: impl AsRef<Path>, db_name: &str, kind: StoreKind) -> Result<Self> {
        let dir = root.as_ref().join(db_name).join(kind.store_name());
        Self::open_dir(dir).await
    }

    /// Open a store rooted at an explicit directory
    pub async fn open_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let staging = dir.join(STAGING_DIR);

        // Leftovers from an interrupted write are never visible, drop them
        match tokio::fs::remove_dir_all(&staging).await {
            Ok(()) => log::debug!("Discarded stale staging area in {}", dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&staging).await?;

        Ok(Self {
            dir,
            staging,
            write_lock: Mutex::new(()),
            next_temp: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('.') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(urlencoding::encode(key).as_ref()))
    }

    /// Write `value` to a fresh staging file, returning (staging, target)
    async fn stage(&self, key: &str, value: &[u8]) -> Result<(PathBuf, PathBuf)> {
        let target = self.entry_path(key)?;
        let n = self.next_temp.fetch_add(1, Ordering::Relaxed);
        let temp = self.staging.join(format!("{:016x}", n));
        tokio::fs::write(&temp, value).await?;
        Ok((temp, target))
    }

    /// Link the current value of `target` into staging so it can be restored
    async fn back_up(&self, target: &Path) -> std::io::Result<Option<PathBuf>> {
        let n = self.next_temp.fetch_add(1, Ordering::Relaxed);
        let backup = self.staging.join(format!("{:016x}.bak", n));
        match tokio::fs::hard_link(target, &backup).await {
            Ok(()) => Ok(Some(backup)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// An entry renamed into place by the batch being written
struct Commit {
    target: PathBuf,
    /// Previous value, `None` when the key was new
    backup: Option<PathBuf>,
}

/// Put back the previous value of every committed entry
async fn roll_back(committed: Vec<Commit>) {
    for commit in committed.into_iter().rev() {
        match commit.backup {
            Some(backup) => {
                if let Err(e) = tokio::fs::rename(&backup, &commit.target).await {
                    log::warn!("Failed to restore {}: {}", commit.target.display(), e);
                }
            }
            None => discard(std::iter::once(&commit.target)).await,
        }
    }
}

async fn discard<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                log::warn!("Failed to discard {}: {}", path.display(), e);
            }
        }
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.set_batch(vec![(key.to_string(), value)]).await
    }

    async fn set_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut staged = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            match self.stage(key, value).await {
                Ok(pair) => staged.push(pair),
                Err(e) => {
                    discard(staged.iter().map(|(temp, _)| temp)).await;
                    return Err(e);
                }
            }
        }

        let mut committed: Vec<Commit> = Vec::with_capacity(staged.len());
        for (i, (temp, target)) in staged.iter().enumerate() {
            let result = match self.back_up(target).await {
                Ok(backup) => match tokio::fs::rename(temp, target).await {
                    Ok(()) => Ok(backup),
                    Err(e) => Err((e, backup)),
                },
                Err(e) => Err((e, None)),
            };
            match result {
                Ok(backup) => committed.push(Commit {
                    target: target.clone(),
                    backup,
                }),
                Err((e, backup)) => {
                    log::warn!(
                        "Commit of {} failed, rolling back {} entries: {}",
                        target.display(),
                        committed.len(),
                        e
                    );
                    discard(backup.iter()).await;
                    roll_back(committed).await;
                    discard(staged[i..].iter().map(|(temp, _)| temp)).await;
                    return Err(e.into());
                }
            }
        }

        discard(committed.iter().filter_map(|c| c.backup.as_ref())).await;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                log::warn!("Skipping non UTF-8 entry in {}", self.dir.display());
                continue;
            };
            match urlencoding::decode(name) {
                Ok(key) => keys.push(key.into_owned()),
                Err(e) => log::warn!("Skipping undecodable entry {}: {}", name, e),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}
