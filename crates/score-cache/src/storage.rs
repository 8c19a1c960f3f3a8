//! Remote object storage the fetcher downloads parts from

use crate::types::*;
use async_trait::async_trait;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Read access to the bucket holding uploaded parts.
///
/// Every failure, whether the object is missing or the transport broke,
/// surfaces as [`CacheError::NotFound`]. Retrying is the caller's business.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn download(&self, path: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET against `{base_url}/{path}`
#[derive(Clone)]
pub struct HttpObjectStorage {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(path);
        let agent = self.agent.clone();

        // ureq is blocking, keep it off the async threads
        tokio::task::spawn_blocking(move || {
            let response = agent
                .get(&url)
                .call()
                .map_err(|e| CacheError::NotFound(format!("{}: {}", url, e)))?;

            let mut bytes = Vec::new();
            response
                .into_reader()
                .read_to_end(&mut bytes)
                .map_err(|e| CacheError::NotFound(format!("{}: {}", url, e)))?;
            Ok(bytes)
        })
        .await?
    }
}

/// Local mirror of the bucket, one file per object path
#[derive(Debug, Clone)]
pub struct DirectoryObjectStorage {
    root: PathBuf,
}

impl DirectoryObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CacheError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for DirectoryObjectStorage {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.path_for(path)?;
        tokio::fs::read(&file)
            .await
            .map_err(|e| CacheError::NotFound(format!("{}: {}", file.display(), e)))
    }
}
