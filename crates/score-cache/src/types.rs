use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Remote object not found: {0}")]
    NotFound(String),
    #[error("Failed to decode document: {0}")]
    DecodeFailure(String),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Store error: {0}")]
    Persistence(#[from] score_store::StoreError),
    #[error("Document not cached: {0}")]
    NotCached(String),
    #[error("No document is open")]
    NotOpen,
    #[error("Page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },
    #[error("Superseded by a newer document")]
    Superseded,
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<lopdf::Error> for CacheError {
    fn from(err: lopdf::Error) -> Self {
        CacheError::DecodeFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Media cache key of the raw document at `url`
pub fn media_key(url: &str) -> String {
    format!("/{}", url)
}

/// Media cache key of the preview image of the document at `url`
pub fn preview_key(url: &str) -> String {
    format!("/{}#preview", url)
}

/// One downloadable document belonging to a score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub key: String,
    pub name: String,
    /// Size in bytes as reported by the backend
    pub size: u64,
    /// Remote path, `{score}/{part}.pdf`
    pub url: String,
}

impl Part {
    pub fn new(score_key: &str, part_key: &str, name: impl Into<String>, size: u64) -> Self {
        Self {
            key: part_key.to_string(),
            name: name.into(),
            size,
            url: DocumentIdentity::new(score_key, part_key).url(),
        }
    }

    pub fn cache_key(&self) -> String {
        media_key(&self.url)
    }

    pub fn preview_key(&self) -> String {
        preview_key(&self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub parts: Vec<Part>,
}

/// Offline availability of a score.
///
/// Absent means never attempted. Lifecycle is
/// absent → `Working` → `Success | Failed`, and a terminal state may re-enter
/// `Working` on the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheState {
    Working,
    Success,
    Failed,
}

impl CacheState {
    /// Whether `next` may follow `previous`
    pub fn can_follow(previous: Option<CacheState>, next: CacheState) -> bool {
        matches!(
            (previous, next),
            (None, CacheState::Working)
                | (Some(CacheState::Working), CacheState::Success)
                | (Some(CacheState::Working), CacheState::Failed)
                | (Some(CacheState::Success), CacheState::Working)
                | (Some(CacheState::Failed), CacheState::Working)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, CacheState::Working)
    }
}

/// Identity of an openable document: one part of one score
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentIdentity {
    pub score_key: String,
    pub part_key: String,
}

impl DocumentIdentity {
    pub fn new(score_key: impl Into<String>, part_key: impl Into<String>) -> Self {
        Self {
            score_key: score_key.into(),
            part_key: part_key.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}/{}.pdf", self.score_key, self.part_key)
    }

    pub fn media_key(&self) -> String {
        media_key(&self.url())
    }

    pub fn preview_key(&self) -> String {
        preview_key(&self.url())
    }
}

/// Width and height in points or pixels depending on context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Same box turned a quarter turn
    pub fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// Viewing surface metrics, used only to size render targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayMetrics {
    /// Surface width in device-independent pixels
    pub width: f32,
    /// Surface height in device-independent pixels
    pub height: f32,
    /// Physical pixels per device-independent pixel
    pub density: f32,
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
            density: 1.0,
        }
    }
}

impl DisplayMetrics {
    pub fn surface(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
