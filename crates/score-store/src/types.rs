use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Database name shared by every namespace on disk
pub const DEFAULT_DB_NAME: &str = "@sr";

/// Logical namespaces of the durable store.
///
/// Each namespace carries its own schema version so that bumping one drops
/// only that namespace's stale data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Per-page ink annotations
    Annotations,
    /// Raw score documents and their previews
    ScoreCache,
    /// Pinned scores per library
    Pinned,
}

impl StoreKind {
    pub const ALL: [StoreKind; 3] = [StoreKind::Annotations, StoreKind::ScoreCache, StoreKind::Pinned];

    pub fn name(self) -> &'static str {
        match self {
            StoreKind::Annotations => "annotations",
            StoreKind::ScoreCache => "score-cache",
            StoreKind::Pinned => "pinned",
        }
    }

    /// Current schema version
    pub fn version(self) -> u32 {
        match self {
            StoreKind::Annotations => 1,
            StoreKind::ScoreCache => 4,
            StoreKind::Pinned => 1,
        }
    }

    /// Directory name of the current version, e.g. `score-cache-v4`
    pub fn store_name(self) -> String {
        self.store_name_for(self.version())
    }

    pub fn store_name_for(self, version: u32) -> String {
        format!("{}-v{}", self.name(), version)
    }
}
