pub mod config;
pub mod logger;
pub mod services;
pub mod types;
pub mod worker;

pub use config::{ReaderConfig, RemoteSource};
pub use logger::{LogEntry, ReaderLogger};
pub use services::{ReaderServices, Stores, default_rasterizer, placeholder_rasterizer, remote_storage};
pub use types::*;
pub use worker::worker_task;

// Re-export types from library crates
pub use score_cache::{CacheState, DocumentIdentity, PassReport, Score};

/// Commands sent from a front end to the worker
#[derive(Debug, Clone)]
pub enum ReaderCommand {
    /// Replace the set of scores the user can access
    SetDocuments { scores: Vec<Score> },
    SetOnline { online: bool },
    ViewerOpen { identity: DocumentIdentity },
    ViewerShowPage { page_index: usize },
    ViewerClose,
}

/// Updates sent from the worker to a front end
#[derive(Debug, Clone)]
pub enum ReaderUpdate {
    Progress {
        current: usize,
        total: usize,
        score_key: String,
        title: String,
    },
    CacheState {
        score_key: String,
        state: CacheState,
    },
    PassFinished {
        report: PassReport,
    },
    ViewerOpened {
        identity: DocumentIdentity,
        page_count: usize,
        /// Image URL of the cached preview, published as page 0
        preview: Option<String>,
    },
    ViewerPageRendered {
        page_index: usize,
        url: String,
        width: u32,
        height: u32,
    },
    ViewerClosed,
    Error {
        message: String,
    },
}
