use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Store error: {0}")]
    Store(#[from] score_store::StoreError),
    #[error("Cache error: {0}")]
    Cache(#[from] score_cache::CacheError),
    #[error("Annotation error: {0}")]
    Annotation(#[from] score_annotate::AnnotationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
