pub mod coordinator;
pub mod document;
pub mod fetcher;
pub mod images;
pub mod raster;
pub mod render;
pub mod session;
pub mod states;
pub mod storage;
pub mod types;

pub use coordinator::{CacheCoordinator, Liveness, PassReport};
pub use document::DocumentHandle;
pub use fetcher::{CacheEntry, DEFAULT_PREVIEW_BOX, DocumentFetcher};
pub use images::{ImageHandle, ImageRegistry};
#[cfg(feature = "pdfium")]
pub use raster::PdfiumRasterizer;
pub use raster::{PlaceholderRasterizer, Rasterizer, scaled_dimensions};
pub use render::{ImageBlob, PageRenderer, cover_scale, fit_scale};
pub use session::{PagedSession, SessionSnapshot, page_window};
pub use states::CacheStates;
pub use storage::{DirectoryObjectStorage, HttpObjectStorage, ObjectStorage};
pub use types::*;
