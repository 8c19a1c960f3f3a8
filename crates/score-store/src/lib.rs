mod cleanup;
mod file;
mod memory;
mod pinned;
mod store;
mod types;

pub use cleanup::drop_stale_versions;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use pinned::PinnedStore;
pub use store::{DurableStore, get_json, set_json};
pub use types::*;
