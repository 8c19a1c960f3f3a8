use crate::types::*;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Namespaced key-value store that survives restarts.
///
/// Values are opaque bytes. `set_batch` is all-or-nothing: either every entry
/// becomes visible or none does. Entries are committed in the order given.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    async fn set_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Read a JSON value, `None` when the key is absent
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Write a value as JSON, overwriting any previous value
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn DurableStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, bytes).await
}
