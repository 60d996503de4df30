//! Durable local key-value storage
//!
//! The cart and the in-flight order draft live under fixed keys. Stores are
//! process-local and last-write-wins; two sessions writing the same key
//! silently overwrite each other.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::Result;

pub const CART_KEY: &str = "cart";
pub const LATEST_ORDER_KEY: &str = "latestOrder";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn write_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    store.set(key, &serde_json::to_string(value)?)
}
