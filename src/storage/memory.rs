use std::collections::HashMap;
use std::sync::RwLock;
use super::KeyValueStore;
use crate::{Result, StorefrontError};

/// In-memory store, used by tests and as a non-durable fallback.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn poisoned<T>(_: T) -> StorefrontError { StorefrontError::Storage("memory store lock poisoned".into()) }

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().map_err(poisoned)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}
