use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;
use super::KeyValueStore;
use crate::{Result, StorefrontError};

/// One file per key under a directory. Writes go through a temp file and a
/// rename so a crash never leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StorefrontError::Storage(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(StorefrontError::Storage(format!("invalid key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_err(path: &Path, e: std::io::Error) -> StorefrontError { StorefrontError::Storage(format!("{}: {e}", path.display())) }

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key)?;
        let tmp = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, value).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        debug!(key, bytes = value.len(), "stored");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf { std::env::temp_dir().join(format!("storefront-cart-{}", Uuid::new_v4())) }

    #[test]
    fn test_file_store_round_trip() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).unwrap();
        assert_eq!(store.get("latestOrder").unwrap(), None);
        store.set("latestOrder", "{\"data\":{}}").unwrap();
        assert_eq!(store.get("latestOrder").unwrap().as_deref(), Some("{\"data\":{}}"));
        store.set("latestOrder", "{}").unwrap();
        assert_eq!(store.get("latestOrder").unwrap().as_deref(), Some("{}"));
        store.remove("latestOrder").unwrap();
        store.remove("latestOrder").unwrap();
        assert_eq!(store.get("latestOrder").unwrap(), None);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).unwrap();
        assert!(store.set("../cart", "[]").is_err());
        assert!(store.get("").is_err());
        fs::remove_dir_all(dir).unwrap();
    }
}
