use std::fs;
use std::path::{Path, PathBuf};

use crate::{KeyValueStore, StorageError};

/// File-backed key-value store: one file per key under a data directory,
/// with an optional byte quota enforced on writes.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            quota_bytes: None,
        })
    }

    pub fn with_quota<P: AsRef<Path>>(dir: P, quota_bytes: usize) -> Result<Self, StorageError> {
        let mut store = Self::new(dir)?;
        store.quota_bytes = Some(quota_bytes);
        Ok(store)
    }

    fn key_path(&self, key: &str) -> PathBuf {
        // Keys are fixed identifiers, not user input, but keep the file name safe
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    fn used_bytes_without(&self, skip: &Path) -> Result<usize, StorageError> {
        let mut total = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path() == skip {
                continue;
            }
            total += entry.metadata()?.len() as usize;
        }
        Ok(total)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);
        if let Some(quota) = self.quota_bytes {
            let projected = self.used_bytes_without(&path)? + value.len();
            if projected > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        fs::write(&path, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path()).unwrap();

        assert!(store.get("chatSessions").unwrap().is_none());
        store.set("chatSessions", "[]").unwrap();
        assert_eq!(store.get("chatSessions").unwrap().as_deref(), Some("[]"));

        store.remove("chatSessions").unwrap();
        assert!(store.get("chatSessions").unwrap().is_none());
    }

    #[test]
    fn test_quota_enforced() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::with_quota(dir.path(), 16).unwrap();

        store.set("a", "0123456789").unwrap();
        assert!(matches!(
            store.set("b", "0123456789"),
            Err(StorageError::QuotaExceeded)
        ));

        // Shrinking an existing key is always allowed
        store.set("a", "01").unwrap();
        store.set("b", "0123456789").unwrap();
    }
}
