//! Persistence for pkpchat sessions.
//!
//! A small key-value capability (get/set/remove) with file-backed and
//! in-memory implementations, plus the session store that serializes the
//! session list and active-session pointer and recovers from quota
//! pressure by evicting the oldest session.

mod file_store;
mod memory_store;
mod session_store;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use session_store::{LoadedState, SaveOutcome, SessionStore, KEY_ACTIVE_SESSION, KEY_SESSIONS};

use thiserror::Error;

/// Storage failure taxonomy. `QuotaExceeded` is distinguished because the
/// write path recovers from it by eviction rather than reporting it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::StorageFull => StorageError::QuotaExceeded,
            _ => StorageError::Backend(e.to_string()),
        }
    }
}

/// The key-value capability the rest of the system persists through.
/// Injected rather than reached for globally so tests can substitute an
/// in-memory fake.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}
