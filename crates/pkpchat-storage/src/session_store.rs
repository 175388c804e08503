use colored::Colorize;
use uuid::Uuid;

use pkpchat_types::Session;

use crate::{KeyValueStore, StorageError};

/// Storage key holding the serialized session list
pub const KEY_SESSIONS: &str = "chatSessions";

/// Storage key holding the active session id
pub const KEY_ACTIVE_SESSION: &str = "activeSessionId";

/// Result of loading persisted state; always holds at least one session.
#[derive(Debug)]
pub struct LoadedState {
    pub sessions: Vec<Session>,
    pub active: Uuid,
}

/// Result of a save: the effective (possibly shrunk) list the store managed
/// to persist, so the caller can adopt it as its in-memory state.
#[derive(Debug)]
pub struct SaveOutcome {
    pub sessions: Vec<Session>,
    pub active: Option<Uuid>,
    pub evicted: Vec<Uuid>,
    /// Set when even an empty list could not be written; the write was
    /// abandoned and only a diagnostic recorded.
    pub abandoned: bool,
}

/// Persists the session list and active-session pointer through an injected
/// key-value capability, recovering from quota pressure by evicting the
/// oldest session and retrying.
pub struct SessionStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load persisted sessions. Malformed or missing data falls back to a
    /// freshly created empty session; never a user-facing error.
    pub fn load(&self) -> LoadedState {
        let mut sessions: Vec<Session> = match self.store.get(KEY_SESSIONS) {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(sessions) => sessions,
                Err(e) => {
                    eprintln!(
                        "{} Discarding malformed session data: {}",
                        "⚠️".yellow(),
                        e
                    );
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                eprintln!("{} Failed to read session data: {}", "⚠️".yellow(), e);
                Vec::new()
            }
        };

        if sessions.is_empty() {
            sessions.push(Session::new());
        }

        let stored_active = match self.store.get(KEY_ACTIVE_SESSION) {
            Ok(Some(id)) => Uuid::parse_str(id.trim()).ok(),
            _ => None,
        };

        // The stored pointer must refer to a session we actually have
        let active = stored_active
            .filter(|id| sessions.iter().any(|s| s.id == *id))
            .or_else(|| newest(&sessions))
            .unwrap_or(sessions[0].id);

        LoadedState { sessions, active }
    }

    /// Persist the session list and active pointer. On quota exhaustion the
    /// oldest session (by creation time) is evicted and the write retried;
    /// when the evicted session was active, the newest remaining one becomes
    /// active. If nothing remains to evict, the write is abandoned with a
    /// diagnostic.
    pub fn save(
        &mut self,
        sessions: &[Session],
        active: Option<Uuid>,
    ) -> Result<SaveOutcome, StorageError> {
        let mut working: Vec<Session> = sessions.to_vec();
        let mut active = active;
        let mut evicted = Vec::new();

        loop {
            let json = serde_json::to_string(&working)
                .map_err(|e| StorageError::Backend(e.to_string()))?;

            match self.store.set(KEY_SESSIONS, &json) {
                Ok(()) => break,
                Err(StorageError::QuotaExceeded) => {
                    let Some(oldest) = oldest_index(&working) else {
                        eprintln!(
                            "{} Storage quota exceeded with nothing left to evict; session data not saved",
                            "⚠️".yellow()
                        );
                        return Ok(SaveOutcome {
                            sessions: working,
                            active,
                            evicted,
                            abandoned: true,
                        });
                    };

                    let removed = working.remove(oldest);
                    eprintln!(
                        "{} Storage quota exceeded; evicting oldest session '{}'",
                        "⚠️".yellow(),
                        removed.title
                    );
                    if active == Some(removed.id) {
                        active = newest(&working);
                    }
                    evicted.push(removed.id);
                }
                Err(e) => return Err(e),
            }
        }

        let pointer_write = match active {
            Some(id) => self.store.set(KEY_ACTIVE_SESSION, &id.to_string()),
            None => self.store.remove(KEY_ACTIVE_SESSION),
        };
        if let Err(e) = pointer_write {
            // load() falls back to the newest session when the pointer is gone
            eprintln!(
                "{} Failed to persist active session pointer: {}",
                "⚠️".yellow(),
                e
            );
        }

        Ok(SaveOutcome {
            sessions: working,
            active,
            evicted,
            abandoned: false,
        })
    }
}

fn newest(sessions: &[Session]) -> Option<Uuid> {
    sessions.iter().max_by_key(|s| s.created_at).map(|s| s.id)
}

fn oldest_index(sessions: &[Session]) -> Option<usize> {
    sessions
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| s.created_at)
        .map(|(i, _)| i)
}
