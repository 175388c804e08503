//! Application state: the session list, the active session, and the
//! injected provider/storage capabilities.

mod repl;
mod turn;

pub use repl::run_repl;

use colored::Colorize;
use uuid::Uuid;

use pkpchat_api::GenerationProvider;
use pkpchat_chat::session;
use pkpchat_storage::{KeyValueStore, SessionStore};
use pkpchat_types::{ChatMode, Session};

pub struct App<P, S: KeyValueStore> {
    pub provider: P,
    pub store: SessionStore<S>,
    pub sessions: Vec<Session>,
    pub active: Uuid,
    pub selected_mode: ChatMode,
    pub verbose: bool,
}

impl<P: GenerationProvider, S: KeyValueStore> App<P, S> {
    pub fn new(provider: P, store: SessionStore<S>, verbose: bool) -> Self {
        let state = store.load();
        Self {
            provider,
            store,
            sessions: state.sessions,
            active: state.active,
            selected_mode: ChatMode::Text,
            verbose,
        }
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == self.active)
    }

    /// Start a fresh conversation and make it active.
    pub fn new_session(&mut self) -> Uuid {
        let id = session::create_session(&mut self.sessions);
        self.active = id;
        self.persist();
        id
    }

    /// Delete a session; when it was active, the newest remaining session
    /// (or a fresh one) takes over.
    pub fn delete_session(&mut self, id: Uuid) -> bool {
        let deleted = session::delete_session(&mut self.sessions, id);
        if deleted && self.active == id {
            self.active = match session::newest_session(&self.sessions) {
                Some(newest) => newest,
                None => session::create_session(&mut self.sessions),
            };
        }
        if deleted {
            self.persist();
        }
        deleted
    }

    /// Write the session list and active pointer through the store. Quota
    /// pressure may shrink the list (oldest evicted first); the in-memory
    /// state adopts whatever the store managed to persist.
    pub fn persist(&mut self) {
        match self.store.save(&self.sessions, Some(self.active)) {
            Ok(outcome) => {
                if outcome.abandoned || outcome.evicted.is_empty() {
                    return;
                }
                self.sessions = outcome.sessions;
                if let Some(active) = outcome.active {
                    self.active = active;
                }
            }
            Err(e) => {
                eprintln!("{} Failed to save sessions: {}", "⚠️".yellow(), e);
            }
        }
    }
}

/// One line per session, newest first, active one marked.
pub fn format_session_list(sessions: &[Session], active: Uuid) -> Vec<String> {
    let mut ordered: Vec<&Session> = sessions.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    ordered
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let marker = if s.id == active { "*" } else { " " };
            format!(
                "{} {:>2}. {}  ({} messages, {})",
                marker,
                i + 1,
                s.title,
                s.messages.len(),
                s.created_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect()
}

/// Resolve a 1-based index from `format_session_list` back to a session id.
pub fn session_at_index(sessions: &[Session], index: usize) -> Option<Uuid> {
    let mut ordered: Vec<&Session> = sessions.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ordered.get(index.checked_sub(1)?).map(|s| s.id)
}
