//! Session list and transcript mutation helpers.
//!
//! Sessions are mutated through these helpers only, keeping updates
//! whole-value and atomic from the perspective of the single consumer that
//! owns the list.

use uuid::Uuid;

use pkpchat_types::{Message, Session};

/// Create a fresh session and return its id; the new session becomes the
/// natural active candidate for the caller.
pub fn create_session(sessions: &mut Vec<Session>) -> Uuid {
    let session = Session::new();
    let id = session.id;
    sessions.push(session);
    id
}

/// Remove a session. Returns true when something was actually deleted.
pub fn delete_session(sessions: &mut Vec<Session>, id: Uuid) -> bool {
    let before = sessions.len();
    sessions.retain(|s| s.id != id);
    sessions.len() != before
}

/// The newest session by creation time, used to pick a replacement active
/// session after a deletion or eviction.
pub fn newest_session(sessions: &[Session]) -> Option<Uuid> {
    sessions.iter().max_by_key(|s| s.created_at).map(|s| s.id)
}

pub fn find_session_mut(sessions: &mut [Session], id: Uuid) -> Option<&mut Session> {
    sessions.iter_mut().find(|s| s.id == id)
}

/// Replace the stored copy of a message (matched by id) with `message`.
/// Used to publish each aggregation step of an in-progress assistant turn.
pub fn replace_message(session: &mut Session, message: &Message) {
    if let Some(slot) = session.messages.iter_mut().find(|m| m.id == message.id) {
        *slot = message.clone();
    }
}

/// Drop a message from the transcript. The cancellation path uses this to
/// discard the partially-built assistant message.
pub fn discard_message(session: &mut Session, id: Uuid) {
    session.messages.retain(|m| m.id != id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkpchat_types::ChatMode;

    #[test]
    fn test_create_and_delete() {
        let mut sessions = Vec::new();
        let a = create_session(&mut sessions);
        let b = create_session(&mut sessions);
        assert_eq!(sessions.len(), 2);

        assert!(delete_session(&mut sessions, a));
        assert!(!delete_session(&mut sessions, a));
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, b);
    }

    #[test]
    fn test_newest_session_wins() {
        let mut sessions = Vec::new();
        create_session(&mut sessions);
        let newest = create_session(&mut sessions);
        sessions[1].created_at = sessions[0].created_at + chrono::Duration::seconds(10);
        assert_eq!(newest_session(&sessions), Some(newest));
    }

    #[test]
    fn test_replace_and_discard_message() {
        let mut session = Session::new();
        let message = Message::user_text("hello", ChatMode::Text);
        let id = message.id;
        session.messages.push(message.clone());

        let mut updated = message;
        if let pkpchat_types::MessageBody::Text { content, .. } = &mut updated.body {
            content.push_str(" world");
        }
        replace_message(&mut session, &updated);
        assert_eq!(session.messages[0].text_content(), "hello world");

        discard_message(&mut session, id);
        assert!(session.messages.is_empty());
    }
}
