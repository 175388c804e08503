//! Core types and structures for pkpchat
//!
//! This crate provides the foundational types used across all pkpchat crates:
//! sessions, messages, sources, stream fragments, and the request-scoped
//! context representation sent to the generation provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of recent messages considered when building provider context
pub const HISTORY_WINDOW: usize = 15;

/// Image attachments are sent as binary data only for this many trailing messages
pub const ATTACHMENT_RECENCY: usize = 3;

/// Minimum extracted length for a buffer to count as a real HTML document
/// rather than a stray tag fragment. Applied by callers, not the extractor.
pub const MIN_DOCUMENT_LEN: usize = 20;

/// Title shown for a session before (or instead of) a generated one
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

// ============================================================================
// Chat Modes
// ============================================================================

/// Interaction mode for a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Text,
    Image,
    Presentation,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Text => "text",
            ChatMode::Image => "image",
            ChatMode::Presentation => "presentation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "chat" => Some(ChatMode::Text),
            "image" | "img" => Some(ChatMode::Image),
            "presentation" | "slides" | "deck" => Some(ChatMode::Presentation),
            _ => None,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Streaming lifecycle of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MessageStatus {
    InProgress,
    #[default]
    Complete,
}

/// A web citation attached to an assistant turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

/// An image carried alongside a user prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Raw base64 payload, no data-URI prefix
    pub data: String,
    pub mime_type: String,
}

/// Message payload, tagged by kind so that illegal combinations
/// (e.g. an image message carrying sources) are unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sources: Vec<Source>,
        #[serde(default)]
        mode: ChatMode,
    },
    Image {
        /// Full data URI (`data:image/...;base64,...`)
        data_uri: String,
    },
    Error {
        message: String,
    },
}

/// One entry in a session's transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    #[serde(flatten)]
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attachment: Option<Attachment>,
}

impl Message {
    pub fn user_text(content: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            body: MessageBody::Text {
                content: content.into(),
                sources: Vec::new(),
                mode,
            },
            timestamp: Utc::now(),
            status: MessageStatus::Complete,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// A fresh assistant message about to receive stream fragments
    pub fn assistant_in_progress(mode: ChatMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            body: MessageBody::Text {
                content: String::new(),
                sources: Vec::new(),
                mode,
            },
            timestamp: Utc::now(),
            status: MessageStatus::InProgress,
            attachment: None,
        }
    }

    pub fn assistant_image(data_uri: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            body: MessageBody::Image {
                data_uri: data_uri.into(),
            },
            timestamp: Utc::now(),
            status: MessageStatus::Complete,
            attachment: None,
        }
    }

    pub fn assistant_error(message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            body: MessageBody::Error {
                message: message.into(),
            },
            timestamp: Utc::now(),
            status: MessageStatus::Complete,
            attachment: None,
        }
    }

    /// Text content for text-bodied messages, empty otherwise
    pub fn text_content(&self) -> &str {
        match &self.body {
            MessageBody::Text { content, .. } => content,
            _ => "",
        }
    }

    pub fn mode(&self) -> Option<ChatMode> {
        match &self.body {
            MessageBody::Text { mode, .. } => Some(*mode),
            _ => None,
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Stream Fragments
// ============================================================================

/// One element of a provider response stream: a text delta, a batch of
/// citations, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: Option<String>,
    pub sources: Vec<Source>,
}

impl StreamFragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text: Some(delta.into()),
            sources: Vec::new(),
        }
    }

    pub fn sources(sources: Vec<Source>) -> Self {
        Self {
            text: None,
            sources,
        }
    }
}

// ============================================================================
// Provider Context
// ============================================================================

/// Upstream role names differ from ours: assistant turns are sent as "model"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextRole {
    User,
    Model,
}

impl From<Role> for ContextRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ContextRole::User,
            Role::Assistant => ContextRole::Model,
        }
    }
}

/// Inline binary payload in a context part (camelCase on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One part of a context unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl ContextPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContextPart::Text { text: text.into() }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContextPart::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContextPart::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A request-scoped view of one conversation turn, built fresh per request
/// and discarded afterwards. Never mutates the session it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUnit {
    pub role: ContextRole,
    pub parts: Vec<ContextPart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_mode_parsing() {
        assert_eq!(ChatMode::from_str("text"), Some(ChatMode::Text));
        assert_eq!(ChatMode::from_str("IMAGE"), Some(ChatMode::Image));
        assert_eq!(ChatMode::from_str("deck"), Some(ChatMode::Presentation));
        assert_eq!(ChatMode::from_str("banana"), None);
    }

    #[test]
    fn test_message_body_tagging() {
        let msg = Message::assistant_error("boom");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, msg.body);
    }

    #[test]
    fn test_image_body_has_no_sources() {
        let msg = Message::assistant_image("data:image/png;base64,AAAA");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "image");
        assert!(json.get("sources").is_none());
    }

    #[test]
    fn test_context_part_wire_shape() {
        let part = ContextPart::inline("image/png", "AAAA");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["inlineData"]["mimeType"], "image/png");

        let text = ContextPart::text("hello");
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["text"], "hello");
    }

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new();
        assert_eq!(session.title, DEFAULT_SESSION_TITLE);
        assert!(session.messages.is_empty());
    }
}
