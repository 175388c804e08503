//! History sanitization for provider requests.
//!
//! Builds the bounded, token-economical context array sent upstream for a
//! new turn. Pure function of its inputs; no network or storage effects.

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use pkpchat_types::{
    Attachment, ContextPart, ContextRole, ContextUnit, Message, MessageBody, Role,
    ATTACHMENT_RECENCY, HISTORY_WINDOW, MIN_DOCUMENT_LEN,
};

use crate::extract::find_document_span;

/// Stand-in for an image attachment elided from older turns
pub const IMAGE_ATTACHMENT_PLACEHOLDER: &str = "[Image attachment removed to save context]";

/// Stand-in for a redacted embedded presentation document
pub const DOCUMENT_PLACEHOLDER: &str = "[Presentation HTML Code Omitted to Save Context]";

/// Stand-in for inline base64 image payloads echoed into text content
pub const BASE64_PLACEHOLDER: &str = "[Base64 Image Data Removed]";

fn data_uri_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"data:image/[A-Za-z0-9.+-]+;base64,[A-Za-z0-9+/=]+").unwrap()
    })
}

/// Find the one message whose embedded document must survive sanitization
/// verbatim: the most recent assistant message containing one. Keeping only
/// this copy lets the provider edit the deck currently on screen without
/// re-sending every historical revision.
pub fn find_preserve_target(messages: &[Message]) -> Option<Uuid> {
    messages.iter().rev().find_map(|msg| {
        if msg.role != Role::Assistant {
            return None;
        }
        contains_document(msg.text_content()).then_some(msg.id)
    })
}

fn contains_document(content: &str) -> bool {
    match find_document_span(content) {
        Some(span) => content[span].trim().len() > MIN_DOCUMENT_LEN,
        None => false,
    }
}

fn redact_document(content: &str) -> String {
    match find_document_span(content) {
        Some(span) if content[span.clone()].trim().len() > MIN_DOCUMENT_LEN => {
            let mut out = String::with_capacity(
                content.len() - span.len() + DOCUMENT_PLACEHOLDER.len(),
            );
            out.push_str(&content[..span.start]);
            out.push_str(DOCUMENT_PLACEHOLDER);
            out.push_str(&content[span.end..]);
            out
        }
        _ => content.to_string(),
    }
}

fn redact_data_uris(content: &str) -> String {
    data_uri_re().replace_all(content, BASE64_PLACEHOLDER).into_owned()
}

/// Build the context units for a new turn from the session's message list,
/// the new user prompt, and its optional attachment.
///
/// Applies the recency window, attachment retention, embedded-document
/// redaction (sparing `preserve`), and unconditional base64 redaction.
/// Messages whose parts come out empty are dropped. The prompt is appended
/// as the final user unit.
pub fn build_context(
    messages: &[Message],
    prompt: &str,
    attachment: Option<&Attachment>,
    preserve: Option<Uuid>,
) -> Vec<ContextUnit> {
    let window_start = messages.len().saturating_sub(HISTORY_WINDOW);
    let window = &messages[window_start..];
    let n = window.len();

    let mut units: Vec<ContextUnit> = Vec::with_capacity(n + 1);

    for (i, msg) in window.iter().enumerate() {
        let content = match &msg.body {
            MessageBody::Text { content, .. } => content,
            // Error turns carry nothing worth sending upstream, and generated
            // images are reachable only through their structured payload.
            MessageBody::Error { .. } | MessageBody::Image { .. } => continue,
        };

        let text = if preserve == Some(msg.id) {
            content.clone()
        } else {
            redact_document(content)
        };
        let text = redact_data_uris(&text);

        let mut parts: Vec<ContextPart> = Vec::new();
        let attachment_is_recent = i + ATTACHMENT_RECENCY >= n;

        match (&msg.attachment, attachment_is_recent) {
            (Some(att), true) => {
                if !text.trim().is_empty() {
                    parts.push(ContextPart::text(text));
                }
                parts.push(ContextPart::inline(att.mime_type.clone(), att.data.clone()));
            }
            (Some(_), false) => {
                // The placeholder rides along with the message's own text; an
                // attachment-only message outside the recency window yields no
                // parts and is dropped below.
                if !text.trim().is_empty() {
                    parts.push(ContextPart::text(format!(
                        "{}\n{}",
                        text, IMAGE_ATTACHMENT_PLACEHOLDER
                    )));
                }
            }
            (None, _) => {
                if !text.trim().is_empty() {
                    parts.push(ContextPart::text(text));
                }
            }
        }

        if parts.is_empty() {
            continue;
        }

        units.push(ContextUnit {
            role: msg.role.into(),
            parts,
        });
    }

    let mut prompt_parts = vec![ContextPart::text(prompt)];
    if let Some(att) = attachment {
        prompt_parts.push(ContextPart::inline(att.mime_type.clone(), att.data.clone()));
    }
    units.push(ContextUnit {
        role: ContextRole::User,
        parts: prompt_parts,
    });

    units
}
