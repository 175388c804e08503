//! Conversation pipeline for pkpchat
//!
//! This crate provides the conversation-context and document-extraction
//! pipeline: history sanitization for provider requests, HTML document
//! extraction from streaming buffers, response stream aggregation, and
//! session mutation helpers.

pub mod context;
pub mod extract;
pub mod mode;
pub mod session;
pub mod stream;

// Re-export commonly used entry points
pub use context::{build_context, find_preserve_target};
pub use extract::{extract_document, find_document_span};
pub use mode::detect_mode;
pub use stream::{drive_stream, TurnAggregator, TurnOutcome, GENERIC_FAILURE_TEXT};
