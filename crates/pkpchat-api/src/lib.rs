//! Generation provider interface for pkpchat
//!
//! Defines the capability consumed by the rest of the system — title
//! generation, grounded chat streaming, presentation streaming, and image
//! generation — plus the HTTP client implementation.

mod gemini_client;

pub use gemini_client::{
    GeminiClient, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_IMAGE_MODEL,
};

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use pkpchat_types::{Attachment, ContextUnit, StreamFragment};

/// Provider failure taxonomy. Safety rejections are distinguished from
/// general failures so the UI can show them verbatim.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("The request was rejected for safety reasons: {0}")]
    SafetyRejected(String),
    #[error("provider request failed: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("malformed provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A finite, single-pass sequence of response fragments. Cancellation is the
/// consumer abandoning it; it is not restartable.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamFragment, ProviderError>> + Send>>;

/// The external generation capability, injected where needed so tests can
/// substitute a scripted fake.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Best-effort short label for a new conversation. Returns a fixed
    /// fallback on any failure; never errors.
    async fn generate_title(&self, prompt: &str) -> String;

    /// Conversational generation with web-search grounding. `contents` is
    /// the sanitized context including the new prompt as its final unit.
    async fn generate_content_stream(
        &self,
        contents: Vec<ContextUnit>,
    ) -> Result<FragmentStream, ProviderError>;

    /// Slide-deck generation/editing. The concatenated deltas are expected
    /// (not guaranteed) to form a complete HTML document by stream end.
    async fn generate_presentation_stream(
        &self,
        contents: Vec<ContextUnit>,
    ) -> Result<FragmentStream, ProviderError>;

    /// Single-shot image generation; returns a `data:` URI.
    async fn generate_image(
        &self,
        prompt: &str,
        attachment: Option<&Attachment>,
    ) -> Result<String, ProviderError>;
}
