use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;

use pkpchat_logging::{log_request, log_request_to_file, log_stream_chunk};
use pkpchat_types::{
    Attachment, ContextPart, ContextRole, ContextUnit, Source, StreamFragment,
    DEFAULT_SESSION_TITLE,
};

use crate::{FragmentStream, GenerationProvider, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const TITLE_INSTRUCTION: &str = "Generate a concise title (at most five words) for a chat that \
    starts with the following message. Respond with the title only, no quotes or punctuation.";

const PRESENTATION_INSTRUCTION: &str = "You are a presentation designer. Produce a complete, \
    self-contained HTML slide deck as a single document: start with <!doctype html>, end with \
    </html>, one <section> per slide, all styling inline in a <style> block, no external assets. \
    When editing an existing deck, return the full updated document. Respond with only the HTML.";

/// Client for a Gemini-style generative REST API.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    chat_model: String,
    image_model: String,
    client: reqwest::Client,
    verbose: bool,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, verbose: bool) -> Self {
        // Ensure base_url doesn't end with a slash
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            api_key,
            base_url,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            client: reqwest::Client::new(),
            verbose,
        }
    }

    pub fn with_models(mut self, chat_model: String, image_model: String) -> Self {
        self.chat_model = chat_model;
        self.image_model = image_model;
        self
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    fn content_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn open_stream(
        &self,
        request: serde_json::Value,
    ) -> Result<FragmentStream, ProviderError> {
        let url = self.stream_url(&self.chat_model);
        log_request(&url, &request, &self.api_key, self.verbose);
        let _ = log_request_to_file(&url, &request, &self.chat_model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(ProviderError::Api(format!("status {}: {}", status, body)));
        }

        let mut byte_stream = response.bytes_stream();
        let verbose = self.verbose;

        let fragments = stream! {
            let mut buffer = String::new();
            let mut chunk_counter = 0usize;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ProviderError::Network(e));
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete SSE events ("data: {json}\n\n")
                while let Some(event_end) = buffer.find("\n\n") {
                    let event = buffer[..event_end].to_string();
                    buffer = buffer[event_end + 2..].to_string();

                    for line in event.lines() {
                        if let Some(data) = line.strip_prefix("data: ") {
                            chunk_counter += 1;
                            log_stream_chunk(chunk_counter, data, verbose);
                            match parse_stream_chunk(data) {
                                Ok(Some(fragment)) => yield Ok(fragment),
                                Ok(None) => {}
                                Err(e) => {
                                    yield Err(e);
                                    return;
                                }
                            }
                        }
                    }
                }
            }

            // Trailing event without a blank-line terminator
            if let Some(data) = buffer.trim().strip_prefix("data: ") {
                if let Ok(Some(fragment)) = parse_stream_chunk(data) {
                    yield Ok(fragment);
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    async fn generate_title(&self, prompt: &str) -> String {
        let request = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{}\n\n{}", TITLE_INSTRUCTION, prompt) }],
            }],
        });

        let url = self.content_url(&self.chat_model);
        let _ = log_request_to_file(&url, &request, &self.chat_model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await;

        let title = async {
            let response = response.ok()?;
            if !response.status().is_success() {
                return None;
            }
            let body: GenerateResponse = response.json().await.ok()?;
            let text = body.first_text()?;
            let cleaned = clean_title(&text);
            (!cleaned.is_empty()).then_some(cleaned)
        }
        .await;

        title.unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string())
    }

    async fn generate_content_stream(
        &self,
        contents: Vec<ContextUnit>,
    ) -> Result<FragmentStream, ProviderError> {
        let request = serde_json::json!({
            "contents": contents,
            "tools": [{ "googleSearch": {} }],
        });
        self.open_stream(request).await
    }

    async fn generate_presentation_stream(
        &self,
        contents: Vec<ContextUnit>,
    ) -> Result<FragmentStream, ProviderError> {
        let request = serde_json::json!({
            "contents": contents,
            "systemInstruction": {
                "parts": [{ "text": PRESENTATION_INSTRUCTION }],
            },
        });
        self.open_stream(request).await
    }

    async fn generate_image(
        &self,
        prompt: &str,
        attachment: Option<&Attachment>,
    ) -> Result<String, ProviderError> {
        let mut unit = ContextUnit {
            role: ContextRole::User,
            parts: vec![ContextPart::text(prompt)],
        };
        if let Some(att) = attachment {
            unit.parts
                .push(ContextPart::inline(att.mime_type.clone(), att.data.clone()));
        }

        let request = serde_json::json!({
            "contents": [unit],
            "generationConfig": { "responseModalities": ["IMAGE"] },
        });

        let url = self.content_url(&self.image_model);
        log_request(&url, &request, &self.api_key, self.verbose);
        let _ = log_request_to_file(&url, &request, &self.image_model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(ProviderError::Api(format!("status {}: {}", status, body)));
        }

        let body: GenerateResponse = serde_json::from_str(&response.text().await?)?;
        extract_image_data_uri(&body)
    }
}

// ============================================================================
// Response decoding
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineDataPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPart {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: String,
    title: Option<String>,
}

impl GenerateResponse {
    fn first_text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Decode one SSE data payload into a stream fragment. Chunks that carry
/// neither text nor citations (role-only deltas, usage metadata) yield None.
fn parse_stream_chunk(data: &str) -> Result<Option<StreamFragment>, ProviderError> {
    let chunk: GenerateResponse = serde_json::from_str(data)?;

    if let Some(reason) = blocked_reason(&chunk) {
        return Err(ProviderError::SafetyRejected(reason));
    }

    let Some(candidate) = chunk.candidates.first() else {
        return Ok(None);
    };

    let text: String = candidate
        .content
        .iter()
        .flat_map(|c| c.parts.iter())
        .filter_map(|p| p.text.as_deref())
        .collect();

    let sources: Vec<Source> = candidate
        .grounding_metadata
        .iter()
        .flat_map(|g| g.grounding_chunks.iter())
        .filter_map(|c| c.web.as_ref())
        .map(|web| Source {
            uri: web.uri.clone(),
            title: web.title.clone().unwrap_or_else(|| web.uri.clone()),
        })
        .collect();

    if text.is_empty() && sources.is_empty() {
        return Ok(None);
    }

    Ok(Some(StreamFragment {
        text: (!text.is_empty()).then_some(text),
        sources,
    }))
}

fn blocked_reason(response: &GenerateResponse) -> Option<String> {
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            return Some(format!("blocked ({})", reason));
        }
    }
    let finish = response.candidates.first()?.finish_reason.as_deref()?;
    matches!(finish, "SAFETY" | "IMAGE_SAFETY" | "PROHIBITED_CONTENT")
        .then(|| format!("blocked ({})", finish))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn extract_image_data_uri(response: &GenerateResponse) -> Result<String, ProviderError> {
    if let Some(reason) = blocked_reason(response) {
        return Err(ProviderError::SafetyRejected(reason));
    }

    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .and_then(|content| content.parts.iter().find_map(|p| p.inline_data.as_ref()))
        .map(|inline| format!("data:{};base64,{}", inline.mime_type, inline.data))
        .ok_or_else(|| ProviderError::Api("response contained no image data".to_string()))
}

fn clean_title(raw: &str) -> String {
    let cleaned = raw.trim().trim_matches(['"', '\'', '`']).trim();
    let first_line = cleaned.lines().next().unwrap_or("");
    pkpchat_logging::safe_truncate(first_line, 60)
}
