//! OpenAI backend adapter.
//!
//! Both vision extraction and arbiter calls go through the chat
//! completions endpoint with `gpt-4o`; images travel as base64 data URLs.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{ImagePayload, VisionBackend};
use crate::config::BackendConfig;
use crate::models::Backend;
use crate::pipeline::error::PipelineError;

const CHAT_MODEL: &str = "gpt-4o";
const MAX_COMPLETION_TOKENS: u32 = 1500;

/// Returned when the model produced no message content.
const NO_TEXT_FALLBACK: &str = "No text extracted";

/// System message for arbiter (text-only) calls.
const COMPLETION_SYSTEM_PROMPT: &str = "\
You are an OCR expert that compares multiple text extractions and creates \
the most accurate version.";

/// OpenAI HTTP client.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(config: &BackendConfig, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
            timeout_secs,
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, PipelineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: CHAT_MODEL,
            messages,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Backend {
                backend: Backend::Openai,
                message: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| PipelineError::Backend {
            backend: Backend::Openai,
            message: format!("Response parsing failed: {e}"),
        })?;

        Ok(response_text(parsed))
    }

    fn transport_error(&self, e: reqwest::Error) -> PipelineError {
        let message = if e.is_connect() {
            format!("Cannot reach {}: {e}", self.base_url)
        } else if e.is_timeout() {
            format!("Request timed out after {}s", self.timeout_secs)
        } else {
            e.to_string()
        };
        PipelineError::Backend {
            backend: Backend::Openai,
            message,
        }
    }
}

#[async_trait]
impl VisionBackend for OpenAiClient {
    fn id(&self) -> Backend {
        Backend::Openai
    }

    async fn extract_raw(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> Result<String, PipelineError> {
        let data = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        let data_url = format!("data:{};base64,{data}", image.mime_type);

        let messages = vec![ChatMessage {
            role: "user",
            content: ChatContent::Parts(vec![
                ContentPart::Text {
                    text: instruction.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
        }];
        self.chat(messages).await
    }

    async fn complete_raw(&self, prompt: &str) -> Result<String, PipelineError> {
        let messages = vec![
            ChatMessage {
                role: "system",
                content: ChatContent::Text(COMPLETION_SYSTEM_PROMPT.to_string()),
            },
            ChatMessage {
                role: "user",
                content: ChatContent::Text(prompt.to_string()),
            },
        ];
        self.chat(messages).await
    }
}

// ── Wire types ──

#[derive(Serialize)]
struct ChatRequest {
    model: &'static str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: ChatContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn response_text(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .find_map(|c| c.message.content.filter(|t| !t.is_empty()))
        .unwrap_or_else(|| NO_TEXT_FALLBACK.to_string())
}
