//! Gemini backend adapter.
//!
//! Vision extraction goes through `gemini-1.5-pro-vision`
//! (`generateContent` with an inline image part); arbiter calls use the
//! text model. Safety thresholds mirror the product defaults.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{ImagePayload, VisionBackend};
use crate::config::BackendConfig;
use crate::models::Backend;
use crate::pipeline::error::PipelineError;

const VISION_MODEL: &str = "gemini-1.5-pro-vision";
const TEXT_MODEL: &str = "gemini-1.5-pro";

/// Returned when the model produced no text part at all.
const NO_TEXT_FALLBACK: &str = "No text extracted";

const SAFETY_SETTINGS: &[SafetySetting] = &[
    SafetySetting {
        category: "HARM_CATEGORY_HARASSMENT",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
    SafetySetting {
        category: "HARM_CATEGORY_HATE_SPEECH",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
    SafetySetting {
        category: "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
    SafetySetting {
        category: "HARM_CATEGORY_DANGEROUS_CONTENT",
        threshold: "BLOCK_MEDIUM_AND_ABOVE",
    },
];

/// Gemini HTTP client.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl GeminiClient {
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

    async fn generate(&self, model: &str, parts: Vec<Part<'_>>) -> Result<String, PipelineError> {
        let url = format!(
            "{}/v1beta/models/{model}:generateContent?key={}",
            self.base_url, self.api_key
        );
        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
            safety_settings: SAFETY_SETTINGS,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Backend {
                backend: Backend::Gemini,
                message: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            PipelineError::Backend {
                backend: Backend::Gemini,
                message: format!("Response parsing failed: {e}"),
            }
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
            backend: Backend::Gemini,
            message,
        }
    }
}

#[async_trait]
impl VisionBackend for GeminiClient {
    fn id(&self) -> Backend {
        Backend::Gemini
    }

    async fn extract_raw(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> Result<String, PipelineError> {
        let data = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        let parts = vec![
            Part::Text { text: instruction },
            Part::Inline {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data,
                },
            },
        ];
        self.generate(VISION_MODEL, parts).await
    }

    async fn complete_raw(&self, prompt: &str) -> Result<String, PipelineError> {
        self.generate(TEXT_MODEL, vec![Part::Text { text: prompt }])
            .await
    }
}

// ── Wire types ──

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "safetySettings")]
    safety_settings: &'static [SafetySetting],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inline_data")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn response_text(response: GenerateContentResponse) -> String {
    response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text.filter(|t| !t.is_empty()))
        .unwrap_or_else(|| NO_TEXT_FALLBACK.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> GeminiClient {
        GeminiClient::new(
            &BackendConfig {
                base_url: base_url.to_string(),
                api_key: "test-key".to_string(),
            },
            30,
        )
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = test_client("https://generativelanguage.googleapis.com/");
        assert_eq!(client.base_url, "https://generativelanguage.googleapis.com");
        assert_eq!(client.timeout_secs, 30);
    }

    #[test]
    fn request_body_shape() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "extract" },
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: "image/png".into(),
                            data: "aGk=".into(),
                        },
                    },
                ],
            }],
            safety_settings: SAFETY_SETTINGS,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "extract");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/png"
        );
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
    }

    #[test]
    fn response_text_takes_first_part() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r##"{"candidates":[{"content":{"parts":[{"text":"# Invoice\nTotal: 12"}]}}]}"##,
        )
        .unwrap();
        assert_eq!(response_text(parsed), "# Invoice\nTotal: 12");
    }

    #[test]
    fn response_text_empty_candidates_falls_back() {
        let parsed: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(response_text(parsed), NO_TEXT_FALLBACK);

        let parsed: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(response_text(parsed), NO_TEXT_FALLBACK);
    }

    #[test]
    fn response_text_skips_empty_parts() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":""},{"text":"real"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(parsed), "real");
    }

    #[tokio::test]
    async fn unreachable_host_surfaces_backend_error() {
        // Port 1 on localhost is never listening; connect fails fast.
        let client = test_client("http://127.0.0.1:1");
        let payload = ImagePayload::new(vec![1, 2, 3], "image/png");
        let err = client.extract_raw(&payload, "go").await.unwrap_err();
        match err {
            PipelineError::Backend { backend, message } => {
                assert_eq!(backend, Backend::Gemini);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
