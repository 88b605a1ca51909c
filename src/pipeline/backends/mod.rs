//! Extraction backend adapters.
//!
//! Each adapter turns an image + instruction into a structured-text reply
//! from one vision-capable AI provider. Adapters are stateless, safe to
//! invoke concurrently, and never retry: a transport, auth, or quota error
//! surfaces as [`PipelineError::Backend`] and retry policy (currently:
//! none) belongs to the orchestrator.

pub mod gemini;
pub mod openai;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::envelope::StructuredExtraction;
use super::error::PipelineError;
use crate::models::Backend;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

/// Raw image bytes plus the sniffed MIME type, ready for a backend call.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// One vision-capable AI provider.
///
/// `extract_raw`/`complete_raw` return the provider's reply verbatim; the
/// provided `extract` wrapper is the envelope guarantee — its result always
/// parses as [`StructuredExtraction`], degrading gracefully when the
/// provider ignored the response-shape instruction.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    fn id(&self) -> Backend;

    /// Multimodal call: image + instruction → structured-text reply.
    async fn extract_raw(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> Result<String, PipelineError>;

    /// Text-only call, used when this backend acts as arbiter.
    async fn complete_raw(&self, prompt: &str) -> Result<String, PipelineError>;

    /// Extract and coerce into the structured envelope.
    async fn extract(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> Result<StructuredExtraction, PipelineError> {
        let start = std::time::Instant::now();
        let raw = self.extract_raw(image, instruction).await?;
        let envelope = StructuredExtraction::from_raw(&raw);
        tracing::info!(
            backend = %self.id(),
            image_size = image.bytes.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            confidence = envelope.confidence,
            text_len = envelope.text.len(),
            "Extraction complete"
        );
        Ok(envelope)
    }
}

/// The capability pair handed to the orchestrator. Constructed once at
/// process start; tests substitute [`MockBackend`]s.
#[derive(Clone)]
pub struct Backends {
    pub gemini: Arc<dyn VisionBackend>,
    pub openai: Arc<dyn VisionBackend>,
}

impl Backends {
    pub fn new(gemini: Arc<dyn VisionBackend>, openai: Arc<dyn VisionBackend>) -> Self {
        Self { gemini, openai }
    }

    pub fn get(&self, which: Backend) -> Arc<dyn VisionBackend> {
        match which {
            Backend::Gemini => self.gemini.clone(),
            Backend::Openai => self.openai.clone(),
        }
    }
}

/// Mock backend for testing — configurable replies, failure injection, and
/// call counters (the no-retry policy is asserted against these).
pub struct MockBackend {
    id: Backend,
    extract_response: String,
    complete_response: String,
    fail_extract: bool,
    fail_complete: bool,
    extract_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(id: Backend) -> Self {
        Self {
            id,
            extract_response: String::new(),
            complete_response: String::new(),
            fail_extract: false,
            fail_complete: false,
            extract_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_extract_response(mut self, response: &str) -> Self {
        self.extract_response = response.to_string();
        self
    }

    pub fn with_complete_response(mut self, response: &str) -> Self {
        self.complete_response = response.to_string();
        self
    }

    pub fn failing_extract(mut self) -> Self {
        self.fail_extract = true;
        self
    }

    pub fn failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    pub fn extract_call_count(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn complete_call_count(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionBackend for MockBackend {
    fn id(&self) -> Backend {
        self.id
    }

    async fn extract_raw(
        &self,
        _image: &ImagePayload,
        _instruction: &str,
    ) -> Result<String, PipelineError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_extract {
            return Err(PipelineError::Backend {
                backend: self.id,
                message: "mock extraction failure".to_string(),
            });
        }
        Ok(self.extract_response.clone())
    }

    async fn complete_raw(&self, _prompt: &str) -> Result<String, PipelineError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_complete {
            return Err(PipelineError::Backend {
                backend: self.id,
                message: "mock completion failure".to_string(),
            });
        }
        Ok(self.complete_response.clone())
    }
}
