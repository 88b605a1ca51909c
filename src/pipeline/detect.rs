//! Field-template detector — infers a field schema from an example image.
//!
//! Same adapters and reconciliation engine as document processing,
//! specialized by instruction text: both backends propose a field array,
//! the arbiter merges them, and the normalizer absorbs the contract
//! violations real backends commit. Nothing is persisted here; the caller
//! replaces the template's field list only on success.

use super::backends::{Backends, ImagePayload};
use super::error::PipelineError;
use super::normalize::recover_field_array;
use super::prompts::{FIELD_DETECTION_INSTRUCTION, FIELD_MERGE_INSTRUCTION};
use super::reconcile::Reconciler;
use crate::models::template::sanitize_detected_fields;
use crate::models::{Backend, FieldDef};

/// Backend that merges the two candidate field arrays.
const DETECTION_ARBITER: Backend = Backend::Gemini;

#[derive(Clone)]
pub struct FieldDetector {
    backends: Backends,
    reconciler: Reconciler,
}

impl FieldDetector {
    pub fn new(backends: Backends) -> Self {
        let reconciler = Reconciler::new(backends.clone());
        Self {
            backends,
            reconciler,
        }
    }

    /// Run dual-model detection over an example image.
    ///
    /// Returns the cleaned, re-sequenced field list, or
    /// [`PipelineError::EmptyDetection`] when nothing usable was recovered
    /// — in which case the caller must leave the template unchanged.
    pub async fn detect(&self, image: &ImagePayload) -> Result<Vec<FieldDef>, PipelineError> {
        let (gemini, openai) = tokio::join!(
            self.backends.gemini.extract(image, FIELD_DETECTION_INSTRUCTION),
            self.backends.openai.extract(image, FIELD_DETECTION_INSTRUCTION),
        );
        let gemini = gemini?;
        let openai = openai?;

        let merged = self
            .reconciler
            .reconcile(
                DETECTION_ARBITER,
                &gemini.to_json(),
                &openai.to_json(),
                Some(FIELD_MERGE_INSTRUCTION),
            )
            .await?;

        let fields = sanitize_detected_fields(recover_field_array(&merged.merged_text));
        if fields.is_empty() {
            tracing::warn!(
                merged_len = merged.merged_text.len(),
                "Field detection recovered no usable fields"
            );
            return Err(PipelineError::EmptyDetection);
        }

        tracing::info!(field_count = fields.len(), "Field detection complete");
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backends::MockBackend;
    use std::sync::Arc;

    const CANDIDATE_ARRAY: &str =
        r#"[{"name":"fullName","label":"Full Name","fieldType":"text","required":true,"order":1}]"#;

    fn payload() -> ImagePayload {
        ImagePayload::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg")
    }

    fn detector_with(gemini: MockBackend, openai: MockBackend) -> (FieldDetector, Arc<MockBackend>, Arc<MockBackend>) {
        let gemini = Arc::new(gemini);
        let openai = Arc::new(openai);
        let backends = Backends::new(gemini.clone(), openai.clone());
        (FieldDetector::new(backends), gemini, openai)
    }

    #[tokio::test]
    async fn detects_fields_from_merged_array() {
        let merged = r#"[{"name":"fullName","label":"Full Name","fieldType":"text","order":1},{"name":"email","label":"Email","fieldType":"email","order":2}]"#;
        let (detector, gemini, openai) = detector_with(
            MockBackend::new(Backend::Gemini)
                .with_extract_response(CANDIDATE_ARRAY)
                .with_complete_response(merged),
            MockBackend::new(Backend::Openai).with_extract_response(CANDIDATE_ARRAY),
        );

        let fields = detector.detect(&payload()).await.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "fullName");
        assert_eq!(fields[1].order, 2);

        // Both backends extracted once; only the arbiter merged.
        assert_eq!(gemini.extract_call_count(), 1);
        assert_eq!(openai.extract_call_count(), 1);
        assert_eq!(gemini.complete_call_count(), 1);
        assert_eq!(openai.complete_call_count(), 0);
    }

    #[tokio::test]
    async fn recovers_from_rewrapped_merge_output() {
        // Arbiter ignored the array-only contract and wrapped anyway
        let merged = r#"{"mergedFormFields":[{"name":"email","label":"Email","fieldType":"email"}]}"#;
        let (detector, _, _) = detector_with(
            MockBackend::new(Backend::Gemini)
                .with_extract_response(CANDIDATE_ARRAY)
                .with_complete_response(merged),
            MockBackend::new(Backend::Openai).with_extract_response(CANDIDATE_ARRAY),
        );

        let fields = detector.detect(&payload()).await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "email");
    }

    #[tokio::test]
    async fn unusable_merge_output_is_detection_failure() {
        let (detector, _, _) = detector_with(
            MockBackend::new(Backend::Gemini)
                .with_extract_response(CANDIDATE_ARRAY)
                .with_complete_response("Sorry, I could not find any form fields."),
            MockBackend::new(Backend::Openai).with_extract_response(CANDIDATE_ARRAY),
        );

        let err = detector.detect(&payload()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDetection));
    }

    #[tokio::test]
    async fn extraction_failure_propagates_without_retry() {
        let (detector, gemini, _) = detector_with(
            MockBackend::new(Backend::Gemini).failing_extract(),
            MockBackend::new(Backend::Openai).with_extract_response(CANDIDATE_ARRAY),
        );

        let err = detector.detect(&payload()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Backend { backend: Backend::Gemini, .. }));
        assert_eq!(gemini.extract_call_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_detected_names_are_deduplicated() {
        let merged = r#"[{"name":"email","label":"Email","fieldType":"email"},{"name":"email","label":"Email Again","fieldType":"text"}]"#;
        let (detector, _, _) = detector_with(
            MockBackend::new(Backend::Gemini)
                .with_extract_response(CANDIDATE_ARRAY)
                .with_complete_response(merged),
            MockBackend::new(Backend::Openai).with_extract_response(CANDIDATE_ARRAY),
        );

        let fields = detector.detect(&payload()).await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].label, "Email");
    }
}
