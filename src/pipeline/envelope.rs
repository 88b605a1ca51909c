//! Structured envelopes exchanged with the extraction backends.
//!
//! Backends are instructed to reply with these shapes but are not trusted
//! to comply. `from_raw` is the single degrade-gracefully point: a reply
//! that does not parse as the envelope is wrapped as plain text with a
//! reduced default confidence instead of failing the call, so callers
//! always hold a well-formed value.

use serde::{Deserialize, Serialize};

/// Confidence assigned when a backend reply had to be wrapped as-is.
pub const DEGRADED_CONFIDENCE: f32 = 0.5;

/// Provenance note attached to wrapped non-envelope replies.
const RAW_TEXT_SOURCE: &str = "raw backend response";

/// One backend's structured reading of a document image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredExtraction {
    pub text: String,
    #[serde(default = "degraded_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub metadata: ExtractionMetadata,
}

fn degraded_confidence() -> f32 {
    DEGRADED_CONFIDENCE
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_quality: Option<String>,
    /// Free-text provenance note (set when the reply was wrapped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl StructuredExtraction {
    /// Coerce a raw backend reply into the envelope.
    pub fn from_raw(raw: &str) -> Self {
        if let Ok(mut envelope) = serde_json::from_str::<StructuredExtraction>(raw) {
            envelope.confidence = envelope.confidence.clamp(0.0, 1.0);
            return envelope;
        }
        Self {
            text: raw.to_string(),
            confidence: DEGRADED_CONFIDENCE,
            metadata: ExtractionMetadata {
                source: Some(RAW_TEXT_SOURCE.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The arbiter's merged best-of-both answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedExtraction {
    pub merged_text: String,
    #[serde(default)]
    pub analysis: MergeAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeAnalysis {
    pub source_a_score: f32,
    pub source_b_score: f32,
    pub reasoning: String,
}

impl Default for MergeAnalysis {
    fn default() -> Self {
        Self {
            source_a_score: DEGRADED_CONFIDENCE,
            source_b_score: DEGRADED_CONFIDENCE,
            reasoning: String::new(),
        }
    }
}

impl MergedExtraction {
    /// Coerce a raw arbiter reply into the envelope, same rule as
    /// [`StructuredExtraction::from_raw`].
    pub fn from_raw(raw: &str) -> Self {
        if let Ok(mut envelope) = serde_json::from_str::<MergedExtraction>(raw) {
            envelope.analysis.source_a_score = envelope.analysis.source_a_score.clamp(0.0, 1.0);
            envelope.analysis.source_b_score = envelope.analysis.source_b_score.clamp(0.0, 1.0);
            return envelope;
        }
        Self {
            merged_text: raw.to_string(),
            analysis: MergeAnalysis {
                reasoning: RAW_TEXT_SOURCE.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Unwrap the extracted text of a payload that may or may not be an
/// envelope: parses as `StructuredExtraction` → its `text`; anything else
/// is used verbatim.
pub fn unwrap_text(payload: &str) -> String {
    match serde_json::from_str::<StructuredExtraction>(payload) {
        Ok(envelope) => envelope.text,
        Err(_) => payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conforming_reply_passes_through() {
        let raw = r#"{"text":"Name: Jo","confidence":0.9,"metadata":{"contentType":"form"}}"#;
        let envelope = StructuredExtraction::from_raw(raw);
        assert_eq!(envelope.text, "Name: Jo");
        assert!((envelope.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(envelope.metadata.content_type.as_deref(), Some("form"));
        assert!(envelope.metadata.source.is_none());
    }

    #[test]
    fn non_conforming_reply_is_wrapped() {
        let envelope = StructuredExtraction::from_raw("just some prose from the model");
        assert_eq!(envelope.text, "just some prose from the model");
        assert!((envelope.confidence - DEGRADED_CONFIDENCE).abs() < f32::EPSILON);
        assert!(envelope.metadata.source.is_some());
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let raw = r#"{"text":"x","confidence":7.5}"#;
        let envelope = StructuredExtraction::from_raw(raw);
        assert!((envelope.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn from_raw_round_trips_through_json() {
        // The adapter guarantee: parse(extract(...)) never fails.
        for raw in ["garbage", "", r#"{"text":"ok","confidence":0.8}"#, "{broken"] {
            let envelope = StructuredExtraction::from_raw(raw);
            let reparsed: StructuredExtraction =
                serde_json::from_str(&envelope.to_json()).unwrap();
            assert_eq!(reparsed, envelope);
        }
    }

    #[test]
    fn merged_conforming_reply_passes_through() {
        let raw = r#"{"mergedText":"final","analysis":{"sourceAScore":0.7,"sourceBScore":0.4,"reasoning":"A was fuller"}}"#;
        let merged = MergedExtraction::from_raw(raw);
        assert_eq!(merged.merged_text, "final");
        assert!((merged.analysis.source_a_score - 0.7).abs() < f32::EPSILON);
        assert_eq!(merged.analysis.reasoning, "A was fuller");
    }

    #[test]
    fn merged_non_conforming_reply_is_wrapped() {
        let merged = MergedExtraction::from_raw(r#"{"fullName":"Jo"}"#);
        assert_eq!(merged.merged_text, r#"{"fullName":"Jo"}"#);
        assert!((merged.analysis.source_a_score - DEGRADED_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn merged_from_raw_round_trips_through_json() {
        for raw in ["", "plain text", r#"{"mergedText":"m"}"#] {
            let merged = MergedExtraction::from_raw(raw);
            let reparsed: MergedExtraction = serde_json::from_str(&merged.to_json()).unwrap();
            assert_eq!(reparsed, merged);
        }
    }

    #[test]
    fn unwrap_text_prefers_envelope_field() {
        let raw = r#"{"text":"inner","confidence":0.8}"#;
        assert_eq!(unwrap_text(raw), "inner");
        assert_eq!(unwrap_text("not an envelope"), "not an envelope");
        assert_eq!(unwrap_text(""), "");
    }
}
