use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::{Backend, ResultStatus};

/// The outcome of running one physical document through the pipeline.
///
/// Created in `processing` the moment a document is accepted, then mutated
/// in place as each phase completes. `complete` and `failed` are terminal;
/// a failed marker never overwrites a previously complete row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub id: i64,
    pub template_id: i64,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub original_path: Option<String>,
    /// Raw structured envelope from each backend's extraction pass.
    pub gemini_data: Option<String>,
    pub openai_data: Option<String>,
    /// Merged candidate as reconciled by each backend acting as arbiter.
    pub gemini_result: Option<String>,
    pub openai_result: Option<String>,
    /// Normalized field-name → value map, set once a winner is selected
    /// (or pre-set by the batch flow).
    pub extracted_data: Option<String>,
    pub selected_result: Option<Backend>,
    pub status: ResultStatus,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
}

impl DocumentResult {
    /// The merged candidate produced with `backend` as arbiter, if present.
    pub fn candidate(&self, backend: Backend) -> Option<&str> {
        match backend {
            Backend::Gemini => self.gemini_result.as_deref(),
            Backend::Openai => self.openai_result.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result() -> DocumentResult {
        DocumentResult {
            id: 1,
            template_id: 7,
            file_name: "invoice.png".into(),
            file_size: Some(1024),
            original_path: None,
            gemini_data: None,
            openai_data: None,
            gemini_result: Some("merged-by-gemini".into()),
            openai_result: None,
            extracted_data: None,
            selected_result: None,
            status: ResultStatus::Processing,
            error: None,
            created_at: chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn candidate_picks_matching_side() {
        let result = make_result();
        assert_eq!(result.candidate(Backend::Gemini), Some("merged-by-gemini"));
        assert_eq!(result.candidate(Backend::Openai), None);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(make_result()).unwrap();
        assert!(json.get("templateId").is_some());
        assert!(json.get("geminiResult").is_some());
        assert_eq!(json["status"], "processing");
    }
}
