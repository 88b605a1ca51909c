//! Document processing orchestrator.
//!
//! Owns the per-document state machine (`processing → complete | failed`)
//! and sequences adapter calls → reconciliation → persistence. Two entry
//! points: the synchronous dual-model test flow, and the fire-and-forget
//! batch fan-out where every document runs on its own task and failures
//! stay isolated to the one document that hit them.
//!
//! Each spawned document opens its own connection and owns its result row
//! exclusively; templates are only read here.

use rusqlite::Connection;

use super::backends::{Backends, ImagePayload};
use super::envelope::StructuredExtraction;
use super::error::PipelineError;
use super::normalize::recover_field_map;
use super::prompts;
use super::reconcile::Reconciler;
use crate::db::repository::{result as result_repo, template as template_repo};
use crate::db::{Database, DatabaseError};
use crate::models::{Backend, DocumentResult, Template};

/// One accepted upload, ready for processing.
#[derive(Debug, Clone)]
pub struct IncomingDocument {
    pub file_name: String,
    pub file_size: Option<i64>,
    pub stored_path: Option<String>,
    pub payload: ImagePayload,
}

#[derive(Clone)]
pub struct DocumentProcessor {
    backends: Backends,
    reconciler: Reconciler,
}

impl DocumentProcessor {
    pub fn new(backends: Backends) -> Self {
        let reconciler = Reconciler::new(backends.clone());
        Self {
            backends,
            reconciler,
        }
    }

    /// Single-document interactive flow ("test").
    ///
    /// Runs both backends concurrently, then both reconciliations
    /// concurrently (one per backend as arbiter), and persists the raw
    /// envelopes plus both merged candidates. Any failure first marks the
    /// result `failed`, then propagates to the caller with the underlying
    /// message.
    pub async fn run_test(
        &self,
        db: &Database,
        template: &Template,
        doc: IncomingDocument,
    ) -> Result<DocumentResult, PipelineError> {
        let conn = db.open()?;
        let pending = result_repo::insert_pending(
            &conn,
            template.id,
            &doc.file_name,
            doc.file_size,
            doc.stored_path.as_deref(),
        )?;

        tracing::info!(
            result_id = pending.id,
            template_id = template.id,
            file = %doc.file_name,
            "Test processing started"
        );

        let instruction = prompts::field_extraction_instruction(&template.fields_json());

        let (gemini, openai) = tokio::join!(
            self.backends.gemini.extract(&doc.payload, &instruction),
            self.backends.openai.extract(&doc.payload, &instruction),
        );
        let (gemini, openai) = match (gemini, openai) {
            (Ok(g), Ok(o)) => (g, o),
            (Err(e), _) | (_, Err(e)) => return self.fail(&conn, pending.id, e),
        };

        let gemini_json = gemini.to_json();
        let openai_json = openai.to_json();

        let correction = template
            .custom_instruction
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(prompts::DEFAULT_CORRECTION_INSTRUCTION);

        let (by_gemini, by_openai) = tokio::join!(
            self.reconciler
                .reconcile(Backend::Gemini, &gemini_json, &openai_json, Some(correction)),
            self.reconciler
                .reconcile(Backend::Openai, &gemini_json, &openai_json, Some(correction)),
        );
        let (by_gemini, by_openai) = match (by_gemini, by_openai) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => return self.fail(&conn, pending.id, e),
        };

        let updated = result_repo::store_test_outcome(
            &conn,
            pending.id,
            &gemini_json,
            &openai_json,
            &by_gemini.to_json(),
            &by_openai.to_json(),
        )?
        .ok_or_else(|| missing_result(pending.id))?;

        tracing::info!(result_id = updated.id, "Test processing complete");
        Ok(updated)
    }

    /// Record the winning backend for a tested document.
    ///
    /// Copies the chosen candidate through the normalizer into the
    /// canonical field map, stamps the selection, and promotes the owning
    /// template to `complete` with the backend as its preference.
    /// Idempotent: repeating the same selection re-applies cleanly.
    pub fn select_winner(
        &self,
        conn: &Connection,
        template: &Template,
        result_id: i64,
        backend: Backend,
    ) -> Result<DocumentResult, PipelineError> {
        let result =
            result_repo::get_result(conn, result_id)?.ok_or_else(|| missing_result(result_id))?;

        let candidate = result
            .candidate(backend)
            .ok_or(PipelineError::MissingCandidate { result_id, backend })?;

        let field_map = recover_field_map(candidate);
        let extracted =
            serde_json::to_string(&field_map).unwrap_or_else(|_| "{}".to_string());

        let updated = result_repo::set_selection(conn, result_id, backend, &extracted)?
            .ok_or_else(|| missing_result(result_id))?;
        template_repo::set_preferred_backend(conn, template.id, backend)?;

        tracing::info!(
            result_id,
            template_id = template.id,
            backend = %backend,
            "Winner selected"
        );
        Ok(updated)
    }

    /// Batch flow ("deploy"): create all result rows, return their ids,
    /// and fan every document out on its own task.
    ///
    /// One document's failure marks only that result `failed`; siblings
    /// run to completion independently. Callers observe progress by
    /// polling result status.
    pub async fn start_batch(
        &self,
        db: &Database,
        template: &Template,
        backend: Backend,
        docs: Vec<IncomingDocument>,
    ) -> Result<Vec<i64>, PipelineError> {
        let conn = db.open()?;
        let mut jobs = Vec::with_capacity(docs.len());
        for doc in docs {
            let row = result_repo::insert_pending(
                &conn,
                template.id,
                &doc.file_name,
                doc.file_size,
                doc.stored_path.as_deref(),
            )?;
            jobs.push((row.id, doc));
        }
        drop(conn);

        let ids: Vec<i64> = jobs.iter().map(|(id, _)| *id).collect();
        let instruction = prompts::field_extraction_instruction(&template.fields_json());
        let custom = template.custom_instruction.clone();

        tracing::info!(
            template_id = template.id,
            backend = %backend,
            documents = ids.len(),
            "Batch processing started"
        );

        for (result_id, doc) in jobs {
            let processor = self.clone();
            let db = db.clone();
            let instruction = instruction.clone();
            let custom = custom.clone();

            tokio::spawn(async move {
                let outcome = processor
                    .process_batch_document(&db, backend, &instruction, custom.as_deref(), result_id, &doc)
                    .await;
                if let Err(e) = outcome {
                    tracing::warn!(result_id, error = %e, "Batch document failed");
                    match db.open() {
                        Ok(conn) => {
                            if let Err(db_err) =
                                result_repo::mark_failed(&conn, result_id, &e.to_string())
                            {
                                tracing::warn!(result_id, error = %db_err, "Could not record failure");
                            }
                        }
                        Err(db_err) => {
                            tracing::warn!(result_id, error = %db_err, "Could not record failure");
                        }
                    }
                }
            });
        }

        Ok(ids)
    }

    /// Process one batch document with the preferred backend only: extract,
    /// reconcile with the same backend as arbiter (the other side empty),
    /// normalize, persist as complete with the selection pre-set.
    async fn process_batch_document(
        &self,
        db: &Database,
        backend: Backend,
        instruction: &str,
        custom: Option<&str>,
        result_id: i64,
        doc: &IncomingDocument,
    ) -> Result<(), PipelineError> {
        let envelope: StructuredExtraction = self
            .backends
            .get(backend)
            .extract(&doc.payload, instruction)
            .await?;
        let raw_json = envelope.to_json();

        // Side order is fixed: gemini is always extraction 1.
        let merged = match backend {
            Backend::Gemini => {
                self.reconciler
                    .reconcile(backend, &raw_json, "", custom)
                    .await?
            }
            Backend::Openai => {
                self.reconciler
                    .reconcile(backend, "", &raw_json, custom)
                    .await?
            }
        };

        let field_map = recover_field_map(&merged.to_json());
        let extracted =
            serde_json::to_string(&field_map).unwrap_or_else(|_| "{}".to_string());

        let conn = db.open()?;
        result_repo::store_batch_outcome(
            &conn,
            result_id,
            backend,
            &raw_json,
            &merged.to_json(),
            &extracted,
        )?
        .ok_or_else(|| missing_result(result_id))?;

        tracing::info!(result_id, backend = %backend, "Batch document complete");
        Ok(())
    }

    /// Mark the result failed (never overwriting a complete row), then
    /// propagate the original error.
    fn fail<T>(
        &self,
        conn: &Connection,
        result_id: i64,
        error: PipelineError,
    ) -> Result<T, PipelineError> {
        if let Err(db_err) = result_repo::mark_failed(conn, result_id, &error.to_string()) {
            tracing::warn!(result_id, error = %db_err, "Could not record failure");
        }
        Err(error)
    }
}

fn missing_result(id: i64) -> PipelineError {
    PipelineError::Database(DatabaseError::NotFound {
        entity_type: "result".into(),
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldDef, FieldType, ResultStatus, TemplateStatus};
    use crate::pipeline::backends::{MockBackend, VisionBackend};
    use async_trait::async_trait;
    use std::sync::Arc;

    const EXTRACT_ENVELOPE: &str = r#"{"text":"{\"fullName\":\"Jo Doe\",\"email\":\"jo@x.dev\"}","confidence":0.9,"metadata":{"contentType":"form"}}"#;
    const MERGE_ENVELOPE: &str = r#"{"mergedText":"{\"fullName\":\"Jo Doe\",\"email\":\"jo@x.dev\"}","analysis":{"sourceAScore":0.8,"sourceBScore":0.6,"reasoning":"both agree"}}"#;

    fn make_db() -> (Database, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let db = Database::new(file.path()).unwrap();
        (db, file)
    }

    fn make_field(name: &str, order: u32) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            label: name.to_string(),
            field_type: FieldType::Text,
            required: false,
            options: None,
            default_value: None,
            placeholder: None,
            order,
        }
    }

    fn make_template(db: &Database, preferred: Option<Backend>) -> Template {
        let conn = db.open().unwrap();
        let template = template_repo::insert_template(&conn, 1, "T", None, None).unwrap();
        template_repo::save_fields(
            &conn,
            template.id,
            &[make_field("fullName", 1), make_field("email", 2)],
        )
        .unwrap();
        if let Some(backend) = preferred {
            template_repo::set_preferred_backend(&conn, template.id, backend).unwrap();
        }
        template_repo::get_template(&conn, template.id).unwrap().unwrap()
    }

    fn make_doc(name: &str, bytes: &[u8]) -> IncomingDocument {
        IncomingDocument {
            file_name: name.to_string(),
            file_size: Some(bytes.len() as i64),
            stored_path: None,
            payload: ImagePayload::new(bytes.to_vec(), "image/png"),
        }
    }

    fn happy_mock(id: Backend) -> MockBackend {
        MockBackend::new(id)
            .with_extract_response(EXTRACT_ENVELOPE)
            .with_complete_response(MERGE_ENVELOPE)
    }

    fn processor_with(
        gemini: MockBackend,
        openai: MockBackend,
    ) -> (DocumentProcessor, Arc<MockBackend>, Arc<MockBackend>) {
        let gemini = Arc::new(gemini);
        let openai = Arc::new(openai);
        let processor = DocumentProcessor::new(Backends::new(gemini.clone(), openai.clone()));
        (processor, gemini, openai)
    }

    async fn wait_terminal(db: &Database, ids: &[i64]) -> Vec<DocumentResult> {
        for _ in 0..500 {
            let results: Vec<DocumentResult> = {
                let conn = db.open().unwrap();
                ids.iter()
                    .map(|id| result_repo::get_result(&conn, *id).unwrap().unwrap())
                    .collect()
            };
            if results.iter().all(|r| r.status.is_terminal()) {
                return results;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("batch did not settle");
    }

    #[tokio::test]
    async fn test_flow_stores_raw_and_both_candidates() {
        let (db, _guard) = make_db();
        let template = make_template(&db, None);
        let (processor, gemini, openai) = processor_with(
            happy_mock(Backend::Gemini),
            happy_mock(Backend::Openai),
        );

        let result = processor
            .run_test(&db, &template, make_doc("scan.png", b"png-bytes"))
            .await
            .unwrap();

        assert_eq!(result.status, ResultStatus::Complete);
        assert!(result.selected_result.is_none());

        // Raw sides are well-formed envelopes
        let raw: StructuredExtraction =
            serde_json::from_str(result.gemini_data.as_deref().unwrap()).unwrap();
        assert!(raw.text.contains("fullName"));
        assert!(result.openai_data.is_some());
        assert!(result.gemini_result.is_some());
        assert!(result.openai_result.is_some());

        // Two extractions, two arbiter passes, no retries anywhere
        assert_eq!(gemini.extract_call_count(), 1);
        assert_eq!(openai.extract_call_count(), 1);
        assert_eq!(gemini.complete_call_count(), 1);
        assert_eq!(openai.complete_call_count(), 1);
    }

    #[tokio::test]
    async fn extraction_failure_fails_result_and_is_not_retried() {
        let (db, _guard) = make_db();
        let template = make_template(&db, None);
        let (processor, gemini, openai) = processor_with(
            MockBackend::new(Backend::Gemini).failing_extract(),
            happy_mock(Backend::Openai),
        );

        let err = processor
            .run_test(&db, &template, make_doc("scan.png", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Backend { backend: Backend::Gemini, .. }));

        let conn = db.open().unwrap();
        let results = result_repo::list_results(&conn, template.id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Failed);
        assert!(results[0].error.as_deref().unwrap().contains("mock extraction failure"));

        // Exactly one attempt; reconciliation never ran
        assert_eq!(gemini.extract_call_count(), 1);
        assert_eq!(gemini.complete_call_count(), 0);
        assert_eq!(openai.complete_call_count(), 0);
    }

    #[tokio::test]
    async fn reconciliation_failure_fails_result() {
        let (db, _guard) = make_db();
        let template = make_template(&db, None);
        let (processor, _, _) = processor_with(
            happy_mock(Backend::Gemini),
            MockBackend::new(Backend::Openai)
                .with_extract_response(EXTRACT_ENVELOPE)
                .failing_complete(),
        );

        let err = processor
            .run_test(&db, &template, make_doc("scan.png", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Reconciliation { .. }));

        let conn = db.open().unwrap();
        let results = result_repo::list_results(&conn, template.id).unwrap();
        assert_eq!(results[0].status, ResultStatus::Failed);
    }

    #[tokio::test]
    async fn select_winner_is_idempotent_and_promotes_template() {
        let (db, _guard) = make_db();
        let template = make_template(&db, None);
        let (processor, _, _) = processor_with(
            happy_mock(Backend::Gemini),
            happy_mock(Backend::Openai),
        );

        let result = processor
            .run_test(&db, &template, make_doc("scan.png", b"x"))
            .await
            .unwrap();

        let conn = db.open().unwrap();
        let first = processor
            .select_winner(&conn, &template, result.id, Backend::Gemini)
            .unwrap();
        let second = processor
            .select_winner(&conn, &template, result.id, Backend::Gemini)
            .unwrap();

        assert_eq!(first.selected_result, Some(Backend::Gemini));
        assert_eq!(first.extracted_data, second.extracted_data);
        assert_eq!(first.status, second.status);

        let map: std::collections::BTreeMap<String, serde_json::Value> =
            serde_json::from_str(first.extracted_data.as_deref().unwrap()).unwrap();
        assert_eq!(map["fullName"], "Jo Doe");
        assert!(!map.contains_key("analysis"));

        let promoted = template_repo::get_template(&conn, template.id).unwrap().unwrap();
        assert_eq!(promoted.status, TemplateStatus::Complete);
        assert_eq!(promoted.preferred_backend, Some(Backend::Gemini));
    }

    #[tokio::test]
    async fn select_winner_without_candidate_is_rejected() {
        let (db, _guard) = make_db();
        let template = make_template(&db, None);
        let (processor, _, _) = processor_with(
            happy_mock(Backend::Gemini),
            happy_mock(Backend::Openai),
        );

        let conn = db.open().unwrap();
        let pending =
            result_repo::insert_pending(&conn, template.id, "scan.png", None, None).unwrap();

        let err = processor
            .select_winner(&conn, &template, pending.id, Backend::Openai)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingCandidate { backend: Backend::Openai, .. }
        ));
    }

    /// Fails extraction only for documents whose bytes say so — used to
    /// force exactly one document of a batch to fail.
    struct PayloadSensitiveBackend {
        id: Backend,
    }

    #[async_trait]
    impl VisionBackend for PayloadSensitiveBackend {
        fn id(&self) -> Backend {
            self.id
        }

        async fn extract_raw(
            &self,
            image: &ImagePayload,
            _instruction: &str,
        ) -> Result<String, PipelineError> {
            if image.bytes == b"poison" {
                return Err(PipelineError::Backend {
                    backend: self.id,
                    message: "simulated quota error".to_string(),
                });
            }
            Ok(EXTRACT_ENVELOPE.to_string())
        }

        async fn complete_raw(&self, _prompt: &str) -> Result<String, PipelineError> {
            Ok(MERGE_ENVELOPE.to_string())
        }
    }

    #[tokio::test]
    async fn batch_isolates_partial_failure() {
        let (db, _guard) = make_db();
        let template = make_template(&db, Some(Backend::Gemini));
        let processor = DocumentProcessor::new(Backends::new(
            Arc::new(PayloadSensitiveBackend { id: Backend::Gemini }),
            Arc::new(PayloadSensitiveBackend { id: Backend::Openai }),
        ));

        let docs = vec![
            make_doc("1.png", b"fine"),
            make_doc("2.png", b"fine"),
            make_doc("3.png", b"poison"),
            make_doc("4.png", b"fine"),
            make_doc("5.png", b"fine"),
        ];

        let ids = processor
            .start_batch(&db, &template, Backend::Gemini, docs)
            .await
            .unwrap();
        assert_eq!(ids.len(), 5);

        let results = wait_terminal(&db, &ids).await;
        let complete = results.iter().filter(|r| r.status == ResultStatus::Complete).count();
        let failed: Vec<&DocumentResult> = results
            .iter()
            .filter(|r| r.status == ResultStatus::Failed)
            .collect();

        assert_eq!(complete, 4);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].file_name, "3.png");
        assert!(failed[0].error.as_deref().unwrap().contains("quota"));
    }

    #[tokio::test]
    async fn batch_completes_with_preselected_backend_and_field_map() {
        let (db, _guard) = make_db();
        let template = make_template(&db, Some(Backend::Gemini));
        let (processor, gemini, openai) = processor_with(
            happy_mock(Backend::Gemini),
            happy_mock(Backend::Openai),
        );

        let ids = processor
            .start_batch(
                &db,
                &template,
                Backend::Gemini,
                vec![make_doc("a.png", b"a"), make_doc("b.png", b"b")],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let results = wait_terminal(&db, &ids).await;
        for result in &results {
            assert_eq!(result.status, ResultStatus::Complete);
            assert_eq!(result.selected_result, Some(Backend::Gemini));
            assert!(result.gemini_data.is_some());
            assert!(result.openai_data.is_none());

            let map: std::collections::BTreeMap<String, serde_json::Value> =
                serde_json::from_str(result.extracted_data.as_deref().unwrap()).unwrap();
            assert_eq!(map["fullName"], "Jo Doe");
            assert_eq!(map["email"], "jo@x.dev");
        }

        // Only the preferred backend was invoked
        assert_eq!(gemini.extract_call_count(), 2);
        assert_eq!(openai.extract_call_count(), 0);
        assert_eq!(gemini.complete_call_count(), 2);
        assert_eq!(openai.complete_call_count(), 0);
    }

    #[tokio::test]
    async fn batch_with_openai_preferred_populates_openai_side() {
        let (db, _guard) = make_db();
        let template = make_template(&db, Some(Backend::Openai));
        let (processor, _, _) = processor_with(
            happy_mock(Backend::Gemini),
            happy_mock(Backend::Openai),
        );

        let ids = processor
            .start_batch(&db, &template, Backend::Openai, vec![make_doc("a.png", b"a")])
            .await
            .unwrap();
        let results = wait_terminal(&db, &ids).await;

        assert_eq!(results[0].selected_result, Some(Backend::Openai));
        assert!(results[0].openai_result.is_some());
        assert!(results[0].gemini_result.is_none());
    }
}
