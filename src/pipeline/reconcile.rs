//! Reconciliation engine — merges two candidate extractions into one.
//!
//! The arbiter is whichever backend is asked to perform the merge. Test
//! processing runs this twice (once per backend as arbiter) to produce two
//! candidates; batch processing runs it once with the preferred backend
//! and an empty other side.

use super::backends::Backends;
use super::envelope::{unwrap_text, MergedExtraction};
use super::error::PipelineError;
use super::prompts;
use crate::models::Backend;

#[derive(Clone)]
pub struct Reconciler {
    backends: Backends,
}

impl Reconciler {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Merge two extraction payloads with `arbiter` deciding.
    ///
    /// Either side may be the empty string, meaning that side was not run.
    /// Payloads that parse as a `StructuredExtraction` envelope are
    /// unwrapped to their `text` before prompting; anything else is
    /// embedded verbatim. The returned value always parses as
    /// [`MergedExtraction`].
    pub async fn reconcile(
        &self,
        arbiter: Backend,
        side_a: &str,
        side_b: &str,
        custom_instruction: Option<&str>,
    ) -> Result<MergedExtraction, PipelineError> {
        let start = std::time::Instant::now();
        let text_a = unwrap_text(side_a);
        let text_b = unwrap_text(side_b);
        let prompt = prompts::merge_prompt(&text_a, &text_b, custom_instruction);

        let raw = self
            .backends
            .get(arbiter)
            .complete_raw(&prompt)
            .await
            .map_err(|e| match e {
                PipelineError::Backend { backend, message } => {
                    PipelineError::Reconciliation { backend, message }
                }
                other => other,
            })?;

        let merged = MergedExtraction::from_raw(&raw);
        tracing::info!(
            arbiter = %arbiter,
            elapsed_ms = %start.elapsed().as_millis(),
            merged_len = merged.merged_text.len(),
            "Reconciliation complete"
        );
        Ok(merged)
    }
}
