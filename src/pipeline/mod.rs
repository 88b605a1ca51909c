//! Dual-model extraction pipeline.
//!
//! Data flow per document:
//! ```text
//! image bytes → backend adapters (×2, concurrent) → raw envelopes
//!             → reconciliation (per-backend arbiter) → normalizer
//!             → canonical field map → persisted result
//! ```
//!
//! The processor owns the whole flow for one document and fans it out
//! across N documents for batch runs; detection is the same machinery
//! under a schema-inference instruction.

pub mod backends;
pub mod detect;
pub mod envelope;
pub mod error;
pub mod normalize;
pub mod processor;
pub mod prompts;
pub mod reconcile;

pub use backends::{Backends, GeminiClient, ImagePayload, MockBackend, OpenAiClient, VisionBackend};
pub use detect::FieldDetector;
pub use envelope::{MergedExtraction, StructuredExtraction};
pub use error::PipelineError;
pub use processor::{DocumentProcessor, IncomingDocument};
pub use reconcile::Reconciler;
