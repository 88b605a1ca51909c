//! Shared state for the API layer.

use std::path::PathBuf;

use crate::db::Database;
use crate::pipeline::{Backends, DocumentProcessor, FieldDetector};

/// Shared context for all API routes and middleware.
///
/// The backend pair is injected once at construction, so tests swap in
/// mock backends without touching any handler.
#[derive(Clone)]
pub struct ApiContext {
    pub db: Database,
    pub processor: DocumentProcessor,
    pub detector: FieldDetector,
    pub uploads_dir: PathBuf,
}

impl ApiContext {
    pub fn new(db: Database, backends: Backends, uploads_dir: PathBuf) -> Self {
        Self {
            db,
            processor: DocumentProcessor::new(backends.clone()),
            detector: FieldDetector::new(backends),
            uploads_dir,
        }
    }
}

/// Authenticated caller, injected into request extensions by the identity
/// middleware. Authentication itself lives in the fronting auth service;
/// this service only enforces ownership.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: i64,
}
