//! API router.
//!
//! Returns a composable `Router` mounted under `/api/`. Every route except
//! the health check requires a caller identity injected by the fronting
//! auth service (see `middleware::identity`).

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints::{health, processing, templates};
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::api::upload::{MAX_BATCH_FILES, MAX_IMAGE_BYTES};

/// Request body ceiling: a full batch of images plus multipart overhead.
const MAX_REQUEST_BYTES: usize = MAX_BATCH_FILES * MAX_IMAGE_BYTES + 1024 * 1024;

/// Build the API router.
pub fn api_router(ctx: ApiContext) -> Router {
    let protected = Router::new()
        .route("/templates", post(templates::create).get(templates::list))
        .route(
            "/templates/:id",
            get(templates::get).delete(templates::delete),
        )
        .route("/templates/:id/basic-info", put(templates::update_basic_info))
        .route("/templates/:id/fields", put(templates::save_fields))
        .route("/templates/:id/detect-fields", post(templates::detect_fields))
        .route("/templates/:id/test", post(processing::test_process))
        .route(
            "/templates/:id/results/:result_id/select",
            post(processing::select_winner),
        )
        .route("/templates/:id/batch", post(processing::batch_process))
        .route("/templates/:id/results", get(processing::results))
        .with_state(ctx)
        .layer(axum::middleware::from_fn(middleware::identity::require_user))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES));

    let unprotected = Router::new().route("/health", get(health::check));

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
        .layer(CorsLayer::permissive())
}
