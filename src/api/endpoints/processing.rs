//! Document processing endpoints: interactive test, winner selection,
//! batch deploy, and the result poll target.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::load_owned_template;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::api::upload::{read_images, read_single_image, store_as_document, MAX_BATCH_FILES};
use crate::db::repository::result as result_repo;
use crate::models::{Backend, DocumentResult};

#[derive(Deserialize)]
pub struct SelectRequest {
    pub backend: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub message: &'static str,
    pub result_ids: Vec<i64>,
}

/// `POST /api/templates/:id/test` — synchronous dual-model test run.
///
/// Returns once both merged candidates are ready; a pipeline failure is
/// recorded on the result row first, then surfaced with its message.
pub async fn test_process(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<DocumentResult>, ApiError> {
    let template = {
        let conn = ctx.db.open()?;
        load_owned_template(&conn, id, user)?
    };
    if template.fields.is_empty() {
        return Err(ApiError::BadRequest(
            "No form fields defined for this template. Please complete field detection first."
                .to_string(),
        ));
    }

    let image = read_single_image(&mut multipart, "image").await?;
    let doc = store_as_document(&ctx.uploads_dir, image)?;

    let result = ctx.processor.run_test(&ctx.db, &template, doc).await?;
    Ok(Json(result))
}

/// `POST /api/templates/:id/results/:result_id/select` — record the
/// winning backend for a tested document and promote the template.
pub async fn select_winner(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path((id, result_id)): Path<(i64, i64)>,
    Json(payload): Json<SelectRequest>,
) -> Result<Json<DocumentResult>, ApiError> {
    let backend: Backend = payload
        .backend
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid backend selection".to_string()))?;

    let conn = ctx.db.open()?;
    let template = load_owned_template(&conn, id, user)?;

    let result = result_repo::get_result(&conn, result_id)?
        .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;
    if result.template_id != template.id {
        return Err(ApiError::BadRequest(
            "Result does not belong to the specified template".to_string(),
        ));
    }

    let updated = ctx
        .processor
        .select_winner(&conn, &template, result_id, backend)?;
    Ok(Json(updated))
}

/// `POST /api/templates/:id/batch` — asynchronous batch deploy.
///
/// Creates one result row per image and returns their ids with `202`;
/// processing continues in the background and the caller polls
/// [`results`] until every id reaches a terminal status.
pub async fn batch_process(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    let template = {
        let conn = ctx.db.open()?;
        load_owned_template(&conn, id, user)?
    };

    let Some(backend) = template.preferred_backend else {
        return Err(ApiError::BadRequest(
            "No preferred backend set for this template. Please test and select a backend first."
                .to_string(),
        ));
    };
    if template.fields.is_empty() {
        return Err(ApiError::BadRequest(
            "No form fields defined for this template. Please complete field detection first."
                .to_string(),
        ));
    }

    let images = read_images(&mut multipart, "images", MAX_BATCH_FILES).await?;
    let mut docs = Vec::with_capacity(images.len());
    for image in images {
        docs.push(store_as_document(&ctx.uploads_dir, image)?);
    }

    let result_ids = ctx
        .processor
        .start_batch(&ctx.db, &template, backend, docs)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchResponse {
            message: "Processing started",
            result_ids,
        }),
    ))
}

/// `GET /api/templates/:id/results` — poll target for batch completion.
pub async fn results(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DocumentResult>>, ApiError> {
    let conn = ctx.db.open()?;
    let template = load_owned_template(&conn, id, user)?;
    Ok(Json(result_repo::list_results(&conn, template.id)?))
}
