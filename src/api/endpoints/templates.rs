//! Template CRUD and field-schema endpoints.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::load_owned_template;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::api::upload::{read_single_image, store_as_document};
use crate::db::repository::template as template_repo;
use crate::models::template::validate_fields;
use crate::models::{FieldDef, Template};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub custom_instruction: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfoRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub custom_instruction: Option<String>,
}

#[derive(Serialize)]
pub struct DetectFieldsResponse {
    pub fields: Vec<FieldDef>,
    pub template: Template,
}

/// `POST /api/templates` — create a template in `draft`.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Json(payload): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }

    let conn = ctx.db.open()?;
    let template = template_repo::insert_template(
        &conn,
        user.user_id,
        payload.name.trim(),
        payload.description.as_deref(),
        payload.custom_instruction.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// `GET /api/templates` — list the caller's templates.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<Vec<Template>>, ApiError> {
    let conn = ctx.db.open()?;
    Ok(Json(template_repo::list_templates(&conn, user.user_id)?))
}

/// `GET /api/templates/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<Template>, ApiError> {
    let conn = ctx.db.open()?;
    Ok(Json(load_owned_template(&conn, id, user)?))
}

/// `PUT /api/templates/:id/basic-info`
pub async fn update_basic_info(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(payload): Json<BasicInfoRequest>,
) -> Result<Json<Template>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }

    let conn = ctx.db.open()?;
    load_owned_template(&conn, id, user)?;

    let updated = template_repo::update_basic_info(
        &conn,
        id,
        payload.name.trim(),
        payload.description.as_deref(),
        payload.custom_instruction.as_deref(),
    )?
    .ok_or_else(|| ApiError::NotFound("Template not found".to_string()))?;
    Ok(Json(updated))
}

/// `PUT /api/templates/:id/fields` — save user-edited fields.
pub async fn save_fields(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(fields): Json<Vec<FieldDef>>,
) -> Result<Json<Template>, ApiError> {
    let fields = validate_fields(fields).map_err(ApiError::BadRequest)?;

    let conn = ctx.db.open()?;
    load_owned_template(&conn, id, user)?;

    let updated = template_repo::save_fields(&conn, id, &fields)?
        .ok_or_else(|| ApiError::NotFound("Template not found".to_string()))?;
    Ok(Json(updated))
}

/// `DELETE /api/templates/:id` — cascade delete.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.db.open()?;
    load_owned_template(&conn, id, user)?;
    template_repo::delete_template(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/templates/:id/detect-fields` — run dual-model field
/// detection over an example image.
///
/// On success the template's field list is replaced and its status
/// advances; on failure the template is left untouched.
pub async fn detect_fields(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<DetectFieldsResponse>, ApiError> {
    {
        let conn = ctx.db.open()?;
        load_owned_template(&conn, id, user)?;
    }

    let image = read_single_image(&mut multipart, "image").await?;
    let doc = store_as_document(&ctx.uploads_dir, image)?;

    let fields = ctx.detector.detect(&doc.payload).await?;

    let conn = ctx.db.open()?;
    let stored_path = doc.stored_path.unwrap_or_default();
    let template = template_repo::record_detection(&conn, id, &fields, &stored_path)?
        .ok_or_else(|| ApiError::NotFound("Template not found".to_string()))?;

    Ok(Json(DetectFieldsResponse { fields, template }))
}
