pub mod health;
pub mod processing;
pub mod templates;

use rusqlite::Connection;

use crate::api::error::ApiError;
use crate::api::types::UserContext;
use crate::db::repository::template as template_repo;
use crate::models::Template;

/// Load a template and verify the caller owns it (403 otherwise).
///
/// Every template/result access goes through this gate before any side
/// effect or backend call.
pub(crate) fn load_owned_template(
    conn: &Connection,
    id: i64,
    user: UserContext,
) -> Result<Template, ApiError> {
    let template = template_repo::get_template(conn, id)?
        .ok_or_else(|| ApiError::NotFound("Template not found".to_string()))?;
    if template.user_id != user.user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(template)
}
