use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{Backend, FieldDef, Template, TemplateStatus};

const TEMPLATE_COLUMNS: &str = "id, user_id, name, description, custom_instruction, \
     preferred_backend, fields, example_image_path, status, created_at";

pub fn insert_template(
    conn: &Connection,
    user_id: i64,
    name: &str,
    description: Option<&str>,
    custom_instruction: Option<&str>,
) -> Result<Template, DatabaseError> {
    let created_at = chrono::Utc::now().naive_utc();
    conn.execute(
        "INSERT INTO templates (user_id, name, description, custom_instruction, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            name,
            description,
            custom_instruction,
            TemplateStatus::Draft.as_str(),
            created_at,
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_template(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "template".into(),
        id: id.to_string(),
    })
}

pub fn get_template(conn: &Connection, id: i64) -> Result<Option<Template>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id], template_row);

    match result {
        Ok(row) => Ok(Some(template_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_templates(conn: &Connection, user_id: i64) -> Result<Vec<Template>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
    ))?;

    let rows = stmt.query_map(params![user_id], template_row)?;

    let mut templates = Vec::new();
    for row in rows {
        templates.push(template_from_row(row?)?);
    }
    Ok(templates)
}

pub fn update_basic_info(
    conn: &Connection,
    id: i64,
    name: &str,
    description: Option<&str>,
    custom_instruction: Option<&str>,
) -> Result<Option<Template>, DatabaseError> {
    let changed = conn.execute(
        "UPDATE templates SET name = ?2, description = ?3, custom_instruction = ?4 WHERE id = ?1",
        params![id, name, description, custom_instruction],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_template(conn, id)
}

/// Replace the field list after a user edit and advance to `editing_fields`.
pub fn save_fields(
    conn: &Connection,
    id: i64,
    fields: &[FieldDef],
) -> Result<Option<Template>, DatabaseError> {
    let fields_json = fields_to_json(fields)?;
    let changed = conn.execute(
        "UPDATE templates SET fields = ?2 WHERE id = ?1",
        params![id, fields_json],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    advance_status(conn, id, TemplateStatus::EditingFields)?;
    get_template(conn, id)
}

/// Persist a successful field-detection run: replace the field list, record
/// the example image, advance to `detecting_fields`.
pub fn record_detection(
    conn: &Connection,
    id: i64,
    fields: &[FieldDef],
    example_image_path: &str,
) -> Result<Option<Template>, DatabaseError> {
    let fields_json = fields_to_json(fields)?;
    let changed = conn.execute(
        "UPDATE templates SET fields = ?2, example_image_path = ?3 WHERE id = ?1",
        params![id, fields_json, example_image_path],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    advance_status(conn, id, TemplateStatus::DetectingFields)?;
    get_template(conn, id)
}

/// Record the winning backend for the template and advance to `complete`.
pub fn set_preferred_backend(
    conn: &Connection,
    id: i64,
    backend: Backend,
) -> Result<Option<Template>, DatabaseError> {
    let changed = conn.execute(
        "UPDATE templates SET preferred_backend = ?2 WHERE id = ?1",
        params![id, backend.as_str()],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    advance_status(conn, id, TemplateStatus::Complete)?;
    get_template(conn, id)
}

/// Delete a template; results cascade via the foreign key.
pub fn delete_template(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Advance the lifecycle status. Status is monotonic: a write that would
/// move backwards is a no-op.
fn advance_status(conn: &Connection, id: i64, next: TemplateStatus) -> Result<(), DatabaseError> {
    let current: String =
        conn.query_row("SELECT status FROM templates WHERE id = ?1", params![id], |row| {
            row.get(0)
        })?;
    let current = TemplateStatus::from_str(&current)?;
    let advanced = current.advanced_to(next);
    if advanced != current {
        conn.execute(
            "UPDATE templates SET status = ?2 WHERE id = ?1",
            params![id, advanced.as_str()],
        )?;
    }
    Ok(())
}

fn fields_to_json(fields: &[FieldDef]) -> Result<String, DatabaseError> {
    serde_json::to_string(fields).map_err(|e| DatabaseError::InvalidStored {
        field: "fields".into(),
        reason: e.to_string(),
    })
}

struct TemplateRow {
    id: i64,
    user_id: i64,
    name: String,
    description: Option<String>,
    custom_instruction: Option<String>,
    preferred_backend: Option<String>,
    fields: String,
    example_image_path: Option<String>,
    status: String,
    created_at: NaiveDateTime,
}

fn template_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok(TemplateRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        custom_instruction: row.get(4)?,
        preferred_backend: row.get(5)?,
        fields: row.get(6)?,
        example_image_path: row.get(7)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn template_from_row(row: TemplateRow) -> Result<Template, DatabaseError> {
    let fields: Vec<FieldDef> =
        serde_json::from_str(&row.fields).map_err(|e| DatabaseError::InvalidStored {
            field: "fields".into(),
            reason: e.to_string(),
        })?;

    let preferred_backend = row
        .preferred_backend
        .as_deref()
        .map(Backend::from_str)
        .transpose()?;

    Ok(Template {
        id: row.id,
        user_id: row.user_id,
        name: row.name,
        description: row.description,
        custom_instruction: row.custom_instruction,
        preferred_backend,
        fields,
        example_image_path: row.example_image_path,
        status: TemplateStatus::from_str(&row.status)?,
        created_at: row.created_at,
    })
}
