use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{Backend, DocumentResult, ResultStatus};

const RESULT_COLUMNS: &str = "id, template_id, file_name, file_size, original_path, \
     gemini_data, openai_data, gemini_result, openai_result, extracted_data, \
     selected_result, status, error, created_at";

/// Create the placeholder row for a document the instant it is accepted.
pub fn insert_pending(
    conn: &Connection,
    template_id: i64,
    file_name: &str,
    file_size: Option<i64>,
    original_path: Option<&str>,
) -> Result<DocumentResult, DatabaseError> {
    let created_at = chrono::Utc::now().naive_utc();
    conn.execute(
        "INSERT INTO results (template_id, file_name, file_size, original_path, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            template_id,
            file_name,
            file_size,
            original_path,
            ResultStatus::Processing.as_str(),
            created_at,
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_result(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "result".into(),
        id: id.to_string(),
    })
}

pub fn get_result(conn: &Connection, id: i64) -> Result<Option<DocumentResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {RESULT_COLUMNS} FROM results WHERE id = ?1"))?;

    let result = stmt.query_row(params![id], result_row);

    match result {
        Ok(row) => Ok(Some(result_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_results(
    conn: &Connection,
    template_id: i64,
) -> Result<Vec<DocumentResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESULT_COLUMNS} FROM results WHERE template_id = ?1 ORDER BY created_at DESC, id DESC"
    ))?;

    let rows = stmt.query_map(params![template_id], result_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(result_from_row(row?)?);
    }
    Ok(results)
}

/// Persist a completed dual-model test: both raw envelopes plus both merged
/// candidates, status `complete`.
pub fn store_test_outcome(
    conn: &Connection,
    id: i64,
    gemini_data: &str,
    openai_data: &str,
    gemini_result: &str,
    openai_result: &str,
) -> Result<Option<DocumentResult>, DatabaseError> {
    conn.execute(
        "UPDATE results SET gemini_data = ?2, openai_data = ?3, gemini_result = ?4,
         openai_result = ?5, status = ?6, error = NULL WHERE id = ?1",
        params![
            id,
            gemini_data,
            openai_data,
            gemini_result,
            openai_result,
            ResultStatus::Complete.as_str(),
        ],
    )?;
    get_result(conn, id)
}

/// Persist a completed batch document: only the preferred backend's side is
/// populated and the selection is pre-set.
pub fn store_batch_outcome(
    conn: &Connection,
    id: i64,
    backend: Backend,
    raw_data: &str,
    merged_result: &str,
    extracted_data: &str,
) -> Result<Option<DocumentResult>, DatabaseError> {
    let sql = match backend {
        Backend::Gemini => {
            "UPDATE results SET gemini_data = ?2, gemini_result = ?3, extracted_data = ?4,
             selected_result = ?5, status = ?6, error = NULL WHERE id = ?1"
        }
        Backend::Openai => {
            "UPDATE results SET openai_data = ?2, openai_result = ?3, extracted_data = ?4,
             selected_result = ?5, status = ?6, error = NULL WHERE id = ?1"
        }
    };
    conn.execute(
        sql,
        params![
            id,
            raw_data,
            merged_result,
            extracted_data,
            backend.as_str(),
            ResultStatus::Complete.as_str(),
        ],
    )?;
    get_result(conn, id)
}

/// Record the user's (or batch policy's) winning backend and the normalized
/// field map derived from that candidate.
pub fn set_selection(
    conn: &Connection,
    id: i64,
    backend: Backend,
    extracted_data: &str,
) -> Result<Option<DocumentResult>, DatabaseError> {
    conn.execute(
        "UPDATE results SET selected_result = ?2, extracted_data = ?3 WHERE id = ?1",
        params![id, backend.as_str(), extracted_data],
    )?;
    get_result(conn, id)
}

/// Mark a document failed. Guarded so a failure never overwrites a row that
/// already reached `complete`.
pub fn mark_failed(
    conn: &Connection,
    id: i64,
    message: &str,
) -> Result<Option<DocumentResult>, DatabaseError> {
    conn.execute(
        "UPDATE results SET status = ?2, error = ?3 WHERE id = ?1 AND status = ?4",
        params![
            id,
            ResultStatus::Failed.as_str(),
            message,
            ResultStatus::Processing.as_str(),
        ],
    )?;
    get_result(conn, id)
}

struct ResultRow {
    id: i64,
    template_id: i64,
    file_name: String,
    file_size: Option<i64>,
    original_path: Option<String>,
    gemini_data: Option<String>,
    openai_data: Option<String>,
    gemini_result: Option<String>,
    openai_result: Option<String>,
    extracted_data: Option<String>,
    selected_result: Option<String>,
    status: String,
    error: Option<String>,
    created_at: NaiveDateTime,
}

fn result_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResultRow> {
    Ok(ResultRow {
        id: row.get(0)?,
        template_id: row.get(1)?,
        file_name: row.get(2)?,
        file_size: row.get(3)?,
        original_path: row.get(4)?,
        gemini_data: row.get(5)?,
        openai_data: row.get(6)?,
        gemini_result: row.get(7)?,
        openai_result: row.get(8)?,
        extracted_data: row.get(9)?,
        selected_result: row.get(10)?,
        status: row.get(11)?,
        error: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn result_from_row(row: ResultRow) -> Result<DocumentResult, DatabaseError> {
    let selected_result = row
        .selected_result
        .as_deref()
        .map(Backend::from_str)
        .transpose()?;

    Ok(DocumentResult {
        id: row.id,
        template_id: row.template_id,
        file_name: row.file_name,
        file_size: row.file_size,
        original_path: row.original_path,
        gemini_data: row.gemini_data,
        openai_data: row.openai_data,
        gemini_result: row.gemini_result,
        openai_result: row.openai_result,
        extracted_data: row.extracted_data,
        selected_result,
        status: ResultStatus::from_str(&row.status)?,
        error: row.error,
        created_at: row.created_at,
    })
}
