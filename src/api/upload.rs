//! Multipart image intake.
//!
//! Uploaded originals are MIME-sniffed by magic bytes against a small
//! allow-list, size-capped, and persisted under the uploads directory
//! with a uuid-prefixed name before any backend call is made.

use std::path::Path;

use axum::extract::Multipart;

use crate::api::error::ApiError;
use crate::pipeline::{ImagePayload, IncomingDocument};

/// Maximum size of one uploaded image (10 MB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
/// Maximum files per batch request.
pub const MAX_BATCH_FILES: usize = 10;

/// One decoded multipart image field.
#[derive(Debug)]
pub struct ReceivedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Read exactly one image from the multipart field `field_name`.
pub async fn read_single_image(
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<ReceivedImage, ApiError> {
    let mut images = read_images(multipart, field_name, 1).await?;
    images
        .pop()
        .ok_or_else(|| ApiError::BadRequest("No image uploaded".to_string()))
}

/// Read up to `max` images from repeated multipart fields named
/// `field_name`. Unknown fields are ignored.
pub async fn read_images(
    multipart: &mut Multipart,
    field_name: &str,
    max: usize,
) -> Result<Vec<ReceivedImage>, ApiError> {
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(sanitize_file_name)
            .unwrap_or_else(|| "upload".to_string());

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?
            .to_vec();

        if images.len() >= max {
            return Err(ApiError::BadRequest(format!(
                "Maximum {max} image(s) per request"
            )));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ApiError::BadRequest(format!(
                "Image '{file_name}' exceeds 10 MB size limit ({} bytes)",
                bytes.len()
            )));
        }

        let mime_type = detect_mime(&bytes).ok_or_else(|| {
            ApiError::UnsupportedMedia(format!(
                "Image '{file_name}' is not a supported format (jpeg, png, webp)"
            ))
        })?;

        images.push(ReceivedImage {
            file_name,
            bytes,
            mime_type,
        });
    }

    if images.is_empty() {
        return Err(ApiError::BadRequest("No image uploaded".to_string()));
    }
    Ok(images)
}

/// Persist the original and return it as a processable document.
pub fn store_as_document(
    uploads_dir: &Path,
    image: ReceivedImage,
) -> Result<IncomingDocument, ApiError> {
    std::fs::create_dir_all(uploads_dir)
        .map_err(|e| ApiError::Internal(format!("Uploads directory: {e}")))?;

    let stored_name = format!("{}-{}", uuid::Uuid::new_v4(), image.file_name);
    let stored_path = uploads_dir.join(&stored_name);
    std::fs::write(&stored_path, &image.bytes)
        .map_err(|e| ApiError::Internal(format!("Failed to store original: {e}")))?;

    Ok(IncomingDocument {
        file_name: image.file_name,
        file_size: Some(image.bytes.len() as i64),
        stored_path: Some(stored_path.to_string_lossy().into_owned()),
        payload: ImagePayload::new(image.bytes, image.mime_type),
    })
}

/// Detect an allow-listed MIME type from magic bytes.
fn detect_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        Some("image/jpeg")
    } else if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_file_name(raw: &str) -> String {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if name.is_empty() {
        "upload".to_string()
    } else {
        name.to_string()
    }
}
