use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use futures::TryStreamExt;
use log::{debug, error, info, warn};
use std::sync::Arc;
use utoipa::ToSchema;

use super::models::{format_file_size, generate_attachment_key, key_belongs_to, Attachment};
use crate::auth::authenticated_user;
use crate::storage::ObjectStorage;
use crate::{AppState, ErrorResponse};

/// Upload limit per file.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadAttachmentRequest {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Debug)]
enum UploadError {
    Invalid(String),
    TooLarge,
    Storage(String),
}

/// Read the `file` field of the form and store it under a fresh key for `user_id`.
async fn save_multipart_file(
    mut payload: Multipart,
    user_id: &str,
    storage: &Arc<dyn ObjectStorage + Send + Sync>,
) -> Result<Attachment, UploadError> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| UploadError::Invalid(e.to_string()))?
    {
        let Some(content_disposition) = field.content_disposition() else {
            continue;
        };
        if content_disposition.get_name() != Some("file") {
            continue;
        }

        let original_name = content_disposition
            .get_filename()
            .map(sanitize_filename::sanitize)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| UploadError::Invalid("No filename".to_string()))?;

        let mime_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .filter(|mime| mime != "application/octet-stream")
            .unwrap_or_else(|| {
                mime_guess::from_path(&original_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });

        let mut data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| UploadError::Invalid(e.to_string()))?
        {
            if data.len() + chunk.len() > MAX_ATTACHMENT_BYTES {
                return Err(UploadError::TooLarge);
            }
            data.extend_from_slice(&chunk);
        }

        let key = generate_attachment_key(user_id, &original_name);
        debug!("Uploading {} ({}) as {}", original_name, format_file_size(data.len() as i64), key);
        storage
            .upload_file(&key, &data)
            .await
            .map_err(UploadError::Storage)?;

        return Ok(Attachment::new(original_name, key, mime_type, data.len() as i64));
    }

    Err(UploadError::Invalid("Missing 'file' field".to_string()))
}

#[utoipa::path(
    context_path = "/api",
    tag = "Attachments",
    post,
    path = "/attachments",
    request_body(content = inline(UploadAttachmentRequest), content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Attachment stored", body = Attachment),
        (status = 400, description = "Invalid upload", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 413, description = "File larger than 10MB", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_attachment(
    req: HttpRequest,
    payload: Multipart,
    state: web::Data<AppState>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match save_multipart_file(payload, &user_id.to_string(), &state.storage).await {
        Ok(attachment) => {
            info!("User {} uploaded attachment {}", user_id, attachment.url);
            HttpResponse::Created().json(attachment)
        }
        Err(UploadError::Invalid(message)) => {
            warn!("Rejected upload from {}: {}", user_id, message);
            HttpResponse::BadRequest().json(ErrorResponse::bad_request(&message))
        }
        Err(UploadError::TooLarge) => HttpResponse::PayloadTooLarge().json(ErrorResponse::new(
            "PayloadTooLarge",
            "Attachments are limited to 10MB",
        )),
        Err(UploadError::Storage(e)) => {
            error!("Failed to store attachment: {}", e);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to store attachment"))
        }
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Attachments",
    get,
    path = "/attachments/{key}",
    responses(
        (status = 200, description = "Attachment bytes"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Attachment not found", body = ErrorResponse)
    ),
    params(
        ("key" = String, Path, description = "Storage key of the attachment")
    ),
    security(("bearer_auth" = []))
)]
pub async fn download_attachment(
    req: HttpRequest,
    key: web::Path<String>,
    state: web::Data<AppState>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };
    let key = key.into_inner();

    if !key_belongs_to(&key, &user_id.to_string()) {
        match state.is_admin(&user_id).await {
            Ok(true) => {}
            Ok(false) => {
                return HttpResponse::NotFound().json(ErrorResponse::not_found("Attachment not found"))
            }
            Err(e) => {
                error!("Failed to look up roles for {}: {:?}", user_id, e);
                return HttpResponse::InternalServerError()
                    .json(ErrorResponse::internal_error("Failed to verify role"));
            }
        }
    }

    match state.storage.download_file(&key).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&key).first_or_octet_stream();
            HttpResponse::Ok().content_type(mime.essence_str()).body(bytes)
        }
        Err(e) => {
            warn!("Failed to fetch attachment {}: {}", key, e);
            HttpResponse::NotFound().json(ErrorResponse::not_found("Attachment not found"))
        }
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Attachments",
    delete,
    path = "/attachments/{key}",
    responses(
        (status = 204, description = "Attachment removed"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Attachment belongs to another user", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    params(
        ("key" = String, Path, description = "Storage key of the attachment")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_attachment(
    req: HttpRequest,
    key: web::Path<String>,
    state: web::Data<AppState>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };
    let key = key.into_inner();

    if !key_belongs_to(&key, &user_id.to_string()) {
        warn!("User {} tried to delete foreign attachment {}", user_id, key);
        return HttpResponse::Forbidden().json(ErrorResponse::new(
            "Forbidden",
            "You can only remove your own attachments",
        ));
    }

    match state.storage.delete_file(&key).await {
        Ok(()) => {
            info!("Attachment {} removed", key);
            HttpResponse::NoContent().finish()
        }
        Err(e) => {
            error!("Failed to remove attachment {}: {}", key, e);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to remove attachment"))
        }
    }
}

/// Delete the stored bytes of `attachments` that live in `owner_id`'s namespace,
/// logging failures.
pub async fn purge_attachments(
    storage: &Arc<dyn ObjectStorage + Send + Sync>,
    owner_id: &str,
    attachments: &[Attachment],
) -> usize {
    let mut purged = 0;
    for attachment in attachments {
        if !attachment.is_owned_by(owner_id) {
            warn!("Not purging {}: outside the namespace of {}", attachment.url, owner_id);
            continue;
        }
        match storage.delete_file(&attachment.url).await {
            Ok(()) => purged += 1,
            Err(e) => warn!("Failed to purge attachment {}: {}", attachment.url, e),
        }
    }
    purged
}
