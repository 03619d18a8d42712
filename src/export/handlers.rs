use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::export_filename;
use super::compositor::ComposedDocument;
use super::preview::document_preview;
use super::print::{print_document, HtmlResponseContext};
use super::tree::{RenderNode, DEFAULT_ELEMENT_ID};
use super::ExportError;
use crate::attachment::models::Attachment;
use crate::auth::authenticated_user;
use crate::document::models::DocumentType;
use crate::{AppState, ErrorResponse};

/// Header carrying how many attachments were left out because of their type.
pub const SKIPPED_ATTACHMENTS_HEADER: &str = "X-Skipped-Attachments";
/// Header carrying how many attachments could not be fetched or merged.
pub const FAILED_ATTACHMENTS_HEADER: &str = "X-Failed-Attachments";

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExportRequest {
    pub target: RenderNode,
    /// Element inside `target` to capture. Defaults to `printable-document`.
    #[schema(example = "printable-document")]
    pub element_id: Option<String>,
    pub document_type: DocumentType,
    /// Person or project the document is about, used in the file name.
    #[schema(example = "Site A")]
    pub subject: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PrintRequest {
    pub target: RenderNode,
    #[schema(example = "printable-document")]
    pub element_id: Option<String>,
    /// CSS rules inlined into the print page.
    #[serde(default)]
    pub stylesheets: Vec<String>,
}

#[utoipa::path(
    context_path = "/api",
    tag = "Export",
    post,
    path = "/export",
    request_body = ExportRequest,
    responses(
        (status = 200, description = "PDF download", body = Vec<u8>, content_type = "application/pdf"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Attachment belongs to another user", body = ErrorResponse),
        (status = 404, description = "Element not found in render target", body = ErrorResponse),
        (status = 500, description = "Rendering failed", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn export_pdf(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ExportRequest>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    let body = body.into_inner();
    let user = user_id.to_string();
    if let Some(foreign) = body.attachments.iter().find(|a| !a.is_owned_by(&user)) {
        log::warn!("User {} tried to export foreign attachment '{}'", user, foreign.url);
        return HttpResponse::Forbidden().json(ErrorResponse::new(
            "Forbidden",
            &format!("Attachment '{}' does not belong to you", foreign.name),
        ));
    }

    let element_id = body.element_id.as_deref().unwrap_or(DEFAULT_ELEMENT_ID);
    let filename = export_filename(
        &body.document_type.file_prefix(),
        body.subject.as_deref().unwrap_or_default(),
    );

    log::info!(
        "User {} exporting '{}' with {} attachment(s)",
        user_id,
        filename,
        body.attachments.len()
    );

    match state
        .exporter
        .export(state.storage.as_ref(), &body.target, element_id, &body.attachments)
        .await
    {
        Ok(composed) => pdf_response(&filename, composed),
        Err(e) => export_error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Export",
    post,
    path = "/print",
    request_body = PrintRequest,
    responses(
        (status = 200, description = "Self-printing HTML page", body = String, content_type = "text/html"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Element not found in render target", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn print_page(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<PrintRequest>,
) -> impl Responder {
    if let Err(e) = authenticated_user(&req) {
        return e.error_response();
    }

    let element_id = body.element_id.as_deref().unwrap_or(DEFAULT_ELEMENT_ID);
    let Some(target) = body.target.find_by_id(element_id) else {
        return export_error_response(ExportError::TargetNotFound(element_id.to_string()));
    };

    let mut context = HtmlResponseContext::new();
    let delay_ms = state.exporter.config().print_delay_ms;
    match print_document(target, &body.stylesheets, &mut context, delay_ms) {
        Ok(()) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(context.into_html()),
        Err(e) => export_error_response(e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Export",
    get,
    path = "/documents/{id}/export",
    responses(
        (status = 200, description = "PDF download", body = Vec<u8>, content_type = "application/pdf"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 500, description = "Rendering failed", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "ID of the document to export")
    ),
    security(("bearer_auth" = []))
)]
pub async fn export_document(
    req: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };
    let document_id = id.into_inner();

    let document = match state.get_visible_document(&document_id, &user_id).await {
        Ok(Some(document)) => document,
        Ok(None) => {
            return HttpResponse::NotFound().json(ErrorResponse::not_found("Document not found"))
        }
        Err(e) => {
            log::error!("Failed to load document {}: {:?}", document_id, e);
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to load document"));
        }
    };

    let filename = export_filename(&document.document_type.file_prefix(), &document.subject_name());
    let preview = document_preview(&document);

    match state
        .exporter
        .export(state.storage.as_ref(), &preview, DEFAULT_ELEMENT_ID, &document.attachments.0)
        .await
    {
        Ok(composed) => pdf_response(&filename, composed),
        Err(e) => export_error_response(e),
    }
}

fn pdf_response(filename: &str, composed: ComposedDocument) -> HttpResponse {
    let report = &composed.report;
    log::info!(
        "Exported '{}': {} page(s), {} skipped, {} failed attachment(s)",
        filename,
        composed.page_count,
        report.skipped.len(),
        report.failures.len()
    );

    HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename.to_string())],
        })
        .insert_header((SKIPPED_ATTACHMENTS_HEADER, report.skipped.len().to_string()))
        .insert_header((FAILED_ATTACHMENTS_HEADER, report.failures.len().to_string()))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .body(composed.pdf)
}

pub fn export_error_response(error: ExportError) -> HttpResponse {
    match error {
        ExportError::TargetNotFound(_) => {
            log::warn!("Export target missing: {}", error);
            HttpResponse::NotFound().json(ErrorResponse::not_found(&error.to_string()))
        }
        ExportError::PrintWindowBlocked => {
            log::warn!("{}", error);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::new("PrintWindowBlocked", &error.to_string()))
        }
        _ => {
            log::error!("Export failed: {}", error);
            HttpResponse::InternalServerError().json(ErrorResponse::internal_error(&error.to_string()))
        }
    }
}
