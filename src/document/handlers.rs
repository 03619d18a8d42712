use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{error, info};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::models::{CreateDocumentRequest, Document, UpdateDocumentRequest};
use crate::attachment::handlers::purge_attachments;
use crate::auth::{authenticated_user, require_admin};
use crate::{AppState, ErrorResponse};

#[derive(Serialize, ToSchema)]
pub struct DeletedDocumentsResponse {
    #[schema(example = 3)]
    pub deleted: usize,
}

fn database_error(context: &str, e: sqlx::Error) -> HttpResponse {
    error!("{}: {:?}", context, e);
    HttpResponse::InternalServerError().json(ErrorResponse::internal_error(context))
}

fn document_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse::not_found("Document not found"))
}

#[utoipa::path(
    context_path = "/api",
    tag = "Documents",
    get,
    path = "/documents",
    responses(
        (status = 200, description = "The caller's documents", body = [Document]),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_documents(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match state.get_documents_for_user(&user_id).await {
        Ok(documents) => HttpResponse::Ok().json(documents),
        Err(e) => database_error("Failed to list documents", e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Documents",
    post,
    path = "/documents",
    request_body = CreateDocumentRequest,
    responses(
        (status = 201, description = "Document saved", body = Document),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Attachment belongs to another user", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_document(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateDocumentRequest>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    let document = Document::from_request(user_id, body.into_inner());
    if let Some(response) = reject_foreign_attachments(&document, &user_id) {
        return response;
    }

    match state.insert_document(&document).await {
        Ok(()) => {
            info!("User {} saved {:?} document {}", user_id, document.document_type, document.id);
            HttpResponse::Created().json(document)
        }
        Err(e) => database_error("Failed to save document", e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Documents",
    get,
    path = "/documents/{id}",
    responses(
        (status = 200, description = "Document found", body = Document),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Document not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "ID of the document to retrieve")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_document(
    req: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match state.get_visible_document(&id, &user_id).await {
        Ok(Some(document)) => HttpResponse::Ok().json(document),
        Ok(None) => document_not_found(),
        Err(e) => database_error("Failed to load document", e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Documents",
    put,
    path = "/documents/{id}",
    request_body = UpdateDocumentRequest,
    responses(
        (status = 200, description = "Document updated", body = Document),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Attachment belongs to another user", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "ID of the document to update")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_document(
    req: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    body: web::Json<UpdateDocumentRequest>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    // Only owners edit; admins manage documents through the admin routes.
    let mut document = match state.get_document(&id).await {
        Ok(Some(document)) if document.user_id == user_id => document,
        Ok(_) => return document_not_found(),
        Err(e) => return database_error("Failed to load document", e),
    };

    document.apply_update(body.into_inner());
    if let Some(response) = reject_foreign_attachments(&document, &user_id) {
        return response;
    }

    match state.update_document(&document).await {
        Ok(()) => HttpResponse::Ok().json(document),
        Err(e) => database_error("Failed to update document", e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Documents",
    delete,
    path = "/documents/{id}",
    responses(
        (status = 204, description = "Document moved out of the caller's history"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Document not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "ID of the document to delete")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_document(
    req: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
) -> impl Responder {
    let user_id = match authenticated_user(&req) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match state.soft_delete_document(&id, &user_id).await {
        Ok(true) => {
            info!("User {} soft-deleted document {}", user_id, id);
            HttpResponse::NoContent().finish()
        }
        Ok(false) => document_not_found(),
        Err(e) => database_error("Failed to delete document", e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    delete,
    path = "/admin/documents/{id}",
    responses(
        (status = 204, description = "Document and its attachments removed"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Document not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "ID of the document to remove")
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_delete_document(
    req: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
) -> impl Responder {
    let admin_id = match require_admin(&req, &state).await {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match state.hard_delete_document(&id).await {
        Ok(Some(document)) => {
            purge_attachments(&state.storage, &document.user_id.to_string(), &document.attachments).await;
            info!("Admin {} removed document {}", admin_id, document.id);
            HttpResponse::NoContent().finish()
        }
        Ok(None) => document_not_found(),
        Err(e) => database_error("Failed to delete document", e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    get,
    path = "/admin/users/{user_id}/documents",
    responses(
        (status = 200, description = "All documents of the user, deleted ones included", body = [Document]),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required")
    ),
    params(
        ("user_id" = Uuid, Path, description = "User whose documents to list")
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_list_user_documents(
    req: HttpRequest,
    state: web::Data<AppState>,
    user_id: web::Path<Uuid>,
) -> impl Responder {
    if let Err(e) = require_admin(&req, &state).await {
        return e.error_response();
    }

    match state.get_all_documents_for_user(&user_id).await {
        Ok(documents) => HttpResponse::Ok().json(documents),
        Err(e) => database_error("Failed to list documents", e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Admin",
    delete,
    path = "/admin/users/{user_id}/documents",
    responses(
        (status = 200, description = "Documents removed", body = DeletedDocumentsResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required")
    ),
    params(
        ("user_id" = Uuid, Path, description = "User whose documents to remove")
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_delete_user_documents(
    req: HttpRequest,
    state: web::Data<AppState>,
    user_id: web::Path<Uuid>,
) -> impl Responder {
    let admin_id = match require_admin(&req, &state).await {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match state.hard_delete_documents_for_user(&user_id).await {
        Ok(documents) => {
            for document in &documents {
                purge_attachments(&state.storage, &document.user_id.to_string(), &document.attachments).await;
            }
            info!(
                "Admin {} removed {} document(s) of user {}",
                admin_id,
                documents.len(),
                user_id
            );
            HttpResponse::Ok().json(DeletedDocumentsResponse {
                deleted: documents.len(),
            })
        }
        Err(e) => database_error("Failed to delete documents", e),
    }
}

fn reject_foreign_attachments(document: &Document, user_id: &Uuid) -> Option<HttpResponse> {
    let user = user_id.to_string();
    document
        .attachments
        .iter()
        .find(|attachment| !attachment.is_owned_by(&user))
        .map(|attachment| {
            HttpResponse::Forbidden().json(ErrorResponse::new(
                "Forbidden",
                &format!("Attachment '{}' does not belong to you", attachment.name),
            ))
        })
}
