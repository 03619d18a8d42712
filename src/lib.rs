use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod attachment;
pub mod auth;
pub mod db;
pub mod document;
pub mod export;
pub mod storage;


pub use crate::db::AppState;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
/// Render targets inline their images, so request bodies can get large.
const JSON_LIMIT_BYTES: usize = 32 * 1024 * 1024;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("InternalServerError", message)
    }
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::export::handlers::export_pdf,
        crate::export::handlers::print_page,
        crate::export::handlers::export_document,
        crate::document::handlers::list_documents,
        crate::document::handlers::create_document,
        crate::document::handlers::get_document,
        crate::document::handlers::update_document,
        crate::document::handlers::delete_document,
        crate::document::handlers::admin_delete_document,
        crate::document::handlers::admin_list_user_documents,
        crate::document::handlers::admin_delete_user_documents,
        crate::attachment::handlers::upload_attachment,
        crate::attachment::handlers::download_attachment,
        crate::attachment::handlers::delete_attachment
    ),
    components(
        schemas(
            export::tree::RenderNode,
            export::handlers::ExportRequest,
            export::handlers::PrintRequest,
            document::models::Document,
            document::models::DocumentType,
            document::models::DocumentStatus,
            document::models::CreateDocumentRequest,
            document::models::UpdateDocumentRequest,
            document::handlers::DeletedDocumentsResponse,
            attachment::models::Attachment,
            attachment::handlers::UploadAttachmentRequest,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Export", description = "PDF export and printing."),
        (name = "Documents", description = "Saved forms and drafts."),
        (name = "Attachments", description = "Files attached to forms."),
        (name = "Admin", description = "Managing other users' documents.")
    )
)]
pub struct ApiDoc;

/// Register every `/api` route on `cfg`.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/export").route(web::post().to(export::handlers::export_pdf)))
        .service(web::resource("/print").route(web::post().to(export::handlers::print_page)))
        .service(
            web::resource("/documents")
                .route(web::get().to(document::handlers::list_documents))
                .route(web::post().to(document::handlers::create_document)),
        )
        .service(
            web::resource("/documents/{id}/export")
                .route(web::get().to(export::handlers::export_document)),
        )
        .service(
            web::resource("/documents/{id}")
                .route(web::get().to(document::handlers::get_document))
                .route(web::put().to(document::handlers::update_document))
                .route(web::delete().to(document::handlers::delete_document)),
        )
        .service(
            web::resource("/admin/documents/{id}")
                .route(web::delete().to(document::handlers::admin_delete_document)),
        )
        .service(
            web::resource("/admin/users/{user_id}/documents")
                .route(web::get().to(document::handlers::admin_list_user_documents))
                .route(web::delete().to(document::handlers::admin_delete_user_documents)),
        )
        .service(
            web::resource("/attachments")
                .route(web::post().to(attachment::handlers::upload_attachment)),
        )
        .service(
            web::resource("/attachments/{key:.*}")
                .route(web::get().to(attachment::handlers::download_attachment))
                .route(web::delete().to(attachment::handlers::delete_attachment)),
        );
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().limit(JSON_LIMIT_BYTES)
}

pub async fn run() -> io::Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let supabase_config = crate::storage::SupabaseConfig::from_env().map_err(|e| {
        log::error!("Invalid storage configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let app_state = match AppState::new_with_config(supabase_config).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("Failed to connect to database. Please check your SUPABASE_DATABASE_URL in .env and ensure the database is running. Error: {}", e);
            return Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
        }
    };

    let prometheus = PrometheusMetricsBuilder::new("office_forms_server")
        .endpoint("/metrics")
        .build()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    log::info!("Starting server at http://{}", bind_address);

    HttpServer::new(move || {
        let app_state = app_state.clone();
        let prometheus = prometheus.clone();
        let cors = Cors::default()
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://localhost:8080")
            .allowed_origin("http://127.0.0.1:8080")
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .expose_headers(vec![
                header::CONTENT_DISPOSITION,
                header::HeaderName::from_static("x-skipped-attachments"),
                header::HeaderName::from_static("x-failed-attachments"),
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Compress::default())
            .wrap(prometheus)
            .wrap(cors)
            .app_data(app_state)
            .app_data(json_config())
            .service(web::scope("/api").configure(configure_api))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(bind_address)?
    .run()
    .await
}
