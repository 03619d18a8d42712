mod common;

use actix_web::{http::StatusCode, test, web, App};
use common::{blank_exporter, png_bytes, preview_target, test_app_state, MockObjectStorage};
use office_forms_server::attachment::handlers::purge_attachments;
use office_forms_server::attachment::models::Attachment;
use office_forms_server::auth::generate_access_token;
use office_forms_server::export::assemble::page_count;
use office_forms_server::export::handlers::SKIPPED_ATTACHMENTS_HEADER;
use office_forms_server::storage::ObjectStorage;
use office_forms_server::{configure_api, json_config, ErrorResponse};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn bearer(user_id: &Uuid) -> (String, String) {
    let token = generate_access_token(&user_id.to_string(), Some("tester@example.com"))
        .expect("Failed to generate token");
    ("Authorization".to_string(), format!("Bearer {}", token))
}

macro_rules! test_app {
    ($storage:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(test_app_state($storage, blank_exporter(1588, 3000)).await))
                .app_data(json_config())
                .service(web::scope("/api").configure(configure_api)),
        )
        .await
    };
}

#[actix_web::test]
async fn test_export_requires_a_token() {
    let app = test_app!(Arc::new(MockObjectStorage::new()));

    let req = test::TestRequest::post()
        .uri("/api/export")
        .set_json(json!({
            "target": preview_target(),
            "document_type": "material_requisition"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_export_returns_named_pdf_with_attachments() {
    let user_id = Uuid::new_v4();
    let storage = Arc::new(MockObjectStorage::new());
    let png_key = format!("{}/1-aaaaaa.png", user_id);
    let doc_key = format!("{}/2-bbbbbb.docx", user_id);
    storage.upload_file(&png_key, &png_bytes(64, 64)).await.unwrap();
    storage.upload_file(&doc_key, b"PK").await.unwrap();
    let app = test_app!(storage.clone());

    let req = test::TestRequest::post()
        .uri("/api/export")
        .insert_header(bearer(&user_id))
        .set_json(json!({
            "target": preview_target(),
            "document_type": "material_requisition",
            "subject": "Site A",
            "attachments": [
                { "name": "photo.png", "url": png_key, "type": "image/png", "size": 10 },
                { "name": "notes.docx", "url": doc_key, "type": "application/vnd.openxmlformats-officedocument.wordprocessingml.document", "size": 2 }
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "application/pdf"
    );
    let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("Material_Requisition_Site A.pdf"));
    assert_eq!(
        resp.headers().get(SKIPPED_ATTACHMENTS_HEADER).unwrap().to_str().unwrap(),
        "1"
    );

    let body = test::read_body(resp).await;
    // Two raster pages plus the image.
    assert_eq!(page_count(&body).unwrap(), 3);
}

#[actix_web::test]
async fn test_export_without_subject_is_named_document() {
    let user_id = Uuid::new_v4();
    let app = test_app!(Arc::new(MockObjectStorage::new()));

    let req = test::TestRequest::post()
        .uri("/api/export")
        .insert_header(bearer(&user_id))
        .set_json(json!({
            "target": preview_target(),
            "document_type": "leave_application"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap();
    assert!(disposition.contains("Leave_Application_Document.pdf"));
}

#[actix_web::test]
async fn test_export_of_missing_element_is_not_found() {
    let user_id = Uuid::new_v4();
    let app = test_app!(Arc::new(MockObjectStorage::new()));

    let req = test::TestRequest::post()
        .uri("/api/export")
        .insert_header(bearer(&user_id))
        .set_json(json!({
            "target": preview_target(),
            "element_id": "does-not-exist",
            "document_type": "money_requisition"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "NotFound");
    assert!(body.message.contains("does-not-exist"));
}

#[actix_web::test]
async fn test_export_rejects_other_users_attachments() {
    let user_id = Uuid::new_v4();
    let app = test_app!(Arc::new(MockObjectStorage::new()));

    let req = test::TestRequest::post()
        .uri("/api/export")
        .insert_header(bearer(&user_id))
        .set_json(json!({
            "target": preview_target(),
            "document_type": "money_requisition",
            "attachments": [
                { "name": "theirs.png", "url": format!("{}/1-aaaaaa.png", Uuid::new_v4()), "type": "image/png", "size": 1 }
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_print_returns_self_printing_page() {
    let user_id = Uuid::new_v4();
    let app = test_app!(Arc::new(MockObjectStorage::new()));

    let req = test::TestRequest::post()
        .uri("/api/print")
        .insert_header(bearer(&user_id))
        .set_json(json!({
            "target": preview_target(),
            "stylesheets": [".form-title { letter-spacing: 1px; }"]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("<title>Print Document</title>"));
    assert!(body.contains("letter-spacing: 1px"));
    assert!(body.contains("Material Requisition"));
    assert!(body.contains("window.print()"));
}

#[actix_web::test]
async fn test_delete_attachment_only_for_own_keys() {
    let user_id = Uuid::new_v4();
    let storage = Arc::new(MockObjectStorage::new());
    let own_key = format!("{}/1-aaaaaa.png", user_id);
    let foreign_key = format!("{}/1-aaaaaa.png", Uuid::new_v4());
    storage.upload_file(&own_key, b"x").await.unwrap();
    storage.upload_file(&foreign_key, b"y").await.unwrap();
    let app = test_app!(storage.clone());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/attachments/{}", foreign_key))
        .insert_header(bearer(&user_id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    assert!(storage.has_file(&foreign_key).await);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/attachments/{}", own_key))
        .insert_header(bearer(&user_id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    assert!(!storage.has_file(&own_key).await);
}

#[actix_web::test]
async fn test_download_own_attachment() {
    let user_id = Uuid::new_v4();
    let storage = Arc::new(MockObjectStorage::new());
    let key = format!("{}/1-aaaaaa.png", user_id);
    storage.upload_file(&key, &png_bytes(2, 2)).await.unwrap();
    let app = test_app!(storage);

    let req = test::TestRequest::get()
        .uri(&format!("/api/attachments/{}", key))
        .insert_header(bearer(&user_id))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "image/png"
    );
}

#[actix_web::test]
async fn test_dot_segments_do_not_reach_another_users_files() {
    let user_id = Uuid::new_v4();
    let victim_id = Uuid::new_v4();
    let storage = Arc::new(MockObjectStorage::new());
    let victim_key = format!("{}/1-aaaaaa.pdf", victim_id);
    storage.upload_file(&victim_key, b"%PDF-1.5").await.unwrap();
    let app = test_app!(storage.clone());
    let crafted = format!("{}/../{}", user_id, victim_key);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/attachments/{}", crafted))
        .insert_header(bearer(&user_id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    assert!(storage.has_file(&victim_key).await);

    let req = test::TestRequest::post()
        .uri("/api/export")
        .insert_header(bearer(&user_id))
        .set_json(json!({
            "target": preview_target(),
            "document_type": "money_requisition",
            "attachments": [
                { "name": "stolen.pdf", "url": crafted, "type": "application/pdf", "size": 8 }
            ]
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_purge_only_touches_the_owners_namespace() {
    let owner = Uuid::new_v4().to_string();
    let victim = Uuid::new_v4().to_string();
    let mock = Arc::new(MockObjectStorage::new());
    let own_key = format!("{}/1-aaaaaa.png", owner);
    let victim_key = format!("{}/2-bbbbbb.pdf", victim);
    mock.upload_file(&own_key, b"x").await.unwrap();
    mock.upload_file(&victim_key, b"y").await.unwrap();

    let attachments = vec![
        Attachment::new("own.png".to_string(), own_key.clone(), "image/png".to_string(), 1),
        Attachment::new(
            "theirs.pdf".to_string(),
            format!("{}/../{}", owner, victim_key),
            "application/pdf".to_string(),
            1,
        ),
        Attachment::new("theirs.pdf".to_string(), victim_key.clone(), "application/pdf".to_string(), 1),
    ];
    let storage: Arc<dyn ObjectStorage + Send + Sync> = mock.clone();
    let purged = purge_attachments(&storage, &owner, &attachments).await;

    assert_eq!(purged, 1);
    assert!(!mock.has_file(&own_key).await);
    assert!(mock.has_file(&victim_key).await);
}
