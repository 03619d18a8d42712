use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::attachment::models::Attachment;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    LeaveApplication,
    MoneyRequisition,
    MaterialRequisition,
    AdvanceAdjustment,
}

impl DocumentType {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::LeaveApplication => "Leave Application",
            DocumentType::MoneyRequisition => "Money Requisition",
            DocumentType::MaterialRequisition => "Material Requisition",
            DocumentType::AdvanceAdjustment => "Advance Adjustment",
        }
    }

    /// Prefix of exported file names, e.g. `Material_Requisition`.
    pub fn file_prefix(&self) -> String {
        self.label().replace(' ', "_")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Final,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema, sqlx::FromRow)]
pub struct Document {
    #[schema(example = "f1e2d3c4-b5a6-7890-1234-567890abcdef")]
    pub id: Uuid,
    #[schema(example = "5b0c6f0e-7d1e-4f0a-9a57-3f2d1c0b9a88")]
    pub user_id: Uuid,
    pub document_type: DocumentType,
    #[schema(example = "Material Requisition - Site A")]
    pub title: String,
    #[schema(value_type = Object)]
    pub form_data: serde_json::Value,
    pub status: DocumentStatus,
    #[schema(value_type = Vec<Attachment>)]
    pub attachments: Json<Vec<Attachment>>,
    #[serde(skip_serializing, default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDocumentRequest {
    pub document_type: DocumentType,
    #[schema(example = "Material Requisition - Site A")]
    pub title: String,
    #[schema(value_type = Object)]
    pub form_data: serde_json::Value,
    pub status: Option<DocumentStatus>,
    pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub form_data: Option<serde_json::Value>,
    pub status: Option<DocumentStatus>,
    pub attachments: Option<Vec<Attachment>>,
}

impl Document {
    pub fn from_request(user_id: Uuid, request: CreateDocumentRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            document_type: request.document_type,
            title: request.title,
            form_data: request.form_data,
            status: request.status.unwrap_or_default(),
            attachments: Json(request.attachments.unwrap_or_default()),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_update(&mut self, request: UpdateDocumentRequest) {
        if let Some(title) = request.title {
            self.title = title;
        }
        if let Some(form_data) = request.form_data {
            self.form_data = form_data;
        }
        if let Some(status) = request.status {
            self.status = status;
        }
        if let Some(attachments) = request.attachments {
            self.attachments = Json(attachments);
        }
        self.updated_at = Utc::now();
    }

    /// Person or project a document is about, as used in file names.
    pub fn subject_name(&self) -> String {
        subject_name(&self.form_data)
    }
}

/// Who the form was filled for, else the project, else the filler.
pub fn subject_name(form_data: &serde_json::Value) -> String {
    let field = |key: &str| {
        form_data
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let fill_for_another = form_data
        .get("fillForAnother")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let name = if fill_for_another {
        field("otherName")
    } else {
        None
    };

    name.or_else(|| field("projectName"))
        .or_else(|| field("name"))
        .unwrap_or_else(|| "Document".to_string())
}
