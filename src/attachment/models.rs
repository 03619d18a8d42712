use serde::{Deserialize, Serialize};
use std::path::Path;
use utoipa::ToSchema;

/// Reference to a user-uploaded file. The bytes live in object storage under `url`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct Attachment {
    #[schema(example = "quotation.pdf")]
    pub name: String,
    /// Opaque storage key, not a fetchable address.
    #[schema(example = "0b7c6f2e-8d1a-4c3b-9e5f-2a1d3c4b5e6f/1731234567890-k3j9x2.pdf")]
    pub url: String,
    #[serde(rename = "type")]
    #[schema(example = "application/pdf")]
    pub mime_type: String,
    #[schema(example = 48213)]
    pub size: i64,
}

/// How an attachment contributes to an exported PDF, decided by MIME type alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Pdf,
    Other,
}

impl Attachment {
    pub fn new(name: String, url: String, mime_type: String, size: i64) -> Self {
        Self {
            name,
            url,
            mime_type,
            size,
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        let mime = self.mime_type.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            AttachmentKind::Image
        } else if mime == "application/pdf" {
            AttachmentKind::Pdf
        } else {
            AttachmentKind::Other
        }
    }

    /// Storage keys are namespaced by the uploading user.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        key_belongs_to(&self.url, user_id)
    }
}

/// Whether `key` is a well-formed attachment key in `user_id`'s namespace.
pub fn key_belongs_to(key: &str, user_id: &str) -> bool {
    is_attachment_key(key)
        && key
            .split_once('/')
            .map(|(owner, _)| owner == user_id)
            .unwrap_or(false)
}

/// Whether `key` has the `{owner}/{timestamp}-{random}.{ext}` shape issued at upload.
///
/// Dot segments, extra separators and escapes never match, so a key cannot
/// address anything outside its owner's namespace.
pub fn is_attachment_key(key: &str) -> bool {
    let Some((owner, file)) = key.split_once('/') else {
        return false;
    };
    let Some((stem, ext)) = file.rsplit_once('.') else {
        return false;
    };
    let Some((timestamp, random)) = stem.split_once('-') else {
        return false;
    };

    !owner.is_empty()
        && owner.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && !timestamp.is_empty()
        && timestamp.bytes().all(|b| b.is_ascii_digit())
        && !random.is_empty()
        && random.bytes().all(|b| b.is_ascii_alphanumeric())
        && !ext.is_empty()
        && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Build a storage key of the form `{user_id}/{timestamp_ms}-{random}.{ext}`.
pub fn generate_attachment_key(user_id: &str, original_filename: &str) -> String {
    let sanitized = sanitize_filename::sanitize(original_filename);
    let ext = Path::new(&sanitized)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or("bin")
        .to_ascii_lowercase();

    let timestamp = chrono::Utc::now().timestamp_millis();
    let random: String = uuid::Uuid::new_v4().simple().to_string().chars().take(6).collect();

    format!("{}/{}-{}.{}", user_id, timestamp, random, ext)
}

/// Human readable size, e.g. "1.5 KB".
pub fn format_file_size(bytes: i64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
