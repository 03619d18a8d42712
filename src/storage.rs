//! Object storage for attachment bytes.
//!
//! Attachments live in a Supabase Storage bucket. Everything above this
//! module only knows the opaque storage key, so the bucket can be swapped for
//! an in-memory store in tests.

use async_trait::async_trait;
use std::env;

const DEFAULT_BUCKET: &str = "attachments";

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub bucket_name: String,
}

impl SupabaseConfig {
    pub fn from_env() -> Result<Self, String> {
        let supabase_url = env::var("SUPABASE_URL").map_err(|_| "SUPABASE_URL must be set")?;
        let supabase_anon_key =
            env::var("SUPABASE_ANON_KEY").map_err(|_| "SUPABASE_ANON_KEY must be set")?;
        let bucket_name = env::var("BUCKET_NAME").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            bucket_name,
        })
    }

    /// Authenticated object endpoint for `key`.
    pub fn object_url(&self, key: &str) -> Result<String, String> {
        self.storage_url(&[], key)
    }

    /// Public-bucket address for `key`.
    pub fn public_url(&self, key: &str) -> Result<String, String> {
        self.storage_url(&["public"], key)
    }

    /// Key segments are percent-encoded one by one; dot and empty segments are refused.
    fn storage_url(&self, prefix: &[&str], key: &str) -> Result<String, String> {
        let segments: Vec<&str> = key.split('/').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
        {
            return Err(format!("Invalid storage key: {}", key));
        }

        let mut url = reqwest::Url::parse(&self.supabase_url)
            .map_err(|e| format!("Invalid SUPABASE_URL {}: {}", self.supabase_url, e))?;
        url.path_segments_mut()
            .map_err(|_| format!("SUPABASE_URL {} cannot hold a path", self.supabase_url))?
            .pop_if_empty()
            .extend(["storage", "v1", "object"])
            .extend(prefix)
            .push(&self.bucket_name)
            .extend(segments);

        Ok(url.to_string())
    }
}

/// Byte store keyed by opaque storage keys.
#[async_trait]
pub trait ObjectStorage {
    async fn upload_file(&self, key: &str, file_data: &[u8]) -> Result<(), String>;

    /// Fetch the bytes behind `key`.
    async fn download_file(&self, key: &str) -> Result<Vec<u8>, String>;

    async fn delete_file(&self, key: &str) -> Result<(), String>;

    /// Fetchable address for `key`. Empty when the store cannot address it.
    fn get_asset_url(&self, key: &str) -> String;
}

pub struct SupabaseStorage {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseStorage {
    pub fn new(config: SupabaseConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Request against the authenticated object endpoint for `key`.
    pub(crate) fn object_request(
        &self,
        method: reqwest::Method,
        key: &str,
    ) -> Result<reqwest::RequestBuilder, String> {
        let url = self.config.object_url(key)?;
        Ok(self
            .client
            .request(method, url)
            .header("apikey", &self.config.supabase_anon_key)
            .bearer_auth(&self.config.supabase_anon_key))
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload_file(&self, key: &str, file_data: &[u8]) -> Result<(), String> {
        let content_type = mime_guess::from_path(key).first_or_octet_stream();
        log::debug!("Uploading {} ({} bytes, {})", key, file_data.len(), content_type);

        let response = self
            .object_request(reqwest::Method::POST, key)?
            .header("Content-Type", content_type.essence_str())
            .header("x-upsert", "true")
            .body(file_data.to_vec())
            .send()
            .await
            .map_err(|e| format!("Failed to upload {}: {}", key, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Upload of {} failed with {}: {}", key, status, body));
        }

        Ok(())
    }

    async fn download_file(&self, key: &str) -> Result<Vec<u8>, String> {
        let response = self
            .object_request(reqwest::Method::GET, key)?
            .send()
            .await
            .map_err(|e| format!("Failed to fetch {}: {}", key, e))?;

        if !response.status().is_success() {
            return Err(format!("Fetch of {} failed with {}", key, response.status()));
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| format!("Failed to read body of {}: {}", key, e))
    }

    async fn delete_file(&self, key: &str) -> Result<(), String> {
        let response = self
            .object_request(reqwest::Method::DELETE, key)?
            .send()
            .await
            .map_err(|e| format!("Failed to delete {}: {}", key, e))?;

        if !response.status().is_success() {
            return Err(format!("Delete of {} failed with {}", key, response.status()));
        }

        Ok(())
    }

    fn get_asset_url(&self, key: &str) -> String {
        self.config.public_url(key).unwrap_or_else(|e| {
            log::warn!("{}", e);
            String::new()
        })
    }
}
