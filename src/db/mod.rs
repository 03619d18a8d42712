//! Database module - AppState and database operations
//!
//! - `document` - Document and role queries

mod document;

use moka::future::Cache;
use sqlx::PgPool;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::document::models::Document;
use crate::export::{ExportConfig, Exporter};
use crate::storage::{ObjectStorage, SupabaseConfig, SupabaseStorage};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub document_cache: Cache<Uuid, Document>,
    pub storage: Arc<dyn ObjectStorage + Send + Sync>,
    pub exporter: Exporter,
}

impl AppState {
    pub async fn new_with_config(
        supabase_config: SupabaseConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let database_url = env::var("SUPABASE_DATABASE_URL")
            .map_err(|_| "SUPABASE_DATABASE_URL must be set")?;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(900))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&database_url)
            .await?;

        let storage = Arc::new(SupabaseStorage::new(supabase_config, build_http_client()?));
        let exporter = Exporter::new(ExportConfig::from_env());

        Ok(Self::new_with_pool_and_storage(pool, storage, exporter))
    }

    pub fn new_with_pool_and_storage(
        pool: PgPool,
        storage: Arc<dyn ObjectStorage + Send + Sync>,
        exporter: Exporter,
    ) -> Self {
        let document_cache = Cache::builder()
            .time_to_live(Duration::from_secs(10 * 60))
            .max_capacity(1_000)
            .build();

        AppState {
            pool,
            document_cache,
            storage,
            exporter,
        }
    }
}

fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(900))
        .user_agent("office-forms-server/1.0")
        .build()
}
