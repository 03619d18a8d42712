//! Document export pipeline.
//!
//! A render target is turned into a print tree, rasterized off-screen,
//! sliced into A4 pages and assembled into a PDF. Attachments are appended
//! after the rendered pages.

pub mod assemble;
pub mod common;
pub mod compositor;
pub mod engine;
pub mod handlers;
pub mod markup;
pub mod paginate;
pub mod preview;
pub mod print;
pub mod tree;

use std::env;
use std::sync::Arc;

use actix_web::web;
use thiserror::Error;

use crate::attachment::models::Attachment;
use crate::storage::ObjectStorage;
use compositor::{AttachmentCompositor, ComposedDocument};
use engine::{Rasterizer, TypstRasterizer};
use paginate::{paginate, PageSize};
use tree::RenderNode;

/// Failures that abort an export or print request.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no element with id '{0}' in the render target")]
    TargetNotFound(String),
    #[error("the print window was blocked")]
    PrintWindowBlocked,
    #[error("failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),
    #[error("failed to write Typst source: {0}")]
    WriteSource(#[source] std::io::Error),
    #[error("Typst CLI execution failed: {0}")]
    TypstIo(#[source] std::io::Error),
    #[error("Typst CLI exited with status {0}")]
    TypstExit(i32),
    #[error("failed to read rendered raster: {0}")]
    ReadRaster(#[source] std::io::Error),
    #[error("failed to decode rendered raster: {0}")]
    RasterDecode(#[source] image::ImageError),
    #[error("PDF error: {0}")]
    Pdf(#[source] lopdf::Error),
    #[error("failed to serialize PDF: {0}")]
    PdfSave(String),
    #[error("render task was cancelled")]
    Blocking,
}

const DEFAULT_TYPST_BIN: &str = "typst";
const DEFAULT_EXPORT_SCALE: f32 = 2.0;

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub typst_bin: String,
    /// Supersampling factor over the 96 dpi CSS resolution.
    pub scale: f32,
    pub print_delay_ms: u64,
    pub page_size: PageSize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            typst_bin: DEFAULT_TYPST_BIN.to_string(),
            scale: DEFAULT_EXPORT_SCALE,
            print_delay_ms: print::DEFAULT_PRINT_DELAY_MS,
            page_size: PageSize::A4,
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scale = match env::var("EXPORT_SCALE") {
            Ok(raw) => match raw.parse::<f32>() {
                Ok(scale) if scale > 0.0 => scale,
                _ => {
                    log::warn!("Ignoring invalid EXPORT_SCALE '{}', using {}", raw, defaults.scale);
                    defaults.scale
                }
            },
            Err(_) => defaults.scale,
        };

        let print_delay_ms = match env::var("PRINT_DELAY_MS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!(
                    "Ignoring invalid PRINT_DELAY_MS '{}', using {}",
                    raw,
                    defaults.print_delay_ms
                );
                defaults.print_delay_ms
            }),
            Err(_) => defaults.print_delay_ms,
        };

        Self {
            typst_bin: env::var("TYPST_BIN").unwrap_or(defaults.typst_bin),
            scale,
            print_delay_ms,
            page_size: defaults.page_size,
        }
    }
}

/// Runs the export pipeline. Shared by all requests.
#[derive(Clone)]
pub struct Exporter {
    rasterizer: Arc<dyn Rasterizer>,
    config: ExportConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        let rasterizer = Arc::new(TypstRasterizer::new(config.typst_bin.clone(), config.scale));
        Self { rasterizer, config }
    }

    pub fn with_rasterizer(rasterizer: Arc<dyn Rasterizer>, config: ExportConfig) -> Self {
        Self { rasterizer, config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Render the element `element_id` of `target` to PDF and append `attachments`.
    pub async fn export(
        &self,
        storage: &(dyn ObjectStorage + Send + Sync),
        target: &RenderNode,
        element_id: &str,
        attachments: &[Attachment],
    ) -> Result<ComposedDocument, ExportError> {
        let element = target
            .find_by_id(element_id)
            .cloned()
            .ok_or_else(|| ExportError::TargetNotFound(element_id.to_string()))?;

        let rasterizer = self.rasterizer.clone();
        let raster = web::block(move || rasterizer.render_to_raster(&element))
            .await
            .map_err(|_| ExportError::Blocking)??;

        let page_size = self.config.page_size;
        let pages = paginate(raster.width(), raster.height(), page_size);
        log::info!(
            "Rendered '{}' to {}x{} raster over {} page(s)",
            element_id,
            raster.width(),
            raster.height(),
            pages.len()
        );

        let base_pdf = assemble::assemble(&raster, &pages, page_size)?;
        AttachmentCompositor::new(storage, page_size)
            .compose(&base_pdf, attachments)
            .await
    }
}
