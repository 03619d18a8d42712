//! Off-screen rasterization of render targets.
//!
//! The print tree is lowered to Typst and compiled to a single auto-height PNG
//! page. All scratch files live in a temporary directory that is removed when
//! the render returns, whether it succeeded or not.

use image::RgbImage;
use std::fs;
use std::process::Command;
use tempfile::tempdir;
use tempfile::TempDir;

use super::markup::to_typst;
use super::tree::{build_print_tree, RenderNode, StyleOverrides};
use super::ExportError;

const SOURCE_FILENAME: &str = "capture.typ";
const OUTPUT_FILENAME: &str = "capture.png";
/// CSS reference resolution.
const CSS_PPI: f32 = 96.0;

/// Turns a render target into a raster image of the whole document.
pub trait Rasterizer: Send + Sync {
    fn render_to_raster(&self, target: &RenderNode) -> Result<RgbImage, ExportError>;
}

/// Rasterizer backed by the `typst` CLI.
pub struct TypstRasterizer {
    binary: String,
    scale: f32,
    overrides: StyleOverrides,
}

impl TypstRasterizer {
    pub fn new(binary: impl Into<String>, scale: f32) -> Self {
        Self {
            binary: binary.into(),
            scale,
            overrides: StyleOverrides::print_defaults(),
        }
    }

    pub fn ppi(&self) -> f32 {
        CSS_PPI * self.scale
    }
}

impl Rasterizer for TypstRasterizer {
    fn render_to_raster(&self, target: &RenderNode) -> Result<RgbImage, ExportError> {
        let print_tree = build_print_tree(target, &self.overrides);
        let document = to_typst(&print_tree);

        let temp_dir = tempdir().map_err(ExportError::TempDir)?;
        for asset in &document.assets {
            fs::write(temp_dir.path().join(&asset.filename), &asset.data)
                .map_err(ExportError::WriteSource)?;
        }
        fs::write(temp_dir.path().join(SOURCE_FILENAME), &document.source)
            .map_err(ExportError::WriteSource)?;

        log::debug!(
            "Rasterizing {} nodes at {} ppi ({} embedded images)",
            print_tree.node_count(),
            self.ppi(),
            document.assets.len()
        );

        let png = compile_typst_to_png(&self.binary, &temp_dir, self.ppi())?;
        let raster = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .map_err(ExportError::RasterDecode)?
            .to_rgb8();

        log::debug!("Captured raster {}x{}", raster.width(), raster.height());
        Ok(raster)
    }
}

/// Compile the capture source to PNG inside `temp_dir`.
fn compile_typst_to_png(binary: &str, temp_dir: &TempDir, ppi: f32) -> Result<Vec<u8>, ExportError> {
    let source_path = temp_dir.path().join(SOURCE_FILENAME);
    let output_path = temp_dir.path().join(OUTPUT_FILENAME);

    let output = Command::new(binary)
        .arg("compile")
        .arg("--format")
        .arg("png")
        .arg("--ppi")
        .arg(format!("{}", ppi.round() as u32))
        .arg(&source_path)
        .arg(&output_path)
        .current_dir(temp_dir.path())
        .output()
        .map_err(ExportError::TypstIo)?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        log::error!(
            "Typst exited with status {}: {}",
            code,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(ExportError::TypstExit(code));
    }

    fs::read(&output_path).map_err(ExportError::ReadRaster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppi_scales_css_resolution() {
        let rasterizer = TypstRasterizer::new("typst", 2.0);
        assert_eq!(rasterizer.ppi(), 192.0);
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let rasterizer = TypstRasterizer::new("definitely-not-a-typst-binary", 2.0);
        let target = RenderNode::text_node("div", "Hello");
        let result = rasterizer.render_to_raster(&target);
        assert!(matches!(result, Err(ExportError::TypstIo(_))));
    }
}
