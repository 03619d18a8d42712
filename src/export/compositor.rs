//! Appends attachment contents to an exported PDF.
//!
//! Attachments are handled strictly in list order. Each one either contributes
//! pages or ends up in the report as skipped or failed; a bad attachment never
//! aborts the export.

use image::{DynamicImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use thiserror::Error;

use super::assemble::{add_image_page, embed_rgb_image, pages_root, push_kids, save_document, Placement};
use super::paginate::PageSize;
use super::ExportError;
use crate::attachment::models::{Attachment, AttachmentKind};
use crate::storage::ObjectStorage;

/// Blank space kept around attachment images, in points.
pub const IMAGE_MARGIN: f64 = 40.0;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITED_KEYS: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Why an attachment contributed no pages.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttachmentError {
    #[error("failed to fetch attachment '{name}': {reason}")]
    Fetch { name: String, reason: String },
    #[error("attachment '{name}' is not a decodable {mime_type}: {reason}")]
    Decode {
        name: String,
        mime_type: String,
        reason: String,
    },
    #[error("failed to merge PDF attachment '{name}': {reason}")]
    Merge { name: String, reason: String },
}

/// Pages one attachment added to the output.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSet {
    pub attachment: String,
    pub pages: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionReport {
    pub appended: Vec<PageSet>,
    /// Names of attachments whose type never contributes pages.
    pub skipped: Vec<String>,
    pub failures: Vec<AttachmentError>,
}

impl CompositionReport {
    pub fn attachment_pages(&self) -> usize {
        self.appended.iter().map(|set| set.pages).sum()
    }
}

#[derive(Debug)]
pub struct ComposedDocument {
    pub pdf: Vec<u8>,
    pub page_count: usize,
    pub report: CompositionReport,
}

pub struct AttachmentCompositor<'a> {
    storage: &'a (dyn ObjectStorage + Send + Sync),
    page_size: PageSize,
}

impl<'a> AttachmentCompositor<'a> {
    pub fn new(storage: &'a (dyn ObjectStorage + Send + Sync), page_size: PageSize) -> Self {
        Self { storage, page_size }
    }

    /// Fetch the bytes behind an attachment's storage key.
    pub async fn resolve(&self, attachment: &Attachment) -> Result<Vec<u8>, AttachmentError> {
        let fetch_error = |reason: String| AttachmentError::Fetch {
            name: attachment.name.clone(),
            reason,
        };

        let address = self.storage.get_asset_url(&attachment.url);
        if address.is_empty() {
            return Err(fetch_error("storage returned no address".to_string()));
        }

        log::debug!("Fetching attachment '{}' from {}", attachment.name, address);
        self.storage.download_file(&attachment.url).await.map_err(fetch_error)
    }

    /// Append every attachment to `base_pdf` and return the combined bytes.
    ///
    /// `base_pdf` itself is never modified. Attachment failures are recorded in
    /// the report; only an unreadable base document is an error.
    pub async fn compose(
        &self,
        base_pdf: &[u8],
        attachments: &[Attachment],
    ) -> Result<ComposedDocument, ExportError> {
        let mut doc = Document::load_mem(base_pdf).map_err(ExportError::Pdf)?;
        let base_pages = doc.get_pages().len();

        if attachments.is_empty() {
            return Ok(ComposedDocument {
                pdf: base_pdf.to_vec(),
                page_count: base_pages,
                report: CompositionReport::default(),
            });
        }

        let mut report = CompositionReport::default();
        for attachment in attachments {
            match self.append_attachment(&mut doc, attachment).await {
                Ok(Some(set)) => {
                    log::debug!("Attachment '{}' added {} page(s)", set.attachment, set.pages);
                    report.appended.push(set);
                }
                Ok(None) => {
                    log::info!(
                        "Skipping attachment '{}' of type {}",
                        attachment.name,
                        attachment.mime_type
                    );
                    report.skipped.push(attachment.name.clone());
                }
                Err(e) => {
                    log::warn!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        let page_count = doc.get_pages().len();
        log::info!(
            "Composed document: {} base page(s), {} attachment page(s), {} skipped, {} failed",
            base_pages,
            report.attachment_pages(),
            report.skipped.len(),
            report.failures.len()
        );

        Ok(ComposedDocument {
            pdf: save_document(doc)?,
            page_count,
            report,
        })
    }

    async fn append_attachment(
        &self,
        doc: &mut Document,
        attachment: &Attachment,
    ) -> Result<Option<PageSet>, AttachmentError> {
        let kind = attachment.kind();
        if kind == AttachmentKind::Other {
            return Ok(None);
        }

        let bytes = self.resolve(attachment).await?;
        let pages = match kind {
            AttachmentKind::Image => {
                append_image(doc, &bytes, &attachment.mime_type, self.page_size).map_err(|reason| {
                    AttachmentError::Decode {
                        name: attachment.name.clone(),
                        mime_type: attachment.mime_type.clone(),
                        reason,
                    }
                })?
            }
            AttachmentKind::Pdf => append_pdf(doc, &bytes).map_err(|reason| AttachmentError::Merge {
                name: attachment.name.clone(),
                reason,
            })?,
            AttachmentKind::Other => return Ok(None),
        };

        Ok(Some(PageSet {
            attachment: attachment.name.clone(),
            pages,
        }))
    }
}

/// Largest scale no greater than 1 that fits the image inside the margins,
/// centered on the page.
pub fn image_placement(image_width: f64, image_height: f64, page_size: PageSize, margin: f64) -> Placement {
    let max_width = page_size.width - margin * 2.0;
    let max_height = page_size.height - margin * 2.0;
    let scale = (max_width / image_width).min(max_height / image_height).min(1.0);

    let width = image_width * scale;
    let height = image_height * scale;
    Placement {
        x: (page_size.width - width) / 2.0,
        y: (page_size.height - height) / 2.0,
        width,
        height,
    }
}

/// Decode an image attachment and add it on a page of its own.
///
/// PNG when the MIME type says so, JPEG for everything else.
pub fn append_image(doc: &mut Document, bytes: &[u8], mime_type: &str, page_size: PageSize) -> Result<usize, String> {
    let format = if mime_type.to_ascii_lowercase().contains("png") {
        ImageFormat::Png
    } else {
        ImageFormat::Jpeg
    };

    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| e.to_string())?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err("image has no pixels".to_string());
    }
    let raster = flatten_on_white(decoded);

    let pages_id = pages_root(doc).map_err(|e| e.to_string())?;
    let image_id = embed_rgb_image(doc, &raster);
    let placement = image_placement(
        raster.width() as f64,
        raster.height() as f64,
        page_size,
        IMAGE_MARGIN,
    );
    add_image_page(doc, pages_id, page_size, image_id, placement).map_err(|e| e.to_string())?;
    Ok(1)
}

/// Copy every page of a PDF attachment, in order, after the existing pages.
///
/// The target document is only touched once the attachment has been fully
/// parsed, so a broken attachment leaves it as it was.
pub fn append_pdf(doc: &mut Document, bytes: &[u8]) -> Result<usize, String> {
    let mut source = Document::load_mem(bytes).map_err(|e| e.to_string())?;
    if source.is_encrypted() {
        return Err("encrypted PDFs cannot be merged".to_string());
    }

    let pages_id = pages_root(doc).map_err(|e| e.to_string())?;
    source.renumber_objects_with(doc.max_id + 1);

    let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
    let mut copied_pages = Vec::with_capacity(page_ids.len());
    for page_id in &page_ids {
        let mut page = source
            .get_dictionary(*page_id)
            .map_err(|e| e.to_string())?
            .clone();
        for (key, value) in inherited_attributes(&source, &page) {
            page.set(key, value);
        }
        page.set("Parent", pages_id);
        copied_pages.push((*page_id, page));
    }

    let objects: BTreeMap<ObjectId, Object> = source
        .objects
        .into_iter()
        .filter(|(_, object)| !is_tree_node(object))
        .collect();

    doc.max_id = doc.max_id.max(source.max_id);
    doc.objects.extend(objects);
    for (page_id, page) in copied_pages {
        doc.objects.insert(page_id, Object::Dictionary(page));
    }
    push_kids(doc, pages_id, &page_ids).map_err(|e| e.to_string())?;

    Ok(page_ids.len())
}

/// Attributes `page` inherits from its ancestors but does not set itself.
fn inherited_attributes(source: &Document, page: &Dictionary) -> Vec<(Vec<u8>, Object)> {
    let mut inherited: Vec<(Vec<u8>, Object)> = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        // Guard against cyclic page trees.
        depth += 1;
        if depth > 64 {
            break;
        }
        let Ok(node) = source.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITED_KEYS {
            let already = page.has(key) || inherited.iter().any(|(k, _)| k.as_slice() == *key);
            if !already {
                if let Ok(value) = node.get(key) {
                    inherited.push((key.to_vec(), value.clone()));
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    inherited
}

/// Catalog and page tree nodes of a source document are replaced by ours.
fn is_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
        .map(|name| name == b"Catalog" || name == b"Pages")
        .unwrap_or(false)
}

fn flatten_on_white(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::assemble::{add_image_page, new_document, page_count};

    fn blank_pdf(pages: usize) -> Vec<u8> {
        let (mut doc, pages_id) = new_document();
        let raster = RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]));
        let image_id = embed_rgb_image(&mut doc, &raster);
        for _ in 0..pages {
            let placement = image_placement(4.0, 4.0, PageSize::A4, IMAGE_MARGIN);
            add_image_page(&mut doc, pages_id, PageSize::A4, image_id, placement).unwrap();
        }
        save_document(doc).unwrap()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        image::RgbaImage::from_pixel(width, height, image::Rgba([0, 128, 255, 128]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_wide_image_scaled_to_fit_margins_and_centered() {
        let page = PageSize::A4;
        let placement = image_placement(2000.0, 1000.0, page, 40.0);
        let scale = ((page.width - 80.0) / 2000.0).min((page.height - 80.0) / 1000.0).min(1.0);

        assert!((placement.width - 2000.0 * scale).abs() < 1e-9);
        assert!((placement.height - 1000.0 * scale).abs() < 1e-9);
        assert!((placement.x - (page.width - placement.width) / 2.0).abs() < 1e-9);
        assert!((placement.y - (page.height - placement.height) / 2.0).abs() < 1e-9);
        assert!((placement.width - (page.width - 80.0)).abs() < 1e-9);
    }

    #[test]
    fn test_small_image_is_never_upscaled() {
        let placement = image_placement(100.0, 50.0, PageSize::A4, IMAGE_MARGIN);
        assert_eq!(placement.width, 100.0);
        assert_eq!(placement.height, 50.0);
    }

    #[test]
    fn test_tall_image_limited_by_height() {
        let page = PageSize::A4;
        let placement = image_placement(500.0, 5000.0, page, IMAGE_MARGIN);
        assert!((placement.height - (page.height - 80.0)).abs() < 1e-9);
        assert!(placement.width < page.width - 80.0);
    }

    #[test]
    fn test_append_image_adds_one_page() {
        let mut doc = Document::load_mem(&blank_pdf(2)).unwrap();
        let added = append_image(&mut doc, &png_bytes(30, 20), "image/png", PageSize::A4).unwrap();
        assert_eq!(added, 1);
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_png_bytes_declared_as_jpeg_fail_to_decode() {
        let mut doc = Document::load_mem(&blank_pdf(1)).unwrap();
        let result = append_image(&mut doc, &png_bytes(3, 3), "image/webp", PageSize::A4);
        assert!(result.is_err());
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_append_pdf_copies_pages_in_order() {
        let mut doc = Document::load_mem(&blank_pdf(1)).unwrap();
        let added = append_pdf(&mut doc, &blank_pdf(3)).unwrap();
        assert_eq!(added, 3);

        let pdf = save_document(doc).unwrap();
        assert_eq!(page_count(&pdf).unwrap(), 4);
    }

    #[test]
    fn test_append_pdf_rejects_garbage_and_leaves_document_alone() {
        let mut doc = Document::load_mem(&blank_pdf(2)).unwrap();
        let before = doc.objects.len();
        assert!(append_pdf(&mut doc, b"%PDF-1.4 broken").is_err());
        assert_eq!(doc.objects.len(), before);
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_flatten_blends_alpha_onto_white() {
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 0])));
        assert_eq!(flatten_on_white(image).get_pixel(0, 0).0, [255, 255, 255]);
    }
}
