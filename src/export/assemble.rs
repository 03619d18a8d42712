//! PDF assembly on top of `lopdf`.
//!
//! The base document embeds the captured raster once and draws it on every
//! page at that page's shift. The same page helpers are used when attachment
//! pages are appended later.

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::paginate::{Page, PageSize};
use super::ExportError;

const PDF_VERSION: &str = "1.5";
const IMAGE_RESOURCE: &str = "Im0";

/// Where an image lands on a page, in points from the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Build the base PDF: one page per [`Page`], all drawing the same raster.
pub fn assemble(raster: &RgbImage, pages: &[Page], page_size: PageSize) -> Result<Vec<u8>, ExportError> {
    let (mut doc, pages_id) = new_document();
    let image_id = embed_rgb_image(&mut doc, raster);

    for page in pages {
        // Top of the image sits `shift` points above the top edge of this page.
        let placement = Placement {
            x: 0.0,
            y: page_size.height + page.shift - page.image_height,
            width: page_size.width,
            height: page.image_height,
        };
        add_image_page(&mut doc, pages_id, page_size, image_id, placement)?;
    }

    log::debug!("Assembled base document with {} page(s)", pages.len());
    save_document(doc)
}

/// Empty document with a catalog and an empty page tree.
pub fn new_document() -> (Document, ObjectId) {
    let mut doc = Document::with_version(PDF_VERSION);
    let pages_id = doc.new_object_id();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => Object::Integer(0),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    (doc, pages_id)
}

/// Id of the root page tree node of `doc`.
pub fn pages_root(doc: &Document) -> Result<ObjectId, ExportError> {
    doc.catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(ExportError::Pdf)
}

/// Embed an RGB raster as an image XObject. The stream is compressed on save.
pub fn embed_rgb_image(doc: &mut Document, raster: &RgbImage) -> ObjectId {
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(raster.width() as i64),
            "Height" => Object::Integer(raster.height() as i64),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
        },
        raster.as_raw().clone(),
    );
    doc.add_object(stream)
}

/// Append a page that draws `image_id` at `placement`.
pub fn add_image_page(
    doc: &mut Document,
    pages_id: ObjectId,
    page_size: PageSize,
    image_id: ObjectId,
    placement: Placement,
) -> Result<ObjectId, ExportError> {
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(placement.width),
                    real(0.0),
                    real(0.0),
                    real(placement.height),
                    real(placement.x),
                    real(placement.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().map_err(ExportError::Pdf)?,
    ));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![real(0.0), real(0.0), real(page_size.width), real(page_size.height)],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                IMAGE_RESOURCE => image_id,
            },
        },
    });

    push_kids(doc, pages_id, &[page_id])?;
    Ok(page_id)
}

/// Append `kids` to the page tree node `pages_id` and bump its count.
pub fn push_kids(doc: &mut Document, pages_id: ObjectId, kids: &[ObjectId]) -> Result<(), ExportError> {
    let pages = doc
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .map_err(ExportError::Pdf)?;

    let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);

    match pages.get_mut(b"Kids").and_then(Object::as_array_mut) {
        Ok(existing) => existing.extend(kids.iter().map(|id| Object::Reference(*id))),
        Err(_) => pages.set(
            "Kids",
            kids.iter().map(|id| Object::Reference(*id)).collect::<Vec<Object>>(),
        ),
    }
    pages.set("Count", Object::Integer(count + kids.len() as i64));
    Ok(())
}

pub fn save_document(mut doc: Document) -> Result<Vec<u8>, ExportError> {
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ExportError::PdfSave(e.to_string()))?;
    Ok(buffer)
}

/// Number of pages in a serialized PDF.
pub fn page_count(pdf: &[u8]) -> Result<usize, ExportError> {
    let doc = Document::load_mem(pdf).map_err(ExportError::Pdf)?;
    Ok(doc.get_pages().len())
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}
