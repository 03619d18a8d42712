//! Lowering of print trees into Typst source (for rasterization) and HTML
//! (for the print window).

use base64::Engine;

use super::common::{css_color_to_typst, css_length_to_typst, escape_html, escape_typst_string};
use super::tree::RenderNode;

const DEFAULT_PAGE_WIDTH: &str = "210mm";
const DEFAULT_PAGE_MARGIN: &str = "10mm";
const BASE_FONT_SIZE: &str = "10.5pt";

/// Elements that never contribute to printed output.
const SKIPPED_TAGS: &[&str] = &["script", "style", "button", "input", "select", "textarea", "svg", "noscript"];

const BLOCK_TAGS: &[&str] = &[
    "div", "p", "section", "article", "header", "footer", "main", "aside", "nav", "form", "ul",
    "ol", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "figure", "figcaption", "dl",
    "dt", "dd", "fieldset",
];

const VOID_TAGS: &[&str] = &["img", "br", "hr", "input", "meta", "link", "col", "source"];

/// Elements that would run code or change how the print page loads.
const ACTIVE_TAGS: &[&str] = &[
    "script", "iframe", "frame", "frameset", "object", "embed", "base", "meta", "link",
];

const URL_ATTRS: &[&str] = &["href", "src", "action", "formaction", "background", "poster"];

/// A file the Typst source refers to by name.
#[derive(Debug, Clone, PartialEq)]
pub struct TypstAsset {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypstDocument {
    pub source: String,
    pub assets: Vec<TypstAsset>,
}

/// Lower a print tree into a single auto-height Typst page.
pub fn to_typst(root: &RenderNode) -> TypstDocument {
    let mut lowering = TypstLowering::default();

    let width = root
        .style_value("width")
        .and_then(css_length_to_typst)
        .unwrap_or_else(|| DEFAULT_PAGE_WIDTH.to_string());
    let margin = root
        .style_value("padding")
        .and_then(|p| p.split_whitespace().next())
        .and_then(css_length_to_typst)
        .unwrap_or_else(|| DEFAULT_PAGE_MARGIN.to_string());
    let fill = root
        .style_value("background")
        .or_else(|| root.style_value("background-color"))
        .and_then(css_color_to_typst)
        .unwrap_or_else(|| "white".to_string());
    let ink = root
        .style_value("color")
        .and_then(css_color_to_typst)
        .unwrap_or_else(|| "black".to_string());

    let body = lowering.lower_inner(root);

    let source = format!(
        "#set page(width: {width}, height: auto, margin: {margin}, fill: {fill})\n\
         #set text(fill: {ink}, size: {BASE_FONT_SIZE})\n\
         #set par(leading: 0.75em)\n\
         {body}\n"
    );

    TypstDocument {
        source,
        assets: lowering.assets,
    }
}

#[derive(Default)]
struct TypstLowering {
    assets: Vec<TypstAsset>,
}

impl TypstLowering {
    fn lower_node(&mut self, node: &RenderNode) -> String {
        let tag = node.tag_name();
        if SKIPPED_TAGS.contains(&tag.as_str()) {
            return String::new();
        }

        match tag.as_str() {
            "br" => "#linebreak()".to_string(),
            "hr" => "#line(length: 100%, stroke: 0.5pt)".to_string(),
            "img" => self.lower_image(node),
            "table" => self.lower_table(node),
            _ => {
                let inner = self.lower_inner(node);
                let is_block = BLOCK_TAGS.contains(&tag.as_str())
                    || node.is_flex_container()
                    || is_grid(node);
                let props = box_properties(node, is_block);

                if is_block {
                    format!("#block({})[{}]", props.join(", "), inner)
                } else if props.is_empty() {
                    inner
                } else {
                    format!("#box({})[{}]", props.join(", "), inner)
                }
            }
        }
    }

    /// Content of `node` with its text styling, without the surrounding box.
    fn lower_inner(&mut self, node: &RenderNode) -> String {
        let content = if node.is_flex_container() && !is_column_flex(node) {
            self.lower_flex(node)
        } else if is_grid(node) {
            self.lower_grid(node)
        } else {
            self.lower_content(node)
        };

        let mut content = wrap_text_style(node, content);
        if let Some(alignment) = text_alignment(node) {
            content = format!("#align({})[{}]", alignment, content);
        }
        if let Some(leading) = node.style_value("line-height").and_then(leading_for) {
            content = format!("#set par(leading: {})\n{}", leading, content);
        }
        content
    }

    fn lower_content(&mut self, node: &RenderNode) -> String {
        let mut parts = Vec::new();
        if let Some(text) = node.text.as_deref().filter(|t| !t.is_empty()) {
            parts.push(format!("#\"{}\"", escape_typst_string(text)));
        }
        for child in &node.children {
            let lowered = self.lower_node(child);
            if !lowered.is_empty() {
                parts.push(lowered);
            }
        }
        parts.join("\n")
    }

    fn lower_cells(&mut self, node: &RenderNode) -> Vec<String> {
        let mut cells = Vec::new();
        if let Some(text) = node.text.as_deref().filter(|t| !t.is_empty()) {
            cells.push(format!("[#\"{}\"]", escape_typst_string(text)));
        }
        for child in &node.children {
            let lowered = self.lower_node(child);
            if !lowered.is_empty() {
                cells.push(format!("[{}]", lowered));
            }
        }
        cells
    }

    fn lower_flex(&mut self, node: &RenderNode) -> String {
        let cells = self.lower_cells(node);
        if cells.is_empty() {
            return String::new();
        }

        let grows: Vec<bool> = node
            .children
            .iter()
            .filter(|c| !SKIPPED_TAGS.contains(&c.tag_name().as_str()))
            .map(|c| c.has_class("flex-1") || matches!(c.style_value("flex"), Some(f) if f.starts_with('1')))
            .chain(std::iter::repeat(false))
            .take(cells.len())
            .collect();
        let spread = node.has_class("justify-between")
            || node.style_value("justify-content") == Some("space-between");

        let vertical = match node.style_value("align-items") {
            Some("center") => "horizon",
            Some("flex-end") | Some("end") => "bottom",
            _ => "top",
        };

        let count = cells.len();
        let (columns, aligns): (Vec<&str>, Vec<String>) = (0..count)
            .map(|i| {
                if spread && !grows.iter().any(|g| *g) {
                    let horizontal = if i == 0 {
                        "left"
                    } else if i + 1 == count {
                        "right"
                    } else {
                        "center"
                    };
                    ("1fr", format!("{} + {}", horizontal, vertical))
                } else if grows[i] {
                    ("1fr", format!("left + {}", vertical))
                } else {
                    ("auto", format!("left + {}", vertical))
                }
            })
            .unzip();

        format!(
            "#grid(columns: ({},), column-gutter: 8pt, align: ({},), {})",
            columns.join(", "),
            aligns.join(", "),
            cells.join(", ")
        )
    }

    fn lower_grid(&mut self, node: &RenderNode) -> String {
        let cells = self.lower_cells(node);
        if cells.is_empty() {
            return String::new();
        }
        let columns = grid_column_count(node).unwrap_or(1).max(1);
        format!(
            "#grid(columns: (1fr,) * {}, column-gutter: 12pt, row-gutter: 8pt, {})",
            columns,
            cells.join(", ")
        )
    }

    fn lower_table(&mut self, node: &RenderNode) -> String {
        let mut rows = Vec::new();
        collect_rows(node, &mut rows);
        if rows.is_empty() {
            return String::new();
        }

        let columns = rows
            .iter()
            .map(|row| row.children.iter().filter(|c| is_cell(c)).map(colspan).sum::<usize>())
            .max()
            .unwrap_or(1)
            .max(1);

        let vertical = rows
            .iter()
            .flat_map(|row| row.children.iter())
            .find(|c| is_cell(c))
            .and_then(|c| c.style_value("vertical-align"))
            .map(|v| if v == "middle" { "horizon" } else { "top" })
            .unwrap_or("top");

        let mut cells = Vec::new();
        for row in rows {
            for cell in row.children.iter().filter(|c| is_cell(c)) {
                let mut content = self.lower_inner(cell);
                if cell.tag_name() == "th" {
                    content = format!("#text(weight: \"bold\")[{}]", content);
                }
                let span = colspan(cell);
                if span > 1 {
                    cells.push(format!("table.cell(colspan: {})[{}]", span, content));
                } else {
                    cells.push(format!("[{}]", content));
                }
            }
        }

        format!(
            "#table(columns: {}, stroke: 0.5pt, inset: 5pt, align: left + {}, {})",
            columns,
            vertical,
            cells.join(", ")
        )
    }

    fn lower_image(&mut self, node: &RenderNode) -> String {
        let alt = node
            .attrs
            .get("alt")
            .map(String::as_str)
            .unwrap_or("image");

        let Some((extension, data)) = node.attrs.get("src").and_then(|src| decode_data_uri(src)) else {
            log::debug!("Image '{}' is not embeddable, rendering placeholder", alt);
            return image_placeholder(alt);
        };

        let filename = format!("image-{}.{}", self.assets.len(), extension);
        self.assets.push(TypstAsset {
            filename: filename.clone(),
            data,
        });

        let mut args = vec![format!("\"{}\"", filename)];
        if let Some(height) = node.style_value("height").and_then(css_length_to_typst) {
            args.push(format!("height: {}", height));
        }
        if let Some(width) = node.style_value("width").and_then(css_length_to_typst) {
            args.push(format!("width: {}", width));
        }
        format!("#image({})", args.join(", "))
    }
}

fn image_placeholder(alt: &str) -> String {
    format!(
        "#box(stroke: 0.5pt + luma(160), inset: 4pt)[#\"{}\"]",
        escape_typst_string(alt)
    )
}

/// Decode an inline `data:` image. Remote sources are never fetched.
fn decode_data_uri(src: &str) -> Option<(&'static str, Vec<u8>)> {
    let rest = src.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    let data = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()?;

    let extension = match image::guess_format(&data).ok()? {
        image::ImageFormat::Png => "png",
        image::ImageFormat::Jpeg => "jpg",
        image::ImageFormat::Gif => "gif",
        _ => return None,
    };
    image::load_from_memory(&data).ok()?;
    Some((extension, data))
}

fn box_properties(node: &RenderNode, is_block: bool) -> Vec<String> {
    let mut props = Vec::new();
    if is_block {
        props.push("width: 100%".to_string());
    }
    if let Some(fill) = node
        .style_value("background")
        .or_else(|| node.style_value("background-color"))
        .and_then(css_color_to_typst)
    {
        props.push(format!("fill: {}", fill));
    }
    if let Some(inset) = node
        .style_value("padding")
        .and_then(|p| p.split_whitespace().next())
        .and_then(css_length_to_typst)
    {
        props.push(format!("inset: {}", inset));
    }
    if node.style.keys().any(|k| k.starts_with("border")) || node.has_class("border") {
        props.push("stroke: 0.5pt".to_string());
    }
    props
}

fn wrap_text_style(node: &RenderNode, content: String) -> String {
    let tag = node.tag_name();
    let mut args = Vec::new();

    let heading_size = match tag.as_str() {
        "h1" => Some("18pt"),
        "h2" => Some("15pt"),
        "h3" => Some("13pt"),
        "h4" | "h5" | "h6" => Some("11pt"),
        _ => None,
    };
    if let Some(size) = node
        .style_value("font-size")
        .and_then(css_length_to_typst)
        .or_else(|| heading_size.map(str::to_string))
    {
        args.push(format!("size: {}", size));
    }

    let bold = heading_size.is_some()
        || matches!(tag.as_str(), "strong" | "b")
        || node.has_class("font-bold")
        || node.has_class("font-semibold")
        || matches!(node.style_value("font-weight"), Some("bold") | Some("600") | Some("700") | Some("800"));
    if bold {
        args.push("weight: \"bold\"".to_string());
    }

    let italic = matches!(tag.as_str(), "em" | "i")
        || node.has_class("italic")
        || node.style_value("font-style") == Some("italic");
    if italic {
        args.push("style: \"italic\"".to_string());
    }

    if let Some(fill) = node.style_value("color").and_then(css_color_to_typst) {
        args.push(format!("fill: {}", fill));
    }

    let content = if args.is_empty() || content.is_empty() {
        content
    } else {
        format!("#text({})[{}]", args.join(", "), content)
    };

    if node.has_class("uppercase") || node.style_value("text-transform") == Some("uppercase") {
        format!("#upper[{}]", content)
    } else {
        content
    }
}

fn text_alignment(node: &RenderNode) -> Option<&'static str> {
    match node.style_value("text-align") {
        Some("center") => return Some("center"),
        Some("right") | Some("end") => return Some("right"),
        _ => {}
    }
    if node.has_class("text-center") {
        Some("center")
    } else if node.has_class("text-right") {
        Some("right")
    } else {
        None
    }
}

fn leading_for(line_height: &str) -> Option<String> {
    let factor: f32 = line_height.trim().parse().ok()?;
    if factor <= 0.0 {
        return None;
    }
    Some(format!("{:.2}em", factor * 0.5))
}

fn is_column_flex(node: &RenderNode) -> bool {
    node.has_class("flex-col") || node.style_value("flex-direction") == Some("column")
}

fn is_grid(node: &RenderNode) -> bool {
    node.has_class("grid") || node.style_value("display") == Some("grid")
}

fn grid_column_count(node: &RenderNode) -> Option<usize> {
    node.classes
        .iter()
        .filter_map(|c| c.strip_prefix("grid-cols-"))
        .find_map(|n| n.parse().ok())
        .or_else(|| {
            let template = node.style_value("grid-template-columns")?;
            template
                .strip_prefix("repeat(")
                .and_then(|r| r.split(',').next())
                .and_then(|n| n.trim().parse().ok())
                .or_else(|| Some(template.split_whitespace().count()))
        })
}

fn is_cell(node: &RenderNode) -> bool {
    matches!(node.tag_name().as_str(), "td" | "th")
}

fn colspan(node: &RenderNode) -> usize {
    node.attrs
        .get("colspan")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1usize)
        .max(1)
}

fn collect_rows<'a>(node: &'a RenderNode, rows: &mut Vec<&'a RenderNode>) {
    for child in &node.children {
        match child.tag_name().as_str() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => collect_rows(child, rows),
            _ => {}
        }
    }
}

/// Serialize a tree as HTML markup, the way the element's outer HTML reads.
pub fn to_html(node: &RenderNode) -> String {
    let mut html = String::new();
    write_html(node, &mut html);
    html
}

/// HTML tag or attribute name: `[A-Za-z][A-Za-z0-9-]*`.
fn is_markup_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn is_printable_attr(name: &str, value: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if !is_markup_name(&name) || name.starts_with("on") || name == "srcdoc" {
        return false;
    }
    if URL_ATTRS.contains(&name.as_str()) {
        let scheme: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && !c.is_control())
            .take(11)
            .collect::<String>()
            .to_ascii_lowercase();
        return !scheme.starts_with("javascript:") && !scheme.starts_with("vbscript:");
    }
    true
}

fn write_html(node: &RenderNode, out: &mut String) {
    let tag = node.tag_name();
    if !is_markup_name(&tag) || ACTIVE_TAGS.contains(&tag.as_str()) {
        return;
    }
    out.push('<');
    out.push_str(&tag);

    if let Some(id) = &node.id {
        out.push_str(&format!(" id=\"{}\"", escape_html(id)));
    }
    if !node.classes.is_empty() {
        out.push_str(&format!(" class=\"{}\"", escape_html(&node.classes.join(" "))));
    }
    if !node.style.is_empty() {
        let style = node
            .style
            .iter()
            .map(|(property, value)| format!("{}: {}", property, value))
            .collect::<Vec<_>>()
            .join("; ");
        out.push_str(&format!(" style=\"{}\"", escape_html(&style)));
    }
    for (name, value) in &node.attrs {
        if is_printable_attr(name, value) {
            out.push_str(&format!(" {}=\"{}\"", name, escape_html(value)));
        }
    }
    out.push('>');

    if VOID_TAGS.contains(&tag.as_str()) {
        return;
    }

    if let Some(text) = &node.text {
        out.push_str(&escape_html(text));
    }
    for child in &node.children {
        write_html(child, out);
    }
    out.push_str(&format!("</{}>", tag));
}
