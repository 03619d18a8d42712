//! Self-printing HTML output.
//!
//! Printing hands the print-ready markup to a fresh viewing context that
//! prints itself once its resources had a moment to load, then closes.

use super::common::escape_html;
use super::markup::to_html;
use super::tree::RenderNode;
use super::ExportError;

pub const PRINT_TITLE: &str = "Print Document";
pub const DEFAULT_PRINT_DELAY_MS: u64 = 500;

/// A viewing context that receives a complete document.
pub trait PrintWindow {
    fn write_document(&mut self, html: &str);
}

/// Something that can open viewing contexts. `None` means the context was
/// refused, for example by a popup blocker.
pub trait PrintContext {
    fn open_window(&mut self) -> Option<&mut dyn PrintWindow>;
}

/// Window whose document becomes the body of an HTTP response.
#[derive(Debug, Default)]
pub struct HtmlPrintWindow {
    html: String,
}

impl PrintWindow for HtmlPrintWindow {
    fn write_document(&mut self, html: &str) {
        self.html.push_str(html);
    }
}

/// Context backing `POST /api/print`. It always opens.
#[derive(Debug, Default)]
pub struct HtmlResponseContext {
    window: HtmlPrintWindow,
}

impl HtmlResponseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_html(self) -> String {
        self.window.html
    }
}

impl PrintContext for HtmlResponseContext {
    fn open_window(&mut self) -> Option<&mut dyn PrintWindow> {
        Some(&mut self.window)
    }
}

/// Write the print page for `target` into a newly opened window.
///
/// The target's markup is printed as it is; the page's own stylesheet
/// supplies margins and colors.
///
/// Returns as soon as the page is written; printing happens in the window
/// after `delay_ms`.
pub fn print_document(
    target: &RenderNode,
    stylesheets: &[String],
    context: &mut dyn PrintContext,
    delay_ms: u64,
) -> Result<(), ExportError> {
    let page = print_page(&to_html(target), stylesheets, delay_ms);

    let window = context.open_window().ok_or(ExportError::PrintWindowBlocked)?;
    window.write_document(&page);
    log::debug!("Wrote print page ({} bytes)", page.len());
    Ok(())
}

/// Complete HTML page that prints `body_markup` and then closes itself.
pub fn print_page(body_markup: &str, stylesheets: &[String], delay_ms: u64) -> String {
    let mut styles = String::new();
    for sheet in stylesheets {
        styles.push_str(&neutralize_style_end(sheet));
        styles.push('\n');
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
{styles}</style>
<style>
body {{
  margin: 0;
  padding: 20mm;
  background: white !important;
  color: black !important;
  -webkit-print-color-adjust: exact;
  print-color-adjust: exact;
}}
@media print {{
  body {{ padding: 10mm; }}
}}
</style>
</head>
<body>
{body}
<script>
window.onload = function () {{
  setTimeout(function () {{
    window.print();
    window.close();
  }}, {delay});
}};
</script>
</body>
</html>
"#,
        title = escape_html(PRINT_TITLE),
        styles = styles,
        body = body_markup,
        delay = delay_ms,
    )
}

/// Break up every `</style` (in any case) so a stylesheet cannot close its element.
fn neutralize_style_end(sheet: &str) -> String {
    let lower = sheet.to_ascii_lowercase();
    let mut out = String::with_capacity(sheet.len() + 8);
    let mut last = 0;
    for (start, _) in lower.match_indices("</style") {
        out.push_str(&sheet[last..start]);
        out.push_str("<\\/");
        last = start + 2;
    }
    out.push_str(&sheet[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BlockedContext;

    impl PrintContext for BlockedContext {
        fn open_window(&mut self) -> Option<&mut dyn PrintWindow> {
            None
        }
    }

    fn target() -> RenderNode {
        RenderNode::new("div")
            .with_id("printable-document")
            .with_child(RenderNode::text_node("h1", "Material Requisition"))
    }

    #[test]
    fn test_print_page_contains_markup_and_script() {
        let mut context = HtmlResponseContext::new();
        print_document(&target(), &[".title { font-weight: bold; }".to_string()], &mut context, 500).unwrap();
        let html = context.into_html();

        assert!(html.contains("<title>Print Document</title>"));
        assert!(html.contains(".title { font-weight: bold; }"));
        assert!(html.contains("Material Requisition"));
        assert!(html.contains("padding: 20mm"));
        assert!(html.contains("@media print"));
        assert!(html.contains("padding: 10mm"));
        assert!(html.contains("print-color-adjust: exact"));
        assert!(html.contains("}, 500);"));
        assert!(html.find("window.print()") < html.find("window.close()"));
    }

    #[test]
    fn test_blocked_window_is_an_error() {
        let result = print_document(&target(), &[], &mut BlockedContext, 500);
        assert!(matches!(result, Err(ExportError::PrintWindowBlocked)));
    }

    #[test]
    fn test_stylesheet_cannot_break_out_of_style_element() {
        for sheet in ["a{}</style><script>x()</script>", "a{}</STYLE><script>x()</script>", "a{}</StYlE ><script>x()</script>"] {
            let html = print_page("", &[sheet.to_string()], 10);
            let lower = html.to_ascii_lowercase();
            // Only the two style elements of the page itself are closed.
            assert_eq!(lower.matches("</style").count(), 2, "{}", sheet);
            assert!(lower.contains("<\\/style"), "{}", sheet);
        }
    }

    #[test]
    fn test_print_page_carries_target_markup_unmodified() {
        let mut context = HtmlResponseContext::new();
        let target = target().with_style("width", "180mm");
        print_document(&target, &[], &mut context, 500).unwrap();
        let html = context.into_html();

        assert!(html.contains("<div id=\"printable-document\" style=\"width: 180mm\"><h1>Material Requisition</h1></div>"));
        assert!(!html.contains("width: 210mm"));
        assert!(!html.contains("box-sizing"));
    }

    #[test]
    fn test_print_page_drops_scripts_from_markup() {
        let mut context = HtmlResponseContext::new();
        let target = target()
            .with_attr("onload", "steal()")
            .with_child(RenderNode::text_node("script", "steal()"));
        print_document(&target, &[], &mut context, 500).unwrap();
        let html = context.into_html();

        assert!(!html.contains("steal()"));
        assert!(html.contains("Material Requisition"));
    }
}
