//! Generic preview for stored documents.
//!
//! Stored documents are exported without a client-side preview, so the server
//! lays one out itself: a header with the document type, a field table and an
//! item table when the form has line items.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

use super::tree::{RenderNode, DEFAULT_ELEMENT_ID};
use crate::document::models::Document;

const ITEMS_KEY: &str = "items";
const FILL_FOR_ANOTHER_KEY: &str = "fillForAnother";

pub fn document_preview(document: &Document) -> RenderNode {
    let mut root = RenderNode::new("div")
        .with_id(DEFAULT_ELEMENT_ID)
        .with_child(header(document));

    let Some(fields) = document.form_data.as_object() else {
        return root;
    };

    let rows = field_rows(fields);
    if !rows.is_empty() {
        root = root.with_child(field_table(rows));
    }

    if let Some(items) = fields.get(ITEMS_KEY).and_then(Value::as_array) {
        if let Some(table) = item_table(items) {
            root = root
                .with_child(RenderNode::text_node("h3", "Items").with_style("margin-top", "16px"))
                .with_child(table);
        }
    }

    root
}

fn header(document: &Document) -> RenderNode {
    RenderNode::new("div")
        .with_class("text-center")
        .with_style("margin-bottom", "16px")
        .with_child(RenderNode::text_node("h1", document.document_type.label()).with_class("uppercase"))
        .with_child(RenderNode::text_node("p", &document.title))
}

fn field_rows(fields: &Map<String, Value>) -> Vec<(String, String)> {
    let for_another = fields
        .get(FILL_FOR_ANOTHER_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    fields
        .iter()
        .filter(|(key, _)| key.as_str() != ITEMS_KEY && key.as_str() != FILL_FOR_ANOTHER_KEY)
        // Details of the other person only matter when the form was filled for them.
        .filter(|(key, _)| for_another || !is_other_person_field(key))
        .filter_map(|(key, value)| display_value(value).map(|v| (humanize_key(key), v)))
        .collect()
}

fn field_table(rows: Vec<(String, String)>) -> RenderNode {
    let body = rows.into_iter().fold(RenderNode::new("tbody"), |body, (label, value)| {
        body.with_child(
            RenderNode::new("tr")
                .with_child(RenderNode::text_node("th", &label).with_class("font-bold"))
                .with_child(RenderNode::text_node("td", &value)),
        )
    });
    RenderNode::new("table").with_class("w-full").with_child(body)
}

fn item_table(items: &[Value]) -> Option<RenderNode> {
    let objects: Vec<&Map<String, Value>> = items.iter().filter_map(Value::as_object).collect();
    if objects.is_empty() {
        return None;
    }

    let mut columns: Vec<&str> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if key != "id" && !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let heading = columns.iter().fold(
        RenderNode::new("tr").with_child(RenderNode::text_node("th", "S.No")),
        |row, column| row.with_child(RenderNode::text_node("th", &humanize_key(column))),
    );

    let mut body = RenderNode::new("tbody").with_child(heading);
    for (index, object) in objects.iter().enumerate() {
        let row = columns.iter().fold(
            RenderNode::new("tr").with_child(RenderNode::text_node("td", &(index + 1).to_string())),
            |row, column| {
                let value = object.get(*column).and_then(display_value).unwrap_or_default();
                row.with_child(RenderNode::text_node("td", &value))
            },
        );
        body = body.with_child(row);
    }

    Some(RenderNode::new("table").with_class("w-full").with_child(body))
}

fn is_other_person_field(key: &str) -> bool {
    key.strip_prefix("other")
        .and_then(|rest| rest.chars().next())
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
}

/// Scalars only; nested values are left out of the field table.
fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(format_date(s).unwrap_or_else(|| s.to_string()))
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "Yes" } else { "No" }.to_string()),
        _ => None,
    }
}

/// `dd/MM/yyyy` for ISO dates and timestamps.
fn format_date(value: &str) -> Option<String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.format("%d/%m/%Y").to_string());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.format("%d/%m/%Y").to_string())
}

/// `projectName` becomes `Project Name`.
pub fn humanize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut previous: Option<char> = None;
    for ch in key.chars() {
        if ch == '_' || ch == '-' {
            out.push(' ');
            previous = Some(' ');
            continue;
        }
        match previous {
            None => out.extend(ch.to_uppercase()),
            Some(' ') => out.extend(ch.to_uppercase()),
            Some(p) if ch.is_ascii_uppercase() && p.is_ascii_lowercase() => {
                out.push(' ');
                out.push(ch);
            }
            Some(p) if ch.is_ascii_digit() && p.is_ascii_alphabetic() => {
                out.push(' ');
                out.push(ch);
            }
            _ => out.push(ch),
        }
        previous = Some(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::models::{CreateDocumentRequest, DocumentType};
    use serde_json::json;
    use uuid::Uuid;

    fn document(form_data: Value) -> Document {
        Document::from_request(
            Uuid::new_v4(),
            CreateDocumentRequest {
                document_type: DocumentType::MaterialRequisition,
                title: "Material Requisition - Site A".to_string(),
                form_data,
                status: None,
                attachments: None,
            },
        )
    }

    fn texts(node: &RenderNode, out: &mut Vec<String>) {
        if let Some(text) = &node.text {
            out.push(text.clone());
        }
        for child in &node.children {
            texts(child, out);
        }
    }

    fn all_text(node: &RenderNode) -> Vec<String> {
        let mut out = Vec::new();
        texts(node, &mut out);
        out
    }

    #[test]
    fn test_humanize_key() {
        assert_eq!(humanize_key("projectName"), "Project Name");
        assert_eq!(humanize_key("employee_id"), "Employee Id");
        assert_eq!(humanize_key("date"), "Date");
        assert_eq!(humanize_key("address2"), "Address 2");
    }

    #[test]
    fn test_preview_has_header_fields_and_items() {
        let preview = document_preview(&document(json!({
            "name": "Rina",
            "projectName": "Site A",
            "date": "2024-03-05",
            "fillForAnother": false,
            "otherName": "Budi",
            "items": [
                { "id": "1", "particulars": "Cement", "quantity": "20" },
                { "id": "2", "particulars": "Sand", "quantity": "5" }
            ]
        })));

        assert_eq!(preview.id.as_deref(), Some(DEFAULT_ELEMENT_ID));
        let text = all_text(&preview);
        assert!(text.contains(&"Material Requisition".to_string()));
        assert!(text.contains(&"Project Name".to_string()));
        assert!(text.contains(&"05/03/2024".to_string()));
        assert!(text.contains(&"Cement".to_string()));
        assert!(text.contains(&"S.No".to_string()));
        assert!(!text.contains(&"Budi".to_string()));
    }

    #[test]
    fn test_other_person_shown_when_filled_for_another() {
        let preview = document_preview(&document(json!({
            "name": "Rina",
            "fillForAnother": true,
            "otherName": "Budi"
        })));
        assert!(all_text(&preview).contains(&"Budi".to_string()));
    }

    #[test]
    fn test_non_object_form_data_yields_header_only() {
        let preview = document_preview(&document(json!("free text")));
        assert_eq!(preview.children.len(), 1);
    }
}
